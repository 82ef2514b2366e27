use std::collections::BTreeMap;

use tracing::{info, warn};

use openerp_core::{merge_patch, new_id, now_rfc3339};

use crate::model::{
    AuthField, AuthObject, CreateAuthField, CreateAuthObject, GrantQuery, ObjectRemoval, WILDCARD,
};
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    // ── Objects ──

    /// Create an authorization object. The object code is caller supplied.
    pub fn create_object(&self, input: CreateAuthObject) -> Result<AuthObject, AuthzError> {
        if input.id.trim().is_empty() {
            return Err(AuthzError::Validation("object id cannot be empty".into()));
        }
        if input.module.trim().is_empty() {
            return Err(AuthzError::Validation("object module cannot be empty".into()));
        }

        let now = now_rfc3339();
        let object = AuthObject {
            name: input.name.unwrap_or_else(|| input.id.clone()),
            id: input.id,
            description: input.description,
            module: input.module,
            is_active: true,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert_object(&object)?;
        info!(object = %object.id, module = %object.module, "authorization object created");
        Ok(object)
    }

    pub fn get_object(&self, id: &str) -> Result<AuthObject, AuthzError> {
        self.store.get_object(id)
    }

    /// All objects, ordered by module then id.
    pub fn list_objects(&self) -> Result<Vec<AuthObject>, AuthzError> {
        self.store.list_objects()
    }

    /// Objects grouped by module.
    pub fn list_objects_by_module(&self) -> Result<BTreeMap<String, Vec<AuthObject>>, AuthzError> {
        let mut grouped: BTreeMap<String, Vec<AuthObject>> = BTreeMap::new();
        for object in self.store.list_objects()? {
            grouped.entry(object.module.clone()).or_default().push(object);
        }
        Ok(grouped)
    }

    /// Distinct module names, sorted.
    pub fn list_modules(&self) -> Result<Vec<String>, AuthzError> {
        Ok(self.list_objects_by_module()?.into_keys().collect())
    }

    /// Active objects of one module. NotFound if the module has no objects at all.
    pub(crate) fn active_objects_in_module(&self, module: &str) -> Result<Vec<AuthObject>, AuthzError> {
        let objects: Vec<AuthObject> = self
            .store
            .list_objects()?
            .into_iter()
            .filter(|o| o.module == module)
            .collect();
        if objects.is_empty() {
            return Err(AuthzError::NotFound(format!("module '{module}'")));
        }
        Ok(objects.into_iter().filter(|o| o.is_active).collect())
    }

    /// Apply a JSON merge-patch to an object.
    ///
    /// `id` and timestamps cannot be patched. While grants reference the
    /// object its module is frozen.
    pub fn update_object(&self, id: &str, patch: &serde_json::Value) -> Result<AuthObject, AuthzError> {
        let existing = self.store.get_object(id)?;

        let mut base =
            serde_json::to_value(&existing).map_err(|e| AuthzError::Internal(e.to_string()))?;
        merge_patch(&mut base, patch);
        let mut updated: AuthObject = serde_json::from_value(base)
            .map_err(|e| AuthzError::Validation(format!("invalid object patch: {e}")))?;

        updated.id = existing.id.clone();
        updated.created_at = existing.created_at.clone();
        updated.updated_at = now_rfc3339();

        if updated.module.trim().is_empty() {
            return Err(AuthzError::Validation("object module cannot be empty".into()));
        }
        if updated.module != existing.module && self.is_referenced(id)? {
            return Err(AuthzError::Conflict(format!(
                "object '{id}' is referenced by grants; its module cannot change"
            )));
        }

        self.store.update_object(&updated)?;
        Ok(updated)
    }

    /// Mark an object inactive. Existing grants stay but no longer allow access.
    pub fn deactivate_object(&self, id: &str) -> Result<AuthObject, AuthzError> {
        let mut object = self.store.get_object(id)?;
        if !object.is_active {
            return Ok(object);
        }
        object.is_active = false;
        object.updated_at = now_rfc3339();
        self.store.update_object(&object)?;
        info!(object = id, "authorization object deactivated");
        Ok(object)
    }

    /// Delete an object together with its fields and every grant on it.
    pub fn delete_object(&self, id: &str) -> Result<ObjectRemoval, AuthzError> {
        let removal = self.store.delete_object(id)?;
        if removal.grants_removed > 0 {
            warn!(object = id, grants = removal.grants_removed, "object deleted with its grants");
        } else {
            info!(object = id, fields = removal.fields_removed, "object deleted");
        }
        Ok(removal)
    }

    pub(crate) fn is_referenced(&self, object_id: &str) -> Result<bool, AuthzError> {
        let query = GrantQuery {
            object_id: Some(object_id.to_string()),
            ..Default::default()
        };
        Ok(!self.store.list_grants(&query)?.is_empty())
    }

    // ── Fields ──

    /// Fields of an object in position order.
    pub fn list_fields(&self, object_id: &str) -> Result<Vec<AuthField>, AuthzError> {
        self.store.get_object(object_id)?;
        self.store.list_fields(object_id)
    }

    pub(crate) fn find_field(&self, object_id: &str, field_code: &str) -> Result<AuthField, AuthzError> {
        self.list_fields(object_id)?
            .into_iter()
            .find(|f| f.field_code == field_code)
            .ok_or_else(|| AuthzError::NotFound(format!("field '{field_code}' on object '{object_id}'")))
    }

    /// Append a field to an object.
    pub fn create_field(&self, input: CreateAuthField) -> Result<AuthField, AuthzError> {
        if input.field_code.trim().is_empty() {
            return Err(AuthzError::Validation("field code cannot be empty".into()));
        }
        let existing = self.list_fields(&input.object_id)?;
        if existing.iter().any(|f| f.field_code == input.field_code) {
            return Err(AuthzError::Validation(format!(
                "field code '{}' already exists on object '{}'",
                input.field_code, input.object_id
            )));
        }
        self.reject_if_referenced(&input.object_id, "fields cannot be added")?;
        validate_defaults(&input.field_code, &input.values, input.default_values.as_deref())?;

        let now = now_rfc3339();
        let field = AuthField {
            id: new_id(),
            object_id: input.object_id,
            field_code: input.field_code,
            description: input.description,
            is_required: input.is_required,
            values: input.values,
            default_values: input.default_values,
            position: existing.iter().map(|f| f.position + 1).max().unwrap_or(0),
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert_field(&field)?;
        Ok(field)
    }

    /// Apply a JSON merge-patch to a field. `id` and `object_id` are fixed.
    pub fn update_field(&self, id: &str, patch: &serde_json::Value) -> Result<AuthField, AuthzError> {
        let existing = self.store.get_field(id)?;

        let mut base =
            serde_json::to_value(&existing).map_err(|e| AuthzError::Internal(e.to_string()))?;
        merge_patch(&mut base, patch);
        let mut updated: AuthField = serde_json::from_value(base)
            .map_err(|e| AuthzError::Validation(format!("invalid field patch: {e}")))?;

        updated.id = existing.id.clone();
        updated.object_id = existing.object_id.clone();
        updated.created_at = existing.created_at.clone();
        updated.updated_at = now_rfc3339();

        if updated.field_code.trim().is_empty() {
            return Err(AuthzError::Validation("field code cannot be empty".into()));
        }
        if updated.field_code != existing.field_code {
            self.reject_if_referenced(&existing.object_id, "fields cannot be renamed")?;
        }
        validate_defaults(&updated.field_code, &updated.values, updated.default_values.as_deref())?;

        self.store.update_field(&updated)?;
        Ok(updated)
    }

    pub fn delete_field(&self, id: &str) -> Result<(), AuthzError> {
        let field = self.store.get_field(id)?;
        self.reject_if_referenced(&field.object_id, "fields cannot be deleted")?;
        self.store.delete_field(id)
    }

    fn reject_if_referenced(&self, object_id: &str, what: &str) -> Result<(), AuthzError> {
        if self.is_referenced(object_id)? {
            return Err(AuthzError::Conflict(format!(
                "object '{object_id}' is referenced by grants; {what}"
            )));
        }
        Ok(())
    }
}

/// Configured defaults must lie inside an enumerated domain without `*`.
fn validate_defaults(
    field_code: &str,
    values: &[String],
    defaults: Option<&[String]>,
) -> Result<(), AuthzError> {
    let Some(defaults) = defaults else {
        return Ok(());
    };
    if values.is_empty() || values.iter().any(|v| v == WILDCARD) {
        return Ok(());
    }
    if let Some(stray) = defaults.iter().find(|d| !values.contains(d)) {
        return Err(AuthzError::Validation(format!(
            "default '{stray}' of field '{field_code}' is not in its value list"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::fixtures;
    use serde_json::json;

    #[test]
    fn objects_group_by_module() {
        let svc = fixtures::test_service();
        assert_eq!(svc.list_modules().unwrap(), vec!["finance", "materials"]);

        let grouped = svc.list_objects_by_module().unwrap();
        let ids: Vec<&str> = grouped["materials"].iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, vec!["M_ARCHIVE", "M_EDIT", "M_VIEW"]);
    }

    #[test]
    fn create_object_validates_input() {
        let svc = fixtures::test_service();
        assert!(matches!(
            svc.create_object(fixtures::object("", "materials")),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            svc.create_object(fixtures::object("X", " ")),
            Err(AuthzError::Validation(_))
        ));
        assert!(matches!(
            svc.create_object(fixtures::object("M_VIEW", "materials")),
            Err(AuthzError::Conflict(_))
        ));
    }

    #[test]
    fn fields_keep_insertion_order() {
        let svc = fixtures::test_service();
        let codes: Vec<String> = svc
            .list_fields("M_EDIT")
            .unwrap()
            .into_iter()
            .map(|f| f.field_code)
            .collect();
        assert_eq!(codes, vec!["ACTVT", "PLANT"]);
    }

    #[test]
    fn duplicate_field_code_is_validation() {
        let svc = fixtures::test_service();
        let err = svc
            .create_field(fixtures::field("M_VIEW", "ACTVT", &["01"]))
            .unwrap_err();
        assert!(matches!(err, AuthzError::Validation(_)));
    }

    #[test]
    fn defaults_outside_domain_are_rejected() {
        let svc = fixtures::test_service();
        let mut input = fixtures::field("F_POST", "PO_TYPE", &["standard"]);
        input.default_values = Some(vec!["blanket".into()]);
        assert!(matches!(svc.create_field(input), Err(AuthzError::Validation(_))));
    }

    #[test]
    fn referenced_object_is_frozen() {
        let svc = fixtures::test_service();
        svc.assign_object("PM1", "M_EDIT").unwrap();

        // Module and field list are frozen.
        assert!(matches!(
            svc.update_object("M_EDIT", &json!({"module": "finance"})),
            Err(AuthzError::Conflict(_))
        ));
        assert!(matches!(
            svc.create_field(fixtures::field("M_EDIT", "WERKS", &[])),
            Err(AuthzError::Conflict(_))
        ));
        let plant = svc.find_field("M_EDIT", "PLANT").unwrap();
        assert!(matches!(
            svc.update_field(&plant.id, &json!({"field_code": "WERKS"})),
            Err(AuthzError::Conflict(_))
        ));
        assert!(matches!(svc.delete_field(&plant.id), Err(AuthzError::Conflict(_))));

        // Descriptive text stays editable.
        let updated = svc
            .update_object("M_EDIT", &json!({"description": "Change materials", "id": "HIJACK"}))
            .unwrap();
        assert_eq!(updated.id, "M_EDIT");
        assert_eq!(updated.description.as_deref(), Some("Change materials"));
        let field = svc.update_field(&plant.id, &json!({"description": "Plant"})).unwrap();
        assert_eq!(field.field_code, "PLANT");
    }

    #[test]
    fn unreferenced_object_can_move_module() {
        let svc = fixtures::test_service();
        let moved = svc.update_object("F_POST", &json!({"module": "controlling"})).unwrap();
        assert_eq!(moved.module, "controlling");
        assert_eq!(svc.list_modules().unwrap(), vec!["controlling", "materials"]);
    }

    #[test]
    fn delete_object_cascades_to_grants() {
        let svc = fixtures::test_service();
        svc.assign_object("PM1", "M_VIEW").unwrap();
        svc.assign_object("PM2", "M_VIEW").unwrap();

        let removal = svc.delete_object("M_VIEW").unwrap();
        assert_eq!(removal, ObjectRemoval { fields_removed: 1, grants_removed: 2 });
        assert!(!svc.is_referenced("M_VIEW").unwrap());
        assert!(matches!(svc.delete_object("M_VIEW"), Err(AuthzError::NotFound(_))));
    }

    #[test]
    fn deactivate_is_idempotent() {
        let svc = fixtures::test_service();
        assert!(!svc.deactivate_object("M_VIEW").unwrap().is_active);
        assert!(!svc.deactivate_object("M_VIEW").unwrap().is_active);
        let active: Vec<String> = svc
            .active_objects_in_module("materials")
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect();
        assert_eq!(active, vec!["M_EDIT"]);
    }
}
