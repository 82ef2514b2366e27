//! The cascade engine: effective values and module/object level grants.
//!
//! Inheritance flows module → object → field:
//!
//! - `module_full_access` on any row of (role, module) covers every active
//!   object of the module, including objects with no row yet
//! - `object_full_access` covers every field of one object
//! - a custom row (both flags false) permits exactly its stored values
//!
//! Inherited rows read as `stored ∪ {*}`. Nothing is materialized until a
//! grant is converted to custom.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::model::{
    AccessTemplate, AuthField, AuthObject, BatchReport, BulkAssign, CascadeLevel, Confirmation,
    GrantQuery, ModuleAction, RoleAuthorization, ValueSet,
};
use crate::service::grant::base_grant;
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    // ── Effective values ──

    /// Effective value set of one field of a stored grant.
    ///
    /// NotFound if the grant is unknown, or the field is neither in the
    /// object's catalog nor stored on the grant.
    pub fn compute_effective(&self, grant_id: &str, field_code: &str) -> Result<ValueSet, AuthzError> {
        let grant = self.store.get_grant(grant_id)?;
        let known = grant.field_values.contains_key(field_code)
            || self
                .store
                .list_fields(&grant.object_id)?
                .iter()
                .any(|f| f.field_code == field_code);
        if !known {
            return Err(AuthzError::NotFound(format!(
                "field '{field_code}' on object '{}'",
                grant.object_id
            )));
        }
        Ok(grant.effective_values(field_code))
    }

    /// Effective value set of a role on an object's field, with or without a row.
    ///
    /// An object with no row is `{*}` when the role holds module full access
    /// in its module, empty otherwise.
    pub fn effective_values(
        &self,
        role_id: &str,
        object_id: &str,
        field_code: &str,
    ) -> Result<ValueSet, AuthzError> {
        self.require_role(role_id)?;
        let field = self.find_field(object_id, field_code)?;

        if let Some(grant) = self.find_grant(role_id, object_id)? {
            return Ok(grant.effective_values(&field.field_code));
        }
        let object = self.store.get_object(object_id)?;
        if object.is_active && self.has_module_coverage(role_id, &object.module)? {
            return Ok(ValueSet::wildcard());
        }
        Ok(ValueSet::new())
    }

    /// Whether any row of (role, module) carries `module_full_access`.
    pub fn has_module_coverage(&self, role_id: &str, module: &str) -> Result<bool, AuthzError> {
        Ok(self
            .store
            .list_grants(&GrantQuery::role_module(role_id, module))?
            .iter()
            .any(|g| g.module_full_access))
    }

    // ── Defaults ──

    /// The documented default set of a field.
    ///
    /// The field's own `default_values`, else the configured table entry for
    /// its code, else the configured fallback. The result is narrowed to the
    /// field's enumerated domain unless that domain contains `*`; a field
    /// without enumerated values is narrowed to its resolved domain, so the
    /// default never holds a token the field editor would reject.
    pub fn default_set(&self, field: &AuthField) -> Result<ValueSet, AuthzError> {
        let configured: ValueSet = match &field.default_values {
            Some(values) => values.iter().cloned().collect(),
            None => self
                .config
                .default_values
                .get(&field.field_code)
                .unwrap_or(&self.config.fallback_default)
                .iter()
                .cloned()
                .collect(),
        };
        if let Some(domain) = field.enumerated_domain() {
            return Ok(if domain.has_wildcard() {
                configured
            } else {
                configured.intersect(&domain)
            });
        }
        match self.domain_of(field) {
            Ok(domain) => Ok(configured.intersect(&domain.tokens())),
            Err(AuthzError::NotFound(_)) => Ok(configured),
            Err(e) => Err(e),
        }
    }

    fn default_field_values(&self, object_id: &str) -> Result<BTreeMap<String, ValueSet>, AuthzError> {
        self.store
            .list_fields(object_id)?
            .iter()
            .map(|f| Ok((f.field_code.clone(), self.default_set(f)?)))
            .collect()
    }

    // ── Module actions ──

    /// Apply a module-level cascade action for a role.
    ///
    /// Every object is written independently; objects that fail are listed
    /// in [`AuthzError::PartialBatch`] while the rest stay committed.
    pub fn apply_module_action(
        &self,
        role_id: &str,
        module: &str,
        action: ModuleAction,
        confirmation: Confirmation,
    ) -> Result<BatchReport, AuthzError> {
        if action.is_destructive() && !confirmation.is_confirmed() {
            return Err(AuthzError::Validation(format!(
                "{action} on module '{module}' revokes access and must be confirmed"
            )));
        }
        self.require_role(role_id)?;
        let objects = self.active_objects_in_module(module)?;

        let report = match action {
            ModuleAction::SelectAll => self.write_objects(role_id, Some(module), &objects, |cur, object| {
                let mut next = base_grant(role_id, object, cur);
                next.module_full_access = true;
                Ok(next)
            }),
            ModuleAction::ResetDefault => {
                self.write_objects(role_id, Some(module), &objects, |cur, object| {
                    let mut next = base_grant(role_id, object, cur);
                    next.module_full_access = false;
                    next.object_full_access = false;
                    next.field_values = self.default_field_values(&object.id)?;
                    Ok(next)
                })
            }
            ModuleAction::ClearCascade => self.clear_cascade(role_id, module)?,
            ModuleAction::RemoveAll => self.remove_all(role_id, module)?,
        };

        info!(
            role = role_id,
            module,
            action = action.as_str(),
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "module action applied"
        );
        finish_batch(report)
    }

    fn clear_cascade(&self, role_id: &str, module: &str) -> Result<BatchReport, AuthzError> {
        let mut report = BatchReport::new(role_id, Some(module));
        for grant in self.store.list_grants(&GrantQuery::role_module(role_id, module))? {
            if grant.is_custom() {
                continue;
            }
            match self.store.delete_grant(&grant.id) {
                Ok(_) => report.record_success(&grant.object_id),
                Err(e) => report.record_failure(&grant.object_id, e),
            }
        }
        if !report.succeeded.is_empty() {
            warn!(role = role_id, module, removed = report.succeeded.len(), "inherited grants cleared");
        }
        Ok(report)
    }

    fn remove_all(&self, role_id: &str, module: &str) -> Result<BatchReport, AuthzError> {
        let mut report = BatchReport::new(role_id, Some(module));
        let grants = self.store.list_grants(&GrantQuery::role_module(role_id, module))?;
        let removed = self.store.delete_grants_for_role_and_module(role_id, module)?;
        for grant in &grants {
            report.record_success(&grant.object_id);
        }
        if removed > 0 {
            warn!(role = role_id, module, removed, "all module grants removed");
        }
        Ok(report)
    }

    /// Upsert one grant per object, recording each outcome.
    fn write_objects<F>(
        &self,
        role_id: &str,
        module: Option<&str>,
        objects: &[AuthObject],
        build: F,
    ) -> BatchReport
    where
        F: Fn(Option<&RoleAuthorization>, &AuthObject) -> Result<RoleAuthorization, AuthzError>,
    {
        let mut report = BatchReport::new(role_id, module);
        for object in objects {
            match self.upsert_grant(role_id, object, |cur| build(cur, object)) {
                Ok(grant) => {
                    debug!(grant = %grant.id, object = %object.id, version = grant.version, "grant written");
                    report.record_success(&object.id);
                }
                Err(e) => report.record_failure(&object.id, e),
            }
        }
        report
    }

    // ── Object actions ──

    /// Set `object_full_access` on one existing grant.
    pub fn grant_object_full_access(&self, grant_id: &str) -> Result<RoleAuthorization, AuthzError> {
        let current = self.store.get_grant(grant_id)?;
        if current.object_full_access {
            return Ok(current);
        }
        let mut next = current.clone();
        next.object_full_access = true;
        next.updated_at = openerp_core::now_rfc3339();
        let stored = self.store.write_grant(&next, Some(current.version))?;
        info!(grant = grant_id, object = %stored.object_id, "object full access granted");
        Ok(stored)
    }

    /// Give a role the default (non-inherited) grant on one object.
    /// An existing grant is returned unchanged.
    pub fn assign_object(&self, role_id: &str, object_id: &str) -> Result<RoleAuthorization, AuthzError> {
        self.require_role(role_id)?;
        let object = self.store.get_object(object_id)?;
        if !object.is_active {
            return Err(AuthzError::Validation(format!("object '{object_id}' is inactive")));
        }
        if let Some(existing) = self.find_grant(role_id, object_id)? {
            return Ok(existing);
        }
        let defaults = self.default_field_values(object_id)?;
        let grant = self.upsert_grant(role_id, &object, |cur| match cur {
            Some(cur) => Ok(cur.clone()),
            None => {
                let mut next = base_grant(role_id, &object, None);
                next.field_values = defaults.clone();
                Ok(next)
            }
        })?;
        info!(role = role_id, object = object_id, "object assigned");
        Ok(grant)
    }

    /// Remove a role's grant on one object. Returns whether a row existed.
    pub fn unassign_object(&self, role_id: &str, object_id: &str) -> Result<bool, AuthzError> {
        let removed = self.store.delete_grant(&crate::model::grant_id(role_id, object_id))?;
        if removed {
            info!(role = role_id, object = object_id, "object unassigned");
        }
        Ok(removed)
    }

    // ── Bulk ──

    /// Grant a role many objects at once from a template.
    ///
    /// With `module` and no `object_ids`, every active object of the module is
    /// used. All ids are validated before anything is written.
    pub fn bulk_assign(&self, input: BulkAssign) -> Result<BatchReport, AuthzError> {
        self.require_role(&input.role_id)?;

        let objects = match (&input.module, input.object_ids.is_empty()) {
            (Some(module), true) => self.active_objects_in_module(module)?,
            (None, true) => {
                return Err(AuthzError::Validation("bulk assign needs objects or a module".into()));
            }
            (_, false) => {
                let mut objects = Vec::with_capacity(input.object_ids.len());
                for id in &input.object_ids {
                    let object = self.store.get_object(id)?;
                    if let Some(module) = &input.module {
                        if &object.module != module {
                            return Err(AuthzError::Validation(format!(
                                "object '{id}' is not in module '{module}'"
                            )));
                        }
                    }
                    if !object.is_active {
                        return Err(AuthzError::Validation(format!("object '{id}' is inactive")));
                    }
                    if !objects.iter().any(|o: &AuthObject| o.id == object.id) {
                        objects.push(object);
                    }
                }
                objects
            }
        };

        let role_id = input.role_id.as_str();
        let report = self.write_objects(role_id, input.module.as_deref(), &objects, |cur, object| {
            let mut next = base_grant(role_id, object, cur);
            match (input.template, input.cascade_level) {
                (AccessTemplate::FullAccess, CascadeLevel::Module) => next.module_full_access = true,
                (AccessTemplate::FullAccess, CascadeLevel::Object) => next.object_full_access = true,
                (AccessTemplate::DefaultAccess, _) => {
                    next.module_full_access = false;
                    next.object_full_access = false;
                    next.field_values = self.default_field_values(&object.id)?;
                }
            }
            Ok(next)
        });

        info!(
            role = role_id,
            template = ?input.template,
            level = ?input.cascade_level,
            succeeded = report.succeeded.len(),
            failed = report.failures.len(),
            "bulk assignment applied"
        );
        finish_batch(report)
    }
}

/// `Ok` for a clean batch, `PartialBatch` when any object failed.
fn finish_batch(report: BatchReport) -> Result<BatchReport, AuthzError> {
    if report.is_complete() {
        Ok(report)
    } else {
        warn!(
            role = %report.role_id,
            failed = ?report.failed_ids(),
            "batch partially applied"
        );
        Err(AuthzError::PartialBatch(Box::new(report)))
    }
}
