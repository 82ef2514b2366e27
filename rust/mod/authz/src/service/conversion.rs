use std::collections::BTreeMap;

use tracing::info;

use openerp_core::now_rfc3339;

use crate::model::{Confirmation, GrantQuery, RoleAuthorization, ValueSet};
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    /// Turn an inherited grant into a custom one with the same effective values.
    ///
    /// Every field's effective set is written as stored values and both flags
    /// are cleared in one compare-and-set write. Custom grants are returned
    /// unchanged.
    ///
    /// Converting the last `module_full_access` row of a module ends virtual
    /// coverage of the module's other objects; that needs `Confirmed`.
    pub fn convert_to_custom(
        &self,
        grant_id: &str,
        confirmation: Confirmation,
    ) -> Result<RoleAuthorization, AuthzError> {
        let current = self.store.get_grant(grant_id)?;
        if current.is_custom() {
            return Ok(current);
        }

        if current.module_full_access && !confirmation.is_confirmed() {
            let narrowed = self.objects_losing_coverage(&current)?;
            if !narrowed.is_empty() {
                return Err(AuthzError::Validation(format!(
                    "converting grant {grant_id} ends module coverage of {}; confirmation required",
                    narrowed.join(", ")
                )));
            }
        }

        let mut codes: Vec<String> = self
            .store
            .list_fields(&current.object_id)?
            .into_iter()
            .map(|f| f.field_code)
            .collect();
        codes.extend(current.field_values.keys().cloned());

        let materialized: BTreeMap<String, ValueSet> = codes
            .into_iter()
            .map(|code| {
                let values = current.effective_values(&code);
                (code, values)
            })
            .collect();

        let mut next = current.clone();
        next.field_values = materialized;
        next.module_full_access = false;
        next.object_full_access = false;
        next.updated_at = now_rfc3339();

        let stored = self.store.write_grant(&next, Some(current.version))?;
        info!(
            grant = grant_id,
            role = %stored.role_id,
            object = %stored.object_id,
            from = ?current.inherited_from(),
            "grant converted to custom"
        );
        Ok(stored)
    }

    /// Active objects of the grant's module covered only through this row.
    fn objects_losing_coverage(&self, grant: &RoleAuthorization) -> Result<Vec<String>, AuthzError> {
        let rows = self
            .store
            .list_grants(&GrantQuery::role_module(&grant.role_id, &grant.module))?;
        if rows.iter().any(|g| g.id != grant.id && g.module_full_access) {
            return Ok(Vec::new());
        }
        let materialized: Vec<&str> = rows.iter().map(|g| g.object_id.as_str()).collect();
        Ok(self
            .store
            .list_objects()?
            .into_iter()
            .filter(|o| o.module == grant.module && o.is_active)
            .filter(|o| !materialized.contains(&o.id.as_str()))
            .map(|o| o.id)
            .collect())
    }
}
