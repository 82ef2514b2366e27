use std::collections::BTreeMap;

use tracing::{debug, info};

use openerp_core::now_rfc3339;

use crate::model::{AuthObject, GrantQuery, RoleAuthorization, grant_id};
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    pub fn get_grant(&self, id: &str) -> Result<RoleAuthorization, AuthzError> {
        self.store.get_grant(id)
    }

    /// Active grants matching the query.
    pub fn list_grants(&self, query: &GrantQuery) -> Result<Vec<RoleAuthorization>, AuthzError> {
        self.store.list_grants(query)
    }

    /// Grants of a role, optionally restricted to one module.
    pub fn list_role_authorizations(
        &self,
        role_id: &str,
        module: Option<&str>,
    ) -> Result<Vec<RoleAuthorization>, AuthzError> {
        let query = match module {
            Some(module) => GrantQuery::role_module(role_id, module),
            None => GrantQuery::role(role_id),
        };
        self.store.list_grants(&query)
    }

    /// The grant of a role on an object, if any.
    pub fn find_grant(&self, role_id: &str, object_id: &str) -> Result<Option<RoleAuthorization>, AuthzError> {
        match self.store.get_grant(&grant_id(role_id, object_id)) {
            Ok(grant) => Ok(Some(grant)),
            Err(AuthzError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Delete one grant by id.
    pub fn remove_grant(&self, id: &str) -> Result<(), AuthzError> {
        if !self.store.delete_grant(id)? {
            return Err(AuthzError::NotFound(format!("grant '{id}'")));
        }
        info!(grant = id, "grant removed");
        Ok(())
    }

    /// Insert or update the grant of `role_id` on `object`.
    ///
    /// `build` receives the current row (if any) and returns the row to store.
    /// Updates are compare-and-set on the version read here; an insert that
    /// loses to a concurrent insert re-reads and updates once.
    pub(crate) fn upsert_grant<F>(
        &self,
        role_id: &str,
        object: &AuthObject,
        build: F,
    ) -> Result<RoleAuthorization, AuthzError>
    where
        F: Fn(Option<&RoleAuthorization>) -> Result<RoleAuthorization, AuthzError>,
    {
        match self.find_grant(role_id, &object.id)? {
            Some(current) => {
                let next = build(Some(&current))?;
                self.store.write_grant(&next, Some(current.version))
            }
            None => {
                let next = build(None)?;
                match self.store.write_grant(&next, None) {
                    Err(AuthzError::Conflict(_)) => {
                        debug!(role = role_id, object = %object.id, "insert lost a race; updating");
                        let current = self.store.get_grant(&next.id)?;
                        let next = build(Some(&current))?;
                        self.store.write_grant(&next, Some(current.version))
                    }
                    other => other,
                }
            }
        }
    }
}

/// A fresh grant row with no values and no inheritance.
pub(crate) fn new_grant(role_id: &str, object: &AuthObject) -> RoleAuthorization {
    let now = now_rfc3339();
    RoleAuthorization {
        id: grant_id(role_id, &object.id),
        role_id: role_id.to_string(),
        object_id: object.id.clone(),
        module: object.module.clone(),
        field_values: BTreeMap::new(),
        module_full_access: false,
        object_full_access: false,
        valid_from: now.clone(),
        valid_to: None,
        is_active: true,
        version: 0,
        created_at: now.clone(),
        updated_at: now,
    }
}

/// `current` (or a fresh row) with a new `updated_at`.
pub(crate) fn base_grant(
    role_id: &str,
    object: &AuthObject,
    current: Option<&RoleAuthorization>,
) -> RoleAuthorization {
    match current {
        Some(current) => {
            let mut next = current.clone();
            next.updated_at = now_rfc3339();
            next
        }
        None => new_grant(role_id, object),
    }
}
