use tracing::info;

use openerp_core::now_rfc3339;

use crate::model::{CreateRole, Role};
use crate::service::{AuthzError, AuthzService};

impl AuthzService {
    /// Register a role so grants can reference it.
    pub fn create_role(&self, input: CreateRole) -> Result<Role, AuthzError> {
        if input.id.trim().is_empty() {
            return Err(AuthzError::Validation("role id cannot be empty".into()));
        }

        let now = now_rfc3339();
        let role = Role {
            name: input.name.unwrap_or_else(|| input.id.clone()),
            id: input.id,
            description: input.description,
            created_at: now.clone(),
            updated_at: now,
        };
        self.store.insert_role(&role)?;
        Ok(role)
    }

    pub fn get_role(&self, id: &str) -> Result<Role, AuthzError> {
        self.store.get_role(id)
    }

    pub fn list_roles(&self) -> Result<Vec<Role>, AuthzError> {
        self.store.list_roles()
    }

    /// Delete a role and every grant it holds. Returns the number of grants removed.
    pub fn delete_role(&self, id: &str) -> Result<usize, AuthzError> {
        let removed = self.store.delete_role(id)?;
        info!(role = id, grants_removed = removed, "role deleted");
        Ok(removed)
    }

    /// NotFound unless the role exists.
    pub(crate) fn require_role(&self, id: &str) -> Result<Role, AuthzError> {
        self.store
            .get_role(id)
            .map_err(|e| match e {
                AuthzError::NotFound(_) => AuthzError::NotFound(format!("role '{id}'")),
                other => other,
            })
    }
}
