//! Persistence boundary of the engine.
//!
//! [`AuthzStore`] is the CRUD collaborator every engine operation goes
//! through; [`SqlAuthzStore`] implements it on an embedded SQL database.

pub mod schema;
mod sql;

pub use sql::SqlAuthzStore;

use crate::model::{AuthField, AuthObject, GrantQuery, ObjectRemoval, Role, RoleAuthorization};
use crate::service::AuthzError;

/// Row-level persistence for the catalog, roles and grants.
///
/// Grant writes are conditional: `write_grant` with `expected_version =
/// None` only inserts, with `Some(v)` only updates a row still at version
/// `v`. Either way a lost race surfaces as [`AuthzError::Conflict`].
pub trait AuthzStore: Send + Sync {
    // ── Catalog ──

    fn list_objects(&self) -> Result<Vec<AuthObject>, AuthzError>;
    fn get_object(&self, id: &str) -> Result<AuthObject, AuthzError>;
    fn insert_object(&self, object: &AuthObject) -> Result<(), AuthzError>;
    fn update_object(&self, object: &AuthObject) -> Result<(), AuthzError>;
    /// Remove the object with its fields and grants in one transaction.
    fn delete_object(&self, id: &str) -> Result<ObjectRemoval, AuthzError>;

    /// Fields of an object ordered by position.
    fn list_fields(&self, object_id: &str) -> Result<Vec<AuthField>, AuthzError>;
    fn get_field(&self, id: &str) -> Result<AuthField, AuthzError>;
    fn insert_field(&self, field: &AuthField) -> Result<(), AuthzError>;
    fn update_field(&self, field: &AuthField) -> Result<(), AuthzError>;
    fn delete_field(&self, id: &str) -> Result<(), AuthzError>;

    // ── Roles ──

    fn list_roles(&self) -> Result<Vec<Role>, AuthzError>;
    fn get_role(&self, id: &str) -> Result<Role, AuthzError>;
    fn insert_role(&self, role: &Role) -> Result<(), AuthzError>;
    /// Remove the role and its grants. Returns the number of grants removed.
    fn delete_role(&self, id: &str) -> Result<usize, AuthzError>;

    // ── Grants ──

    /// Active grants matching every filter set in `query`.
    fn list_grants(&self, query: &GrantQuery) -> Result<Vec<RoleAuthorization>, AuthzError>;
    fn get_grant(&self, id: &str) -> Result<RoleAuthorization, AuthzError>;
    /// Insert or compare-and-set update. Returns the row as stored.
    fn write_grant(
        &self,
        grant: &RoleAuthorization,
        expected_version: Option<i64>,
    ) -> Result<RoleAuthorization, AuthzError>;
    /// Returns whether a row was removed.
    fn delete_grant(&self, id: &str) -> Result<bool, AuthzError>;
    /// Returns the number of rows removed.
    fn delete_grants_for_role_and_module(
        &self,
        role_id: &str,
        module: &str,
    ) -> Result<usize, AuthzError>;
}
