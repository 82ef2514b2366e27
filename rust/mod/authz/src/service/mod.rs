pub mod bulk;
pub mod cascade;
pub mod catalog;
pub mod check;
pub mod conversion;
pub mod domain;
pub mod editor;
pub mod grant;
pub mod org;
pub mod role;

#[cfg(test)]
pub(crate) mod fixtures;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use openerp_sql::{SQLError, SQLStore};

use crate::model::BatchReport;
use crate::service::domain::{DomainResolver, SqlDomainResolver};
use crate::store::{AuthzStore, SqlAuthzStore};

/// Authorization engine error type.
#[derive(Debug, Error)]
pub enum AuthzError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation: {0}")]
    Validation(String),

    /// Duplicate key, or a concurrent writer changed the row first.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A batch committed some objects and failed others.
    #[error(
        "partial batch: {} of {} objects failed for role {}",
        .0.failures.len(),
        .0.attempted(),
        .0.role_id
    )]
    PartialBatch(Box<BatchReport>),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

impl From<SQLError> for AuthzError {
    fn from(e: SQLError) -> Self {
        if e.is_constraint() {
            AuthzError::Conflict(e.to_string())
        } else {
            AuthzError::Storage(e.to_string())
        }
    }
}

impl From<AuthzError> for openerp_core::ServiceError {
    fn from(e: AuthzError) -> Self {
        match e {
            AuthzError::NotFound(m) => openerp_core::ServiceError::NotFound(m),
            AuthzError::Validation(m) => openerp_core::ServiceError::Validation(m),
            AuthzError::Conflict(m) => openerp_core::ServiceError::Conflict(m),
            e @ AuthzError::PartialBatch(_) => {
                openerp_core::ServiceError::PartialFailure(e.to_string())
            }
            AuthzError::Storage(m) => openerp_core::ServiceError::Storage(m),
            AuthzError::Internal(m) => openerp_core::ServiceError::Internal(m),
        }
    }
}

/// Configuration for the authorization engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthzConfig {
    /// Field code → documented default set, used when a field has no
    /// `default_values` of its own.
    pub default_values: BTreeMap<String, Vec<String>>,
    /// Default set for field codes missing from `default_values`.
    pub fallback_default: Vec<String>,
    /// Reject field edits whose tokens fall outside the resolved domain.
    pub validate_field_values: bool,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        let mut default_values = BTreeMap::new();
        default_values.insert(
            "ACTVT".to_string(),
            ["01", "02", "03", "05", "06"].map(String::from).to_vec(),
        );
        for code in [
            "COMP_CODE", "PLANT", "STORAGE_LOC", "DEPT", "COST_CENTER", "PURCH_ORG",
            "PROJ_TYPE", "MR_TYPE", "PO_TYPE", "PR_TYPE", "MAT_TYPE", "PO_VALUE", "GL_ACCT",
        ] {
            default_values.insert(code.to_string(), vec!["*".to_string()]);
        }
        Self {
            default_values,
            fallback_default: vec!["*".to_string()],
            validate_field_values: true,
        }
    }
}

/// The authorization engine. Stateless apart from its collaborators.
pub struct AuthzService {
    pub(crate) store: Arc<dyn AuthzStore>,
    pub(crate) domains: Arc<dyn DomainResolver>,
    pub(crate) config: AuthzConfig,
}

impl AuthzService {
    /// Create the engine on an SQL database, initializing the schema.
    ///
    /// Reference domains are read from master-data tables of the same database.
    pub fn new(sql: Arc<dyn SQLStore>, config: AuthzConfig) -> Result<Arc<Self>, AuthzError> {
        let store = SqlAuthzStore::new(sql.clone())?;
        Ok(Arc::new(Self {
            store: Arc::new(store),
            domains: Arc::new(SqlDomainResolver::new(sql)),
            config,
        }))
    }

    /// Create the engine on caller-provided collaborators.
    pub fn with_store(
        store: Arc<dyn AuthzStore>,
        domains: Arc<dyn DomainResolver>,
        config: AuthzConfig,
    ) -> Arc<Self> {
        Arc::new(Self { store, domains, config })
    }

    pub fn config(&self) -> &AuthzConfig {
        &self.config
    }

    pub fn domains(&self) -> &dyn DomainResolver {
        self.domains.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use openerp_core::ServiceError;

    #[test]
    fn partial_batch_maps_to_partial_failure() {
        let mut report = BatchReport::new("PM1", Some("materials"));
        report.record_success("M_VIEW");
        report.record_failure("M_EDIT", "conflict: changed concurrently");

        let err: ServiceError = AuthzError::PartialBatch(Box::new(report)).into();
        assert_eq!(err.error_code(), "PARTIAL_FAILURE");
        assert_eq!(err.to_string(), "partial batch: 1 of 2 objects failed for role PM1");
    }

    #[test]
    fn default_config_table() {
        let config = AuthzConfig::default();
        assert_eq!(config.default_values["ACTVT"], vec!["01", "02", "03", "05", "06"]);
        assert_eq!(config.default_values["PLANT"], vec!["*"]);
        assert_eq!(config.fallback_default, vec!["*"]);
    }
}
