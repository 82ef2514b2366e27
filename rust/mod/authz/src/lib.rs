//! Authz module: field-level authorization cascades for ERP roles.
//!
//! # Scopes
//!
//! - **Module**: a group of authorization objects ("materials", "finance")
//! - **Object**: a permission unit with an ordered list of fields
//! - **Field**: a permission dimension whose grant holds a value set
//!
//! A role's grant on an object either inherits full access (from a module
//! or object cascade, read as `stored ∪ {*}`) or is custom and holds exactly
//! its stored values. Module full access also covers objects of the module
//! that have no grant row yet.
//!
//! # Usage
//!
//! ```ignore
//! use openerp_authz::{AuthzService, AuthzConfig, ModuleAction, Confirmation};
//!
//! let svc = AuthzService::new(sql, AuthzConfig::default())?;
//! svc.apply_module_action("PM1", "materials", ModuleAction::SelectAll, Confirmation::Unconfirmed)?;
//! let actvt = svc.effective_values("PM1", "M_VIEW", "ACTVT")?; // {*}
//! ```

pub mod model;
pub mod service;
pub mod store;

pub use model::*;
pub use service::bulk::{BulkAssignment, CommitOptions, ModuleAvailability, WizardStep};
pub use service::domain::{DomainResolver, EntityKind, ReferenceRow, SqlDomainResolver};
pub use service::editor::FieldEditSession;
pub use service::org::{NodeId, OrgNode, OrgTree};
pub use service::{AuthzConfig, AuthzError, AuthzService};
pub use store::{AuthzStore, SqlAuthzStore};
