use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::ValueSet;

/// A grant: what a role may do for one authorization object.
///
/// - **field_values**: stored value set per field code
/// - **module_full_access**: inherited from a module-level cascade
/// - **object_full_access**: inherited from an object-level cascade
///
/// ID is derived from hash(role_id + object_id); the same pair always maps
/// to the same row, so re-running a cascade updates instead of duplicating.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAuthorization {
    /// Deterministic id, see [`grant_id`].
    pub id: String,

    pub role_id: String,

    pub object_id: String,

    /// Module of the object at grant time.
    pub module: String,

    /// Field code → stored value set.
    #[serde(default)]
    pub field_values: BTreeMap<String, ValueSet>,

    pub module_full_access: bool,

    pub object_full_access: bool,

    /// RFC 3339 start of validity.
    pub valid_from: String,

    /// RFC 3339 end of validity. None = open-ended.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<String>,

    pub is_active: bool,

    /// Bumped on every write; updates are compare-and-set on it.
    pub version: i64,

    pub created_at: String,
    pub updated_at: String,
}

/// Where a non-custom grant inherits its full access from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Inheritance {
    Module,
    Object,
}

impl RoleAuthorization {
    /// A grant is custom iff neither full-access flag is set.
    pub fn is_custom(&self) -> bool {
        !self.module_full_access && !self.object_full_access
    }

    /// Module inheritance takes precedence in reporting when both flags are set.
    pub fn inherited_from(&self) -> Option<Inheritance> {
        if self.module_full_access {
            Some(Inheritance::Module)
        } else if self.object_full_access {
            Some(Inheritance::Object)
        } else {
            None
        }
    }

    /// Stored value set for a field (empty if never written).
    pub fn stored_values(&self, field_code: &str) -> ValueSet {
        self.field_values.get(field_code).cloned().unwrap_or_default()
    }

    /// Effective value set: stored values, plus `*` when full access is inherited.
    pub fn effective_values(&self, field_code: &str) -> ValueSet {
        let stored = self.stored_values(field_code);
        if self.is_custom() {
            stored
        } else {
            stored.with_wildcard()
        }
    }

    /// Whether `at` falls inside `[valid_from, valid_to)`.
    /// Unparseable bounds are treated as open.
    pub fn is_valid_at(&self, at: chrono::DateTime<chrono::Utc>) -> bool {
        if let Some(from) = openerp_core::parse_rfc3339(&self.valid_from) {
            if at < from {
                return false;
            }
        }
        if let Some(to) = self.valid_to.as_deref().and_then(openerp_core::parse_rfc3339) {
            if at >= to {
                return false;
            }
        }
        true
    }
}

/// Compute the deterministic grant id from (role_id, object_id).
pub fn grant_id(role_id: &str, object_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(role_id.as_bytes());
    hasher.update(b":");
    hasher.update(object_id.as_bytes());
    let digest = hasher.finalize();
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

/// Filters for listing grants. All set filters must match.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrantQuery {
    #[serde(default)]
    pub role_id: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
    #[serde(default)]
    pub object_id: Option<String>,
}

impl GrantQuery {
    pub fn role(role_id: &str) -> Self {
        Self {
            role_id: Some(role_id.to_string()),
            ..Default::default()
        }
    }

    pub fn role_module(role_id: &str, module: &str) -> Self {
        Self {
            role_id: Some(role_id.to_string()),
            module: Some(module.to_string()),
            object_id: None,
        }
    }
}
