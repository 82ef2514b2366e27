use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Parameters for an access check.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckRequest {
    pub role_id: String,
    pub object_id: String,
    /// Field code → requested value. Fields not listed are not checked.
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// How a role reaches an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Coverage {
    /// Grant row with `module_full_access`.
    Module,
    /// Grant row with `object_full_access`.
    Object,
    /// Grant row with explicit field values only.
    Custom,
    /// No row for the object, but another object of its module carries
    /// `module_full_access` for the role.
    VirtualModule,
    None,
}

/// Result of an access check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub allowed: bool,
    pub coverage: Coverage,
    /// The grant consulted, if a row exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant_id: Option<String>,
    /// First requested field whose value was not permitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denied_field: Option<String>,
}

impl CheckResult {
    pub fn denied(coverage: Coverage, grant_id: Option<String>) -> Self {
        Self {
            allowed: false,
            coverage,
            grant_id,
            denied_field: None,
        }
    }
}
