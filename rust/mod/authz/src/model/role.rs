use serde::{Deserialize, Serialize};

/// A role that authorization objects are granted to.
///
/// Roles are managed by the surrounding administration; the engine only
/// references them by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Role {
    /// Unique identifier (e.g. "PM1").
    pub id: String,

    /// Human-readable name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub created_at: String,
    pub updated_at: String,
}

/// Input for creating a role.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRole {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}
