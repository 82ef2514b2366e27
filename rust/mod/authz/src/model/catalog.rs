use serde::{Deserialize, Serialize};

use crate::model::ValueSet;

/// An authorization object: a permission unit scoped to a module.
///
/// Example:
///   id = "M_EDIT"
///   module = "materials"
///   fields = ACTVT, PLANT (see [`AuthField`])
///
/// Once a grant references the object, its module and field list are frozen;
/// only descriptive text and `is_active` may change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthObject {
    /// Object code, unique across the catalog (e.g. "M_VIEW").
    pub id: String,

    /// Display name.
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Owning module (e.g. "materials", "finance").
    pub module: String,

    /// Inactive objects are skipped by cascades and deny access checks.
    pub is_active: bool,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for creating an authorization object.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuthObject {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub module: String,
}

/// A field (permission dimension) of an authorization object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthField {
    /// Generated id.
    pub id: String,

    /// Owning object id.
    pub object_id: String,

    /// Field code, unique within its object (e.g. "ACTVT", "PLANT").
    pub field_code: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub is_required: bool,

    /// Enumerated value domain. Empty = resolved from reference data.
    #[serde(default)]
    pub values: Vec<String>,

    /// Documented default set used by `reset_default` and single assigns.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_values: Option<Vec<String>>,

    /// Order within the object's field list.
    pub position: i64,

    pub created_at: String,
    pub updated_at: String,
}

impl AuthField {
    /// The enumerated domain as a set, if the field declares one.
    pub fn enumerated_domain(&self) -> Option<ValueSet> {
        if self.values.is_empty() {
            None
        } else {
            Some(self.values.iter().cloned().collect())
        }
    }
}

/// Input for creating a field.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAuthField {
    pub object_id: String,
    pub field_code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default_values: Option<Vec<String>>,
}

/// What `delete_object` removed alongside the object itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ObjectRemoval {
    pub fields_removed: usize,
    pub grants_removed: usize,
}
