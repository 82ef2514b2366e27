use serde::Serialize;

use crate::model::{ValueSet, WILDCARD};

/// One selectable token of a field's value domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainValue {
    pub value: String,
    pub label: String,
}

/// Where a domain was resolved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum DomainSource {
    /// The field's own enumerated values in the catalog.
    Catalog,
    /// Built-in code list (activities, document types).
    Static,
    /// Live organizational master data.
    Reference { table: String },
}

/// The valid tokens for a field. Always ends with the wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDomain {
    pub field_code: String,
    pub values: Vec<DomainValue>,
    pub source: DomainSource,
}

impl FieldDomain {
    pub fn new(field_code: &str, mut values: Vec<DomainValue>, source: DomainSource) -> Self {
        values.retain(|v| v.value != WILDCARD);
        values.push(DomainValue {
            value: WILDCARD.to_string(),
            label: "* - All".to_string(),
        });
        Self {
            field_code: field_code.to_string(),
            values,
            source,
        }
    }

    pub fn tokens(&self) -> ValueSet {
        self.values.iter().map(|v| v.value.clone()).collect()
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.values.iter().any(|v| v.value == value)
    }
}
