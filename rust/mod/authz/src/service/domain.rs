//! Field value domains: the tokens a grant may hold for a field.
//!
//! Resolution order for a field:
//! 1. the field's own enumerated values in the catalog
//! 2. a built-in code list (activities, document types)
//! 3. organizational master data, located through [`ENTITY_SCHEMAS`]

use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use openerp_sql::{SQLStore, Value};

use crate::model::{AuthField, DomainSource, DomainValue, FieldDomain};
use crate::service::{AuthzError, AuthzService};

// ── Entity schemas ──

/// Kinds of organizational master data a field can draw values from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    CompanyCode,
    Plant,
    StorageLocation,
    Department,
    CostCenter,
    PurchasingOrg,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompanyCode => "company_code",
            Self::Plant => "plant",
            Self::StorageLocation => "storage_location",
            Self::Department => "department",
            Self::CostCenter => "cost_center",
            Self::PurchasingOrg => "purchasing_org",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        ENTITY_SCHEMAS
            .iter()
            .map(|schema| schema.kind)
            .find(|kind| kind.as_str() == s)
    }

    pub fn schema(&self) -> &'static EntitySchema {
        // Every kind has exactly one row in the table.
        ENTITY_SCHEMAS
            .iter()
            .find(|schema| schema.kind == *self)
            .unwrap_or(&ENTITY_SCHEMAS[0])
    }
}

/// Where the rows of one entity kind live.
#[derive(Debug)]
pub struct EntitySchema {
    pub kind: EntityKind,
    pub table: &'static str,
    pub code_column: &'static str,
    pub name_column: &'static str,
    /// Column holding the parent's code, for hierarchical kinds.
    pub parent_column: Option<&'static str>,
    /// Kind of the parent level.
    pub parent_kind: Option<EntityKind>,
    /// Field codes whose domain is this entity's codes.
    pub field_codes: &'static [&'static str],
}

/// Master-data lookup table, one row per entity kind.
pub static ENTITY_SCHEMAS: &[EntitySchema] = &[
    EntitySchema {
        kind: EntityKind::CompanyCode,
        table: "company_codes",
        code_column: "company_code",
        name_column: "company_name",
        parent_column: None,
        parent_kind: None,
        field_codes: &["COMP_CODE", "BUKRS"],
    },
    EntitySchema {
        kind: EntityKind::Plant,
        table: "plants",
        code_column: "plant_code",
        name_column: "plant_name",
        parent_column: Some("company_code"),
        parent_kind: Some(EntityKind::CompanyCode),
        field_codes: &["PLANT", "WERKS"],
    },
    EntitySchema {
        kind: EntityKind::StorageLocation,
        table: "storage_locations",
        code_column: "sloc_code",
        name_column: "sloc_name",
        parent_column: Some("plant_code"),
        parent_kind: Some(EntityKind::Plant),
        field_codes: &["STORAGE_LOC", "LGORT"],
    },
    EntitySchema {
        kind: EntityKind::Department,
        table: "departments",
        code_column: "dept_code",
        name_column: "name",
        parent_column: None,
        parent_kind: None,
        field_codes: &["DEPT"],
    },
    EntitySchema {
        kind: EntityKind::CostCenter,
        table: "cost_centers",
        code_column: "cost_center_code",
        name_column: "cost_center_name",
        parent_column: None,
        parent_kind: None,
        field_codes: &["COST_CENTER", "KOSTL"],
    },
    EntitySchema {
        kind: EntityKind::PurchasingOrg,
        table: "purchasing_organizations",
        code_column: "porg_code",
        name_column: "porg_name",
        parent_column: None,
        parent_kind: None,
        field_codes: &["PURCH_ORG", "EKORG"],
    },
];

/// The entity schema backing a field code, if any.
pub fn entity_schema(field_code: &str) -> Option<&'static EntitySchema> {
    ENTITY_SCHEMAS
        .iter()
        .find(|schema| schema.field_codes.contains(&field_code))
}

// ── Static code lists ──

static ACTIVITY_CODES: &[(&str, &str)] = &[
    ("01", "01 - Create"),
    ("02", "02 - Change"),
    ("03", "03 - Display"),
    ("06", "06 - Delete"),
];

static PO_TYPES: &[(&str, &str)] = &[("standard", "Standard"), ("blanket", "Blanket")];

static MATERIAL_TYPES: &[(&str, &str)] = &[("FERT", "Finished"), ("ROH", "Raw Material")];

/// Built-in code list for a field code, as (value, label) pairs.
pub fn static_values(field_code: &str) -> Option<&'static [(&'static str, &'static str)]> {
    match field_code {
        "ACTVT" => Some(ACTIVITY_CODES),
        "PO_TYPE" => Some(PO_TYPES),
        "MAT_TYPE" => Some(MATERIAL_TYPES),
        _ => None,
    }
}

// ── Resolver ──

/// One active master-data row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceRow {
    pub code: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

impl ReferenceRow {
    pub fn label(&self) -> String {
        format!("{} - {}", self.code, self.name)
    }
}

/// Reference-data collaborator: resolves field codes to value domains.
pub trait DomainResolver: Send + Sync {
    /// Domain of a field code from code lists or master data.
    /// Unknown field codes are `NotFound`.
    fn resolve(&self, field_code: &str) -> Result<FieldDomain, AuthzError>;

    /// Active rows of one entity kind, ordered by code.
    fn reference_rows(&self, kind: EntityKind) -> Result<Vec<ReferenceRow>, AuthzError>;
}

/// Resolver reading master data from SQL tables described by [`ENTITY_SCHEMAS`].
pub struct SqlDomainResolver {
    sql: Arc<dyn SQLStore>,
}

impl SqlDomainResolver {
    pub fn new(sql: Arc<dyn SQLStore>) -> Self {
        Self { sql }
    }
}

impl DomainResolver for SqlDomainResolver {
    fn resolve(&self, field_code: &str) -> Result<FieldDomain, AuthzError> {
        if let Some(list) = static_values(field_code) {
            let values = list
                .iter()
                .map(|(value, label)| DomainValue {
                    value: value.to_string(),
                    label: label.to_string(),
                })
                .collect();
            return Ok(FieldDomain::new(field_code, values, DomainSource::Static));
        }

        let schema = entity_schema(field_code)
            .ok_or_else(|| AuthzError::NotFound(format!("unknown field: {field_code}")))?;
        let values = self
            .reference_rows(schema.kind)?
            .into_iter()
            .map(|row| DomainValue {
                label: row.label(),
                value: row.code,
            })
            .collect();
        Ok(FieldDomain::new(
            field_code,
            values,
            DomainSource::Reference {
                table: schema.table.to_string(),
            },
        ))
    }

    fn reference_rows(&self, kind: EntityKind) -> Result<Vec<ReferenceRow>, AuthzError> {
        let schema = kind.schema();
        let parent = schema.parent_column.unwrap_or("NULL");
        let sql = format!(
            "SELECT {code} AS code, {name} AS name, {parent} AS parent FROM {table} \
             WHERE is_active = ?1 ORDER BY {code}",
            code = schema.code_column,
            name = schema.name_column,
            table = schema.table,
        );
        let rows = self.sql.query(&sql, &[Value::bool(true)])?;
        debug!(kind = kind.as_str(), rows = rows.len(), "reference rows loaded");

        Ok(rows
            .iter()
            .filter_map(|row| {
                Some(ReferenceRow {
                    code: row.get_str("code")?.to_string(),
                    name: row.get_str("name").unwrap_or_default().to_string(),
                    parent: row.get_str("parent").map(str::to_string),
                })
            })
            .collect())
    }
}

impl AuthzService {
    /// Domain of one field of an object.
    ///
    /// A field with enumerated values uses them as-is; otherwise the field
    /// code is resolved through the reference-data collaborator.
    pub fn field_domain(&self, object_id: &str, field_code: &str) -> Result<FieldDomain, AuthzError> {
        let field = self.find_field(object_id, field_code)?;
        self.domain_of(&field)
    }

    pub(crate) fn domain_of(&self, field: &AuthField) -> Result<FieldDomain, AuthzError> {
        if field.values.is_empty() {
            return self.domains.resolve(&field.field_code);
        }
        let values = field
            .values
            .iter()
            .map(|v| DomainValue {
                value: v.clone(),
                label: static_label(&field.field_code, v).unwrap_or_else(|| v.clone()),
            })
            .collect();
        Ok(FieldDomain::new(&field.field_code, values, DomainSource::Catalog))
    }
}

fn static_label(field_code: &str, value: &str) -> Option<String> {
    static_values(field_code)?
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, label)| label.to_string())
}
