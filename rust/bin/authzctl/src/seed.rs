//! Catalog seed file: roles, authorization objects with their fields, and
//! organizational master data.
//!
//! ```toml
//! [[roles]]
//! id = "PM1"
//! name = "Project manager"
//!
//! [[objects]]
//! id = "M_VIEW"
//! module = "materials"
//! fields = [{ code = "ACTVT", values = ["01", "02", "03"] }]
//!
//! [[reference]]
//! kind = "plant"
//! code = "P100"
//! name = "Berlin"
//! parent = "C100"
//! ```
//!
//! Seeding is additive: rows that already exist are left alone.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use openerp_authz::store::schema;
use openerp_authz::{
    AuthzError, AuthzService, CreateAuthField, CreateAuthObject, CreateRole, EntityKind,
    ReferenceRow,
};
use openerp_sql::SQLStore;

#[derive(Debug, Default, Deserialize)]
pub struct CatalogSeed {
    #[serde(default)]
    pub roles: Vec<SeedRole>,
    #[serde(default)]
    pub objects: Vec<SeedObject>,
    #[serde(default)]
    pub reference: Vec<SeedReference>,
}

#[derive(Debug, Deserialize)]
pub struct SeedRole {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SeedObject {
    pub id: String,
    pub module: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub fields: Vec<SeedField>,
}

#[derive(Debug, Deserialize)]
pub struct SeedField {
    pub code: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub default_values: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct SeedReference {
    pub kind: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// What a seed run created.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct SeedSummary {
    pub roles: usize,
    pub objects: usize,
    pub fields: usize,
    pub reference_rows: usize,
}

impl CatalogSeed {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read seed file {}: {}", path.display(), e))?;
        Ok(toml::from_str(&content)?)
    }

    /// Write the seed into the engine and the master-data tables.
    pub fn apply(&self, svc: &AuthzService, sql: &dyn SQLStore) -> anyhow::Result<SeedSummary> {
        let mut summary = SeedSummary::default();

        schema::init_reference_schema(sql)?;
        for row in &self.reference {
            let kind = EntityKind::from_str(&row.kind)
                .ok_or_else(|| anyhow::anyhow!("unknown reference kind '{}'", row.kind))?;
            schema::upsert_reference_row(
                sql,
                kind,
                &ReferenceRow {
                    code: row.code.clone(),
                    name: row.name.clone(),
                    parent: row.parent.clone(),
                },
                row.active,
            )?;
            summary.reference_rows += 1;
        }

        for role in &self.roles {
            let created = svc.create_role(CreateRole {
                id: role.id.clone(),
                name: role.name.clone(),
                description: role.description.clone(),
            });
            if skip_existing(created, "role", &role.id)? {
                summary.roles += 1;
            }
        }

        for object in &self.objects {
            let created = svc.create_object(CreateAuthObject {
                id: object.id.clone(),
                name: object.name.clone(),
                description: object.description.clone(),
                module: object.module.clone(),
            });
            if !skip_existing(created, "object", &object.id)? {
                continue;
            }
            summary.objects += 1;

            for field in &object.fields {
                svc.create_field(CreateAuthField {
                    object_id: object.id.clone(),
                    field_code: field.code.clone(),
                    description: field.description.clone(),
                    is_required: field.required,
                    values: field.values.clone(),
                    default_values: field.default_values.clone(),
                })?;
                summary.fields += 1;
            }
            if !object.active {
                svc.deactivate_object(&object.id)?;
            }
        }

        info!(
            roles = summary.roles,
            objects = summary.objects,
            fields = summary.fields,
            reference_rows = summary.reference_rows,
            "catalog seeded"
        );
        Ok(summary)
    }
}

/// `Ok(true)` if created, `Ok(false)` if it already existed.
fn skip_existing<T>(result: Result<T, AuthzError>, what: &str, id: &str) -> anyhow::Result<bool> {
    match result {
        Ok(_) => Ok(true),
        Err(AuthzError::Conflict(_)) => {
            debug!(what, id, "already present; skipped");
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
