use openerp_sql::{SQLStore, Value};

use crate::service::AuthzError;
use crate::service::domain::{ENTITY_SCHEMAS, EntityKind, ReferenceRow};

/// Initialize the SQLite schema for the catalog, roles and grants.
pub fn init_schema(sql: &dyn SQLStore) -> Result<(), AuthzError> {
    let statements = [
        // Authorization objects: permission units grouped by module
        "CREATE TABLE IF NOT EXISTS auth_objects (
            id TEXT PRIMARY KEY,
            module TEXT NOT NULL,
            active INTEGER NOT NULL DEFAULT 1,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_auth_objects_module ON auth_objects(module)",

        // Fields: ordered permission dimensions of an object
        "CREATE TABLE IF NOT EXISTS auth_fields (
            id TEXT PRIMARY KEY,
            object_id TEXT NOT NULL,
            field_code TEXT NOT NULL,
            position INTEGER NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (object_id, field_code),
            FOREIGN KEY (object_id) REFERENCES auth_objects(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_auth_fields_object ON auth_fields(object_id)",

        // Roles: referenced by grants
        "CREATE TABLE IF NOT EXISTS roles (
            id TEXT PRIMARY KEY,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",

        // Grants: one row per (role, object); flags and version are columns so
        // cascades and compare-and-set can filter on them without decoding JSON
        "CREATE TABLE IF NOT EXISTS role_authorizations (
            id TEXT PRIMARY KEY,
            role_id TEXT NOT NULL,
            object_id TEXT NOT NULL,
            module TEXT NOT NULL,
            module_full_access INTEGER NOT NULL DEFAULT 0,
            object_full_access INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            version INTEGER NOT NULL,
            data TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (role_id, object_id),
            FOREIGN KEY (role_id) REFERENCES roles(id) ON DELETE CASCADE,
            FOREIGN KEY (object_id) REFERENCES auth_objects(id) ON DELETE CASCADE
        )",
        "CREATE INDEX IF NOT EXISTS idx_role_auth_role_module ON role_authorizations(role_id, module)",
        "CREATE INDEX IF NOT EXISTS idx_role_auth_object ON role_authorizations(object_id)",
    ];

    for stmt in &statements {
        sql.exec(stmt, &[])
            .map_err(|e| AuthzError::Storage(e.to_string()))?;
    }

    Ok(())
}

/// Create the organizational master-data tables the domain resolver reads.
///
/// The tables are owned by the master-data screens; this only ensures they
/// exist for standalone deployments and tests.
pub fn init_reference_schema(sql: &dyn SQLStore) -> Result<(), AuthzError> {
    for schema in ENTITY_SCHEMAS {
        let parent = schema
            .parent_column
            .map(|col| format!("{col} TEXT,\n            "))
            .unwrap_or_default();
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
            {code} TEXT PRIMARY KEY,
            {name} TEXT NOT NULL,
            {parent}is_active INTEGER NOT NULL DEFAULT 1
        )",
            table = schema.table,
            code = schema.code_column,
            name = schema.name_column,
        );
        sql.exec(&ddl, &[])
            .map_err(|e| AuthzError::Storage(e.to_string()))?;
    }
    Ok(())
}

/// Insert or replace one master-data row.
pub fn upsert_reference_row(
    sql: &dyn SQLStore,
    kind: EntityKind,
    row: &ReferenceRow,
    is_active: bool,
) -> Result<(), AuthzError> {
    let schema = kind.schema();
    let mut cols = vec![schema.code_column, schema.name_column, "is_active"];
    let mut params = vec![
        Value::Text(row.code.clone()),
        Value::Text(row.name.clone()),
        Value::bool(is_active),
    ];
    if let Some(parent_col) = schema.parent_column {
        cols.push(parent_col);
        params.push(Value::opt_text(row.parent.as_deref()));
    }
    let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
    let stmt = format!(
        "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
        schema.table,
        cols.join(", "),
        placeholders.join(", "),
    );
    sql.exec(&stmt, &params)?;
    Ok(())
}
