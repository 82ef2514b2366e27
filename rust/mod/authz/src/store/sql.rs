use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use openerp_sql::{Row, SQLStore, Statement, Value};

use crate::model::{AuthField, AuthObject, GrantQuery, ObjectRemoval, Role, RoleAuthorization};
use crate::service::AuthzError;
use crate::store::{AuthzStore, schema};

/// [`AuthzStore`] backed by an embedded SQL database.
///
/// Every row keeps its full JSON in a `data` column; the columns the engine
/// filters on (module, flags, version) are duplicated as indexed columns.
pub struct SqlAuthzStore {
    sql: Arc<dyn SQLStore>,
}

impl SqlAuthzStore {
    /// Create the store, initializing the schema.
    pub fn new(sql: Arc<dyn SQLStore>) -> Result<Self, AuthzError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Self { sql })
    }

    // ── Generic row helpers ──

    fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AuthzError> {
        let json = to_json(record)?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 3));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );

        self.sql.exec(&sql, &params).map_err(|e| {
            if e.is_constraint() {
                AuthzError::Conflict(format!("{table}/{id} already exists"))
            } else {
                AuthzError::Storage(e.to_string())
            }
        })?;
        Ok(())
    }

    fn get_record<T: DeserializeOwned>(&self, table: &str, id: &str) -> Result<T, AuthzError> {
        let sql = format!("SELECT data FROM {table} WHERE id = ?1");
        let rows = self.sql.query(&sql, &[Value::Text(id.to_string())])?;
        let row = rows
            .first()
            .ok_or_else(|| AuthzError::NotFound(format!("{table}/{id}")))?;
        from_row(row)
    }

    fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AuthzError> {
        let json = to_json(record)?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params = vec![Value::Text(json)];
        for (i, (col, val)) in indexes.iter().enumerate() {
            sets.push(format!("{} = ?{}", col, i + 2));
            params.push(val.clone());
        }
        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!("UPDATE {} SET {} WHERE id = ?{}", table, sets.join(", "), id_idx);
        if self.sql.exec(&sql, &params)? == 0 {
            return Err(AuthzError::NotFound(format!("{table}/{id}")));
        }
        Ok(())
    }

    /// `SELECT data` with equality filters, decoded in order.
    fn select_records<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
        order_by: &str,
    ) -> Result<Vec<T>, AuthzError> {
        let mut where_clauses = Vec::new();
        let mut params = Vec::new();
        for (i, (col, val)) in filters.iter().enumerate() {
            where_clauses.push(format!("{} = ?{}", col, i + 1));
            params.push(val.clone());
        }
        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let sql = format!("SELECT data FROM {table}{where_sql} ORDER BY {order_by}");
        let rows = self.sql.query(&sql, &params)?;
        rows.iter().map(from_row).collect()
    }

    fn count(&self, sql: &str, params: &[Value]) -> Result<i64, AuthzError> {
        let rows = self.sql.query(sql, params)?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0))
    }
}

fn to_json<T: Serialize>(record: &T) -> Result<String, AuthzError> {
    serde_json::to_string(record).map_err(|e| AuthzError::Internal(e.to_string()))
}

fn from_row<T: DeserializeOwned>(row: &Row) -> Result<T, AuthzError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| AuthzError::Internal("missing data column".into()))?;
    serde_json::from_str(data).map_err(|e| AuthzError::Internal(e.to_string()))
}

impl AuthzStore for SqlAuthzStore {
    // ── Catalog ──

    fn list_objects(&self) -> Result<Vec<AuthObject>, AuthzError> {
        self.select_records("auth_objects", &[], "module, id")
    }

    fn get_object(&self, id: &str) -> Result<AuthObject, AuthzError> {
        self.get_record("auth_objects", id)
    }

    fn insert_object(&self, object: &AuthObject) -> Result<(), AuthzError> {
        self.insert_record(
            "auth_objects",
            &object.id,
            object,
            &[
                ("module", Value::Text(object.module.clone())),
                ("active", Value::bool(object.is_active)),
                ("created_at", Value::Text(object.created_at.clone())),
                ("updated_at", Value::Text(object.updated_at.clone())),
            ],
        )
    }

    fn update_object(&self, object: &AuthObject) -> Result<(), AuthzError> {
        self.update_record(
            "auth_objects",
            &object.id,
            object,
            &[
                ("module", Value::Text(object.module.clone())),
                ("active", Value::bool(object.is_active)),
                ("updated_at", Value::Text(object.updated_at.clone())),
            ],
        )
    }

    fn delete_object(&self, id: &str) -> Result<ObjectRemoval, AuthzError> {
        // Existence first so a missing object is NotFound rather than a no-op.
        let _object: AuthObject = self.get_record("auth_objects", id)?;

        let key = || vec![Value::Text(id.to_string())];
        let affected = self.sql.transaction(&[
            Statement::new("DELETE FROM role_authorizations WHERE object_id = ?1", key()),
            Statement::new("DELETE FROM auth_fields WHERE object_id = ?1", key()),
            Statement::new("DELETE FROM auth_objects WHERE id = ?1", key()),
        ])?;

        Ok(ObjectRemoval {
            grants_removed: affected[0] as usize,
            fields_removed: affected[1] as usize,
        })
    }

    fn list_fields(&self, object_id: &str) -> Result<Vec<AuthField>, AuthzError> {
        self.select_records(
            "auth_fields",
            &[("object_id", Value::Text(object_id.to_string()))],
            "position, field_code",
        )
    }

    fn get_field(&self, id: &str) -> Result<AuthField, AuthzError> {
        self.get_record("auth_fields", id)
    }

    fn insert_field(&self, field: &AuthField) -> Result<(), AuthzError> {
        self.insert_record(
            "auth_fields",
            &field.id,
            field,
            &[
                ("object_id", Value::Text(field.object_id.clone())),
                ("field_code", Value::Text(field.field_code.clone())),
                ("position", Value::Integer(field.position)),
                ("created_at", Value::Text(field.created_at.clone())),
                ("updated_at", Value::Text(field.updated_at.clone())),
            ],
        )
        .map_err(|e| match e {
            AuthzError::Conflict(_) => AuthzError::Validation(format!(
                "field code '{}' already exists on object '{}'",
                field.field_code, field.object_id
            )),
            other => other,
        })
    }

    fn update_field(&self, field: &AuthField) -> Result<(), AuthzError> {
        self.update_record(
            "auth_fields",
            &field.id,
            field,
            &[
                ("field_code", Value::Text(field.field_code.clone())),
                ("position", Value::Integer(field.position)),
                ("updated_at", Value::Text(field.updated_at.clone())),
            ],
        )
        .map_err(|e| match e {
            AuthzError::Conflict(_) => AuthzError::Validation(format!(
                "field code '{}' already exists on object '{}'",
                field.field_code, field.object_id
            )),
            other => other,
        })
    }

    fn delete_field(&self, id: &str) -> Result<(), AuthzError> {
        if self.sql.exec("DELETE FROM auth_fields WHERE id = ?1", &[Value::Text(id.to_string())])? == 0 {
            return Err(AuthzError::NotFound(format!("auth_fields/{id}")));
        }
        Ok(())
    }

    // ── Roles ──

    fn list_roles(&self) -> Result<Vec<Role>, AuthzError> {
        self.select_records("roles", &[], "id")
    }

    fn get_role(&self, id: &str) -> Result<Role, AuthzError> {
        self.get_record("roles", id)
    }

    fn insert_role(&self, role: &Role) -> Result<(), AuthzError> {
        self.insert_record(
            "roles",
            &role.id,
            role,
            &[
                ("created_at", Value::Text(role.created_at.clone())),
                ("updated_at", Value::Text(role.updated_at.clone())),
            ],
        )
    }

    fn delete_role(&self, id: &str) -> Result<usize, AuthzError> {
        let _role: Role = self.get_record("roles", id)?;

        let key = || vec![Value::Text(id.to_string())];
        let affected = self.sql.transaction(&[
            Statement::new("DELETE FROM role_authorizations WHERE role_id = ?1", key()),
            Statement::new("DELETE FROM roles WHERE id = ?1", key()),
        ])?;
        Ok(affected[0] as usize)
    }

    // ── Grants ──

    fn list_grants(&self, query: &GrantQuery) -> Result<Vec<RoleAuthorization>, AuthzError> {
        let mut filters = vec![("active", Value::bool(true))];
        if let Some(ref role_id) = query.role_id {
            filters.push(("role_id", Value::Text(role_id.clone())));
        }
        if let Some(ref module) = query.module {
            filters.push(("module", Value::Text(module.clone())));
        }
        if let Some(ref object_id) = query.object_id {
            filters.push(("object_id", Value::Text(object_id.clone())));
        }
        self.select_records("role_authorizations", &filters, "role_id, module, object_id")
    }

    fn get_grant(&self, id: &str) -> Result<RoleAuthorization, AuthzError> {
        self.get_record("role_authorizations", id)
    }

    fn write_grant(
        &self,
        grant: &RoleAuthorization,
        expected_version: Option<i64>,
    ) -> Result<RoleAuthorization, AuthzError> {
        let mut stored = grant.clone();
        stored.version = expected_version.map_or(1, |v| v + 1);
        let json = to_json(&stored)?;

        match expected_version {
            None => {
                self.sql
                    .exec(
                        "INSERT INTO role_authorizations \
                         (id, role_id, object_id, module, module_full_access, object_full_access, \
                          active, version, data, created_at, updated_at) \
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                        &[
                            Value::Text(stored.id.clone()),
                            Value::Text(stored.role_id.clone()),
                            Value::Text(stored.object_id.clone()),
                            Value::Text(stored.module.clone()),
                            Value::bool(stored.module_full_access),
                            Value::bool(stored.object_full_access),
                            Value::bool(stored.is_active),
                            Value::Integer(stored.version),
                            Value::Text(json),
                            Value::Text(stored.created_at.clone()),
                            Value::Text(stored.updated_at.clone()),
                        ],
                    )
                    .map_err(|e| {
                        if e.is_constraint() {
                            AuthzError::Conflict(format!(
                                "grant for role '{}' on '{}' already exists",
                                stored.role_id, stored.object_id
                            ))
                        } else {
                            AuthzError::Storage(e.to_string())
                        }
                    })?;
            }
            Some(expected) => {
                let affected = self.sql.exec(
                    "UPDATE role_authorizations SET \
                     module_full_access = ?1, object_full_access = ?2, active = ?3, \
                     version = ?4, data = ?5, updated_at = ?6 \
                     WHERE id = ?7 AND version = ?8",
                    &[
                        Value::bool(stored.module_full_access),
                        Value::bool(stored.object_full_access),
                        Value::bool(stored.is_active),
                        Value::Integer(stored.version),
                        Value::Text(json),
                        Value::Text(stored.updated_at.clone()),
                        Value::Text(stored.id.clone()),
                        Value::Integer(expected),
                    ],
                )?;
                if affected == 0 {
                    let exists = self.count(
                        "SELECT COUNT(*) AS cnt FROM role_authorizations WHERE id = ?1",
                        &[Value::Text(stored.id.clone())],
                    )? > 0;
                    return Err(if exists {
                        AuthzError::Conflict(format!(
                            "grant {} changed concurrently (expected version {expected})",
                            stored.id
                        ))
                    } else {
                        AuthzError::NotFound(format!("role_authorizations/{}", stored.id))
                    });
                }
            }
        }

        debug!(grant = %stored.id, version = stored.version, "grant written");
        Ok(stored)
    }

    fn delete_grant(&self, id: &str) -> Result<bool, AuthzError> {
        let affected = self.sql.exec(
            "DELETE FROM role_authorizations WHERE id = ?1",
            &[Value::Text(id.to_string())],
        )?;
        Ok(affected > 0)
    }

    fn delete_grants_for_role_and_module(
        &self,
        role_id: &str,
        module: &str,
    ) -> Result<usize, AuthzError> {
        let affected = self.sql.exec(
            "DELETE FROM role_authorizations WHERE role_id = ?1 AND module = ?2",
            &[Value::Text(role_id.to_string()), Value::Text(module.to_string())],
        )?;
        Ok(affected as usize)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use openerp_core::now_rfc3339;
    use openerp_sql::SqliteStore;

    use super::*;
    use crate::model::{ValueSet, grant_id};

    fn store() -> SqlAuthzStore {
        SqlAuthzStore::new(Arc::new(SqliteStore::open_in_memory().unwrap())).unwrap()
    }

    fn seed(store: &SqlAuthzStore) {
        let now = now_rfc3339();
        store
            .insert_role(&Role {
                id: "PM1".into(),
                name: "Project manager".into(),
                description: None,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
            .unwrap();
        store
            .insert_object(&AuthObject {
                id: "M_VIEW".into(),
                name: "Display material".into(),
                description: None,
                module: "materials".into(),
                is_active: true,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();
    }

    fn grant() -> RoleAuthorization {
        let now = now_rfc3339();
        RoleAuthorization {
            id: grant_id("PM1", "M_VIEW"),
            role_id: "PM1".into(),
            object_id: "M_VIEW".into(),
            module: "materials".into(),
            field_values: BTreeMap::from([("ACTVT".into(), ValueSet::from_iter(["03"]))]),
            module_full_access: false,
            object_full_access: false,
            valid_from: now.clone(),
            valid_to: None,
            is_active: true,
            version: 0,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    #[test]
    fn insert_then_compare_and_set() {
        let store = store();
        seed(&store);

        let inserted = store.write_grant(&grant(), None).unwrap();
        assert_eq!(inserted.version, 1);

        let mut next = inserted.clone();
        next.object_full_access = true;
        let updated = store.write_grant(&next, Some(1)).unwrap();
        assert_eq!(updated.version, 2);

        // Stale writer loses.
        let err = store.write_grant(&next, Some(1)).unwrap_err();
        assert!(matches!(err, AuthzError::Conflict(_)), "{err}");

        let fetched = store.get_grant(&inserted.id).unwrap();
        assert!(fetched.object_full_access);
        assert_eq!(fetched.version, 2);
    }

    #[test]
    fn duplicate_insert_is_conflict() {
        let store = store();
        seed(&store);
        store.write_grant(&grant(), None).unwrap();
        let err = store.write_grant(&grant(), None).unwrap_err();
        assert!(matches!(err, AuthzError::Conflict(_)));
    }

    #[test]
    fn update_of_missing_grant_is_not_found() {
        let store = store();
        seed(&store);
        let err = store.write_grant(&grant(), Some(3)).unwrap_err();
        assert!(matches!(err, AuthzError::NotFound(_)));
    }

    #[test]
    fn delete_object_removes_fields_and_grants() {
        let store = store();
        seed(&store);
        let now = now_rfc3339();
        store
            .insert_field(&AuthField {
                id: "f1".into(),
                object_id: "M_VIEW".into(),
                field_code: "ACTVT".into(),
                description: None,
                is_required: true,
                values: vec!["01".into(), "02".into(), "03".into()],
                default_values: None,
                position: 0,
                created_at: now.clone(),
                updated_at: now,
            })
            .unwrap();
        store.write_grant(&grant(), None).unwrap();

        let removal = store.delete_object("M_VIEW").unwrap();
        assert_eq!(removal, ObjectRemoval { fields_removed: 1, grants_removed: 1 });
        assert!(store.list_grants(&GrantQuery::role("PM1")).unwrap().is_empty());
        assert!(matches!(store.get_object("M_VIEW"), Err(AuthzError::NotFound(_))));
    }

    #[test]
    fn list_grants_filters_by_module() {
        let store = store();
        seed(&store);
        store.write_grant(&grant(), None).unwrap();

        assert_eq!(store.list_grants(&GrantQuery::role_module("PM1", "materials")).unwrap().len(), 1);
        assert!(store.list_grants(&GrantQuery::role_module("PM1", "finance")).unwrap().is_empty());
        assert_eq!(store.delete_grants_for_role_and_module("PM1", "materials").unwrap(), 1);
        assert_eq!(store.delete_grants_for_role_and_module("PM1", "materials").unwrap(), 0);
    }
}
