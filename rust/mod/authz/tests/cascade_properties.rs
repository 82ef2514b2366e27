//! End-to-end cascade behaviour against an in-memory SQLite store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use openerp_authz::{
    AuthField, AuthObject, AuthzConfig, AuthzError, AuthzService, AuthzStore, CommitOptions,
    Confirmation, CreateAuthField, CreateAuthObject, CreateRole, GrantQuery, ModuleAction,
    ObjectRemoval, Role, RoleAuthorization, SqlAuthzStore, SqlDomainResolver, ValueSet,
    WizardStep, grant_id,
};
use openerp_sql::{SQLStore, SqliteStore};

fn set(values: &[&str]) -> ValueSet {
    values.iter().copied().collect()
}

/// materials: M_VIEW (ACTVT {01,02,03}), M_EDIT (ACTVT {01,02,03}, PLANT {*})
fn seed(svc: &AuthzService) {
    for role in ["PM1", "PM2"] {
        svc.create_role(CreateRole {
            id: role.into(),
            name: None,
            description: None,
        })
        .unwrap();
    }
    for (object, fields) in [
        ("M_VIEW", vec![("ACTVT", vec!["01", "02", "03"])]),
        ("M_EDIT", vec![("ACTVT", vec!["01", "02", "03"]), ("PLANT", vec!["*"])]),
    ] {
        svc.create_object(CreateAuthObject {
            id: object.into(),
            name: None,
            description: None,
            module: "materials".into(),
        })
        .unwrap();
        for (code, values) in fields {
            svc.create_field(CreateAuthField {
                object_id: object.into(),
                field_code: code.into(),
                description: None,
                is_required: true,
                values: values.into_iter().map(String::from).collect(),
                default_values: None,
            })
            .unwrap();
        }
    }
}

fn service() -> Arc<AuthzService> {
    let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
    let svc = AuthzService::new(sql, AuthzConfig::default()).unwrap();
    seed(&svc);
    svc
}

fn materials(svc: &AuthzService, role: &str) -> Vec<RoleAuthorization> {
    svc.list_grants(&GrantQuery::role_module(role, "materials")).unwrap()
}

fn select_all(svc: &AuthzService, role: &str) {
    svc.apply_module_action(role, "materials", ModuleAction::SelectAll, Confirmation::Unconfirmed)
        .unwrap();
}

// ── Properties ──

#[test]
fn wildcard_injected_for_every_inherited_grant() {
    let svc = service();
    select_all(&svc, "PM1");
    let object_grant = svc.assign_object("PM2", "M_EDIT").unwrap();
    svc.grant_object_full_access(&object_grant.id).unwrap();

    let mut inherited = materials(&svc, "PM1");
    inherited.extend(materials(&svc, "PM2"));
    assert_eq!(inherited.len(), 3);
    for grant in inherited {
        assert!(!grant.is_custom());
        for field in svc.list_fields(&grant.object_id).unwrap() {
            let effective = svc.compute_effective(&grant.id, &field.field_code).unwrap();
            assert!(effective.has_wildcard(), "{} {}", grant.object_id, field.field_code);
        }
    }
}

#[test]
fn select_all_is_idempotent() {
    let svc = service();
    select_all(&svc, "PM1");
    let once: Vec<_> = materials(&svc, "PM1")
        .into_iter()
        .map(|g| (g.id, g.module_full_access, g.object_full_access))
        .collect();

    select_all(&svc, "PM1");
    let twice: Vec<_> = materials(&svc, "PM1")
        .into_iter()
        .map(|g| (g.id, g.module_full_access, g.object_full_access))
        .collect();

    assert_eq!(once, twice);
    assert_eq!(once.len(), 2);
}

#[test]
fn conversion_preserves_effective_values() {
    let svc = service();
    select_all(&svc, "PM1");
    let object_grant = svc.assign_object("PM2", "M_EDIT").unwrap();
    svc.grant_object_full_access(&object_grant.id).unwrap();

    for grant in materials(&svc, "PM1").into_iter().chain(materials(&svc, "PM2")) {
        let fields = svc.list_fields(&grant.object_id).unwrap();
        let before: Vec<ValueSet> = fields
            .iter()
            .map(|f| svc.compute_effective(&grant.id, &f.field_code).unwrap())
            .collect();

        let converted = svc.convert_to_custom(&grant.id, Confirmation::Confirmed).unwrap();
        assert!(!converted.module_full_access && !converted.object_full_access);

        let after: Vec<ValueSet> = fields
            .iter()
            .map(|f| svc.compute_effective(&grant.id, &f.field_code).unwrap())
            .collect();
        assert_eq!(before, after, "{}", grant.object_id);
    }
}

#[test]
fn clear_cascade_removes_only_inherited_grants() {
    let svc = service();
    let custom = svc.assign_object("PM1", "M_VIEW").unwrap();
    let mut session = svc.open_field_editor(&custom.id).unwrap();
    session.clear("ACTVT").unwrap();
    session.toggle("ACTVT", "03").unwrap();
    svc.save_field_edits(&mut session).unwrap();

    let inherited = svc.assign_object("PM1", "M_EDIT").unwrap();
    svc.grant_object_full_access(&inherited.id).unwrap();

    let report = svc
        .apply_module_action("PM1", "materials", ModuleAction::ClearCascade, Confirmation::Unconfirmed)
        .unwrap();
    assert_eq!(report.succeeded, vec!["M_EDIT"]);

    let left = materials(&svc, "PM1");
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, custom.id);
    assert_eq!(left[0].stored_values("ACTVT"), set(&["03"]));
}

#[test]
fn remove_all_empties_the_module() {
    let svc = service();
    select_all(&svc, "PM1");
    svc.convert_to_custom(&grant_id("PM1", "M_VIEW"), Confirmation::Unconfirmed)
        .unwrap();

    svc.apply_module_action("PM1", "materials", ModuleAction::RemoveAll, Confirmation::Confirmed)
        .unwrap();
    assert!(materials(&svc, "PM1").is_empty());
}

// ── Module workflows ──

#[test]
fn select_all_covers_every_module_object() {
    let svc = service();
    select_all(&svc, "PM1");

    let grants = materials(&svc, "PM1");
    assert_eq!(grants.len(), 2);
    assert!(grants.iter().all(|g| g.module_full_access));
    assert_eq!(
        svc.compute_effective(&grant_id("PM1", "M_VIEW"), "ACTVT").unwrap(),
        set(&["*"])
    );
}

#[test]
fn converted_grant_narrows_after_edit() {
    let svc = service();
    select_all(&svc, "PM1");
    let id = grant_id("PM1", "M_VIEW");

    let converted = svc.convert_to_custom(&id, Confirmation::Unconfirmed).unwrap();
    assert_eq!(converted.stored_values("ACTVT"), set(&["*"]));
    assert!(converted.is_custom());

    let mut session = svc.open_field_editor(&id).unwrap();
    session.clear("ACTVT").unwrap();
    session.toggle("ACTVT", "01").unwrap();
    session.toggle("ACTVT", "02").unwrap();
    svc.save_field_edits(&mut session).unwrap();

    let effective = svc.compute_effective(&id, "ACTVT").unwrap();
    assert_eq!(effective, set(&["01", "02"]));
    assert!(!effective.has_wildcard());
}

#[test]
fn reset_default_writes_custom_default_sets() {
    let svc = service();
    svc.apply_module_action("PM2", "materials", ModuleAction::ResetDefault, Confirmation::Unconfirmed)
        .unwrap();

    let grants = materials(&svc, "PM2");
    assert_eq!(grants.len(), 2);
    for grant in grants {
        assert!(grant.is_custom());
        let actvt = grant.stored_values("ACTVT");
        assert_eq!(actvt, set(&["01", "02", "03"]), "{}", grant.object_id);
        assert!(!actvt.has_wildcard());
    }
}

#[test]
fn remove_all_drops_edited_and_inherited_grants() {
    let svc = service();
    select_all(&svc, "PM1");
    let id = grant_id("PM1", "M_VIEW");
    svc.convert_to_custom(&id, Confirmation::Unconfirmed).unwrap();
    let mut session = svc.open_field_editor(&id).unwrap();
    session.toggle("ACTVT", "*").unwrap();
    session.toggle("ACTVT", "03").unwrap();
    svc.save_field_edits(&mut session).unwrap();

    let report = svc
        .apply_module_action("PM1", "materials", ModuleAction::RemoveAll, Confirmation::Confirmed)
        .unwrap();
    assert_eq!(report.succeeded.len(), 2);
    assert!(svc.find_grant("PM1", "M_VIEW").unwrap().is_none());
    assert!(svc.find_grant("PM1", "M_EDIT").unwrap().is_none());

    let again = svc
        .apply_module_action("PM1", "materials", ModuleAction::RemoveAll, Confirmation::Confirmed)
        .unwrap();
    assert!(again.succeeded.is_empty());
}

// ── Partial failure ──

/// Store whose grant writes fail for one object, and whose role reads fail
/// while `roles_down` is set.
struct FailingStore {
    inner: SqlAuthzStore,
    fail_object: String,
    roles_down: AtomicBool,
}

impl AuthzStore for FailingStore {
    fn list_objects(&self) -> Result<Vec<AuthObject>, AuthzError> {
        self.inner.list_objects()
    }
    fn get_object(&self, id: &str) -> Result<AuthObject, AuthzError> {
        self.inner.get_object(id)
    }
    fn insert_object(&self, object: &AuthObject) -> Result<(), AuthzError> {
        self.inner.insert_object(object)
    }
    fn update_object(&self, object: &AuthObject) -> Result<(), AuthzError> {
        self.inner.update_object(object)
    }
    fn delete_object(&self, id: &str) -> Result<ObjectRemoval, AuthzError> {
        self.inner.delete_object(id)
    }
    fn list_fields(&self, object_id: &str) -> Result<Vec<AuthField>, AuthzError> {
        self.inner.list_fields(object_id)
    }
    fn get_field(&self, id: &str) -> Result<AuthField, AuthzError> {
        self.inner.get_field(id)
    }
    fn insert_field(&self, field: &AuthField) -> Result<(), AuthzError> {
        self.inner.insert_field(field)
    }
    fn update_field(&self, field: &AuthField) -> Result<(), AuthzError> {
        self.inner.update_field(field)
    }
    fn delete_field(&self, id: &str) -> Result<(), AuthzError> {
        self.inner.delete_field(id)
    }
    fn list_roles(&self) -> Result<Vec<Role>, AuthzError> {
        self.inner.list_roles()
    }
    fn get_role(&self, id: &str) -> Result<Role, AuthzError> {
        if self.roles_down.load(Ordering::SeqCst) {
            return Err(AuthzError::Storage("database is locked".into()));
        }
        self.inner.get_role(id)
    }
    fn insert_role(&self, role: &Role) -> Result<(), AuthzError> {
        self.inner.insert_role(role)
    }
    fn delete_role(&self, id: &str) -> Result<usize, AuthzError> {
        self.inner.delete_role(id)
    }
    fn list_grants(&self, query: &GrantQuery) -> Result<Vec<RoleAuthorization>, AuthzError> {
        self.inner.list_grants(query)
    }
    fn get_grant(&self, id: &str) -> Result<RoleAuthorization, AuthzError> {
        self.inner.get_grant(id)
    }
    fn write_grant(
        &self,
        grant: &RoleAuthorization,
        expected_version: Option<i64>,
    ) -> Result<RoleAuthorization, AuthzError> {
        if grant.object_id == self.fail_object {
            return Err(AuthzError::Storage("disk full".into()));
        }
        self.inner.write_grant(grant, expected_version)
    }
    fn delete_grant(&self, id: &str) -> Result<bool, AuthzError> {
        self.inner.delete_grant(id)
    }
    fn delete_grants_for_role_and_module(&self, role_id: &str, module: &str) -> Result<usize, AuthzError> {
        self.inner.delete_grants_for_role_and_module(role_id, module)
    }
}

#[test]
fn failed_object_is_reported_and_others_stay_committed() {
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let store = FailingStore {
        inner: SqlAuthzStore::new(sql.clone()).unwrap(),
        fail_object: "M_EDIT".into(),
        roles_down: AtomicBool::new(false),
    };
    let svc = AuthzService::with_store(
        Arc::new(store),
        Arc::new(SqlDomainResolver::new(sql)),
        AuthzConfig::default(),
    );
    seed(&svc);

    let err = svc
        .apply_module_action("PM1", "materials", ModuleAction::SelectAll, Confirmation::Unconfirmed)
        .unwrap_err();
    let AuthzError::PartialBatch(report) = err else {
        panic!("expected partial batch, got {err}");
    };
    assert_eq!(report.succeeded, vec!["M_VIEW"]);
    assert_eq!(report.failed_ids(), vec!["M_EDIT"]);
    assert!(report.failures[0].cause.contains("disk full"));

    // M_VIEW stays committed; M_EDIT is still covered virtually.
    assert!(svc.find_grant("PM1", "M_VIEW").unwrap().unwrap().module_full_access);
    assert!(svc.find_grant("PM1", "M_EDIT").unwrap().is_none());
    assert_eq!(svc.effective_values("PM1", "M_EDIT", "PLANT").unwrap(), set(&["*"]));
}

#[test]
fn storage_error_before_write_keeps_wizard_open() {
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let store = Arc::new(FailingStore {
        inner: SqlAuthzStore::new(sql.clone()).unwrap(),
        fail_object: String::new(),
        roles_down: AtomicBool::new(false),
    });
    let svc = AuthzService::with_store(
        store.clone(),
        Arc::new(SqlDomainResolver::new(sql)),
        AuthzConfig::default(),
    );
    seed(&svc);

    let mut wizard = svc.begin_bulk_assignment("PM1").unwrap();
    wizard.toggle_module("materials").unwrap();
    wizard.proceed().unwrap();

    store.roles_down.store(true, Ordering::SeqCst);
    let err = wizard.commit(&svc, CommitOptions::default()).unwrap_err();
    assert!(matches!(err, AuthzError::Storage(_)));
    assert_eq!(wizard.step(), WizardStep::SelectObjects);
    assert!(materials(&svc, "PM1").is_empty());

    store.roles_down.store(false, Ordering::SeqCst);
    let report = wizard.commit(&svc, CommitOptions::default()).unwrap();
    assert_eq!(report.succeeded, vec!["M_EDIT", "M_VIEW"]);
    assert_eq!(wizard.step(), WizardStep::Committed);
}

#[test]
fn stale_writer_loses_compare_and_set() {
    let sql: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
    let svc = AuthzService::new(sql.clone(), AuthzConfig::default()).unwrap();
    let other_writer = SqlAuthzStore::new(sql).unwrap();
    seed(&svc);
    select_all(&svc, "PM1");

    let id = grant_id("PM1", "M_EDIT");
    let mut stale = other_writer.get_grant(&id).unwrap();
    svc.convert_to_custom(&id, Confirmation::Confirmed).unwrap();

    // A writer still holding the pre-conversion version must not re-flag the row.
    stale.object_full_access = true;
    let err = other_writer.write_grant(&stale, Some(stale.version)).unwrap_err();
    assert!(matches!(err, AuthzError::Conflict(_)));
    assert!(svc.get_grant(&id).unwrap().is_custom());
}
