//! Shared catalog for unit tests.
//!
//! materials: M_VIEW (ACTVT {01,02,03}), M_EDIT (ACTVT {01,02,03}, PLANT {*}),
//!            M_ARCHIVE (inactive)
//! finance:   F_POST (ACTVT {01,02,03,06}, COMP_CODE from master data)
//! roles:     PM1, PM2

use std::sync::Arc;

use openerp_sql::SqliteStore;

use crate::model::{CreateAuthField, CreateAuthObject, CreateRole};
use crate::service::domain::{EntityKind, ReferenceRow};
use crate::service::{AuthzConfig, AuthzService};
use crate::store::schema;

pub(crate) fn test_service() -> Arc<AuthzService> {
    let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
    seed_reference(sql.as_ref());
    let svc = AuthzService::new(sql, AuthzConfig::default()).unwrap();
    seed_catalog(&svc);
    svc
}

fn row(code: &str, name: &str, parent: Option<&str>) -> ReferenceRow {
    ReferenceRow {
        code: code.into(),
        name: name.into(),
        parent: parent.map(str::to_string),
    }
}

fn seed_reference(sql: &SqliteStore) {
    schema::init_reference_schema(sql).unwrap();
    let rows = [
        (EntityKind::CompanyCode, row("C100", "Acme DE", None), true),
        (EntityKind::CompanyCode, row("C200", "Acme US", None), true),
        (EntityKind::Plant, row("P100", "Berlin", Some("C100")), true),
        (EntityKind::Plant, row("P200", "Hamburg", Some("C100")), true),
        (EntityKind::Plant, row("P300", "Austin", Some("C200")), true),
        (EntityKind::Plant, row("P900", "Closed", Some("C100")), false),
        (EntityKind::StorageLocation, row("S110", "Berlin main", Some("P100")), true),
        (EntityKind::StorageLocation, row("S120", "Berlin yard", Some("P100")), true),
        (EntityKind::StorageLocation, row("S310", "Austin main", Some("P300")), true),
        (EntityKind::StorageLocation, row("S999", "Lost", Some("P404")), true),
    ];
    for (kind, r, active) in &rows {
        schema::upsert_reference_row(sql, *kind, r, *active).unwrap();
    }
}

pub(crate) fn object(id: &str, module: &str) -> CreateAuthObject {
    CreateAuthObject {
        id: id.into(),
        name: None,
        description: None,
        module: module.into(),
    }
}

pub(crate) fn field(object_id: &str, code: &str, values: &[&str]) -> CreateAuthField {
    CreateAuthField {
        object_id: object_id.into(),
        field_code: code.into(),
        description: None,
        is_required: true,
        values: values.iter().map(|v| v.to_string()).collect(),
        default_values: None,
    }
}

fn seed_catalog(svc: &AuthzService) {
    for id in ["PM1", "PM2"] {
        svc.create_role(CreateRole {
            id: id.into(),
            name: None,
            description: None,
        })
        .unwrap();
    }

    svc.create_object(object("M_VIEW", "materials")).unwrap();
    svc.create_field(field("M_VIEW", "ACTVT", &["01", "02", "03"])).unwrap();

    svc.create_object(object("M_EDIT", "materials")).unwrap();
    svc.create_field(field("M_EDIT", "ACTVT", &["01", "02", "03"])).unwrap();
    svc.create_field(field("M_EDIT", "PLANT", &["*"])).unwrap();

    svc.create_object(object("M_ARCHIVE", "materials")).unwrap();
    svc.create_field(field("M_ARCHIVE", "ACTVT", &["03"])).unwrap();
    svc.deactivate_object("M_ARCHIVE").unwrap();

    svc.create_object(object("F_POST", "finance")).unwrap();
    svc.create_field(field("F_POST", "ACTVT", &["01", "02", "03", "06"])).unwrap();
    svc.create_field(field("F_POST", "COMP_CODE", &[])).unwrap();
}
