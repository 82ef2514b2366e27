//! `authzctl`: operator CLI for the authorization cascade engine.
//!
//! Usage:
//!   authzctl -c authzctl.toml seed
//!   authzctl cascade --role PM1 --module materials select_all
//!   authzctl check --role PM1 --object M_VIEW --value ACTVT=03
//!
//! Every command prints JSON on stdout. Failures print
//! `{"code": ..., "message": ...}` on stderr and exit non-zero.

mod config;
mod seed;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use openerp_authz::{
    AccessTemplate, AuthzError, AuthzService, BulkAssign, CascadeLevel, CheckRequest, Confirmation,
    ModuleAction,
};
use openerp_core::ServiceError;
use openerp_sql::{SQLStore, SqliteStore};

use config::CtlConfig;
use seed::CatalogSeed;

/// Authorization cascade administration.
#[derive(Parser, Debug)]
#[command(name = "authzctl", about = "Authorization cascade administration")]
struct Cli {
    /// Path to the config file.
    #[arg(short = 'c', long = "config", global = true, default_value = "authzctl.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load roles, objects and master data from a seed file.
    Seed {
        /// Seed file (default: storage.catalog_path).
        #[arg(short = 'f', long = "file")]
        file: Option<PathBuf>,
    },

    /// List authorization objects grouped by module, with their fields.
    Catalog {
        /// Restrict to one module.
        #[arg(long)]
        module: Option<String>,
    },

    /// Update an authorization object with a JSON merge-patch.
    PatchObject {
        id: String,
        #[arg(long = "json")]
        json_body: String,
    },

    /// Deactivate an authorization object.
    Deactivate { id: String },

    /// Delete an authorization object with its fields and grants.
    DeleteObject {
        id: String,
        /// Confirm removal of the object's grants.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Available and assigned modules for a role.
    Modules {
        #[arg(long)]
        role: String,
    },

    /// List a role's grants.
    Grants {
        #[arg(long)]
        role: String,
        #[arg(long)]
        module: Option<String>,
    },

    /// Apply a module cascade action: select_all, reset_default, clear_cascade, remove_all.
    Cascade {
        #[arg(long)]
        role: String,
        #[arg(long)]
        module: String,
        action: String,
        /// Confirm destructive actions.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Grant many objects from a template.
    Bulk {
        #[arg(long)]
        role: String,
        /// Object ids; omit to use every active object of --module.
        #[arg(long = "object")]
        objects: Vec<String>,
        #[arg(long)]
        module: Option<String>,
        /// full_access or default_access.
        #[arg(long, default_value = "full_access")]
        template: String,
        /// module or object.
        #[arg(long, default_value = "object")]
        level: String,
    },

    /// Give a role the default grant on one object.
    Assign {
        #[arg(long)]
        role: String,
        #[arg(long)]
        object: String,
    },

    /// Remove a role's grant on one object.
    Unassign {
        #[arg(long)]
        role: String,
        #[arg(long)]
        object: String,
    },

    /// Remove one grant by id.
    Remove { grant: String },

    /// Set object full access on a grant.
    FullAccess { grant: String },

    /// Convert an inherited grant to custom values.
    Convert {
        grant: String,
        /// Confirm when conversion ends module coverage.
        #[arg(long = "yes", short = 'y')]
        yes: bool,
    },

    /// Replace a custom grant's values for one field.
    Edit {
        grant: String,
        #[arg(long)]
        field: String,
        /// Comma-separated values; empty clears the field.
        #[arg(long, default_value = "")]
        values: String,
    },

    /// Effective values of a role on an object's field.
    Effective {
        #[arg(long)]
        role: String,
        #[arg(long)]
        object: String,
        #[arg(long)]
        field: String,
    },

    /// Check access for FIELD=VALUE pairs.
    Check {
        #[arg(long)]
        role: String,
        #[arg(long)]
        object: String,
        #[arg(long = "value")]
        values: Vec<String>,
    },

    /// Value domain of an object's field.
    Domain {
        #[arg(long)]
        object: String,
        #[arg(long)]
        field: String,
        /// Narrow to children of this organizational unit.
        #[arg(long)]
        parent: Option<String>,
    },

    /// Print the organizational hierarchy.
    OrgTree,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match CtlConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load {}: {e}", cli.config.display());
            return ExitCode::FAILURE;
        }
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log.filter.clone().into()),
        )
        .init();

    match run(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast::<AuthzError>() {
                Ok(authz) => eprintln!("{}", error_json(authz)),
                Err(other) => eprintln!("error: {other:#}"),
            }
            ExitCode::FAILURE
        }
    }
}

/// Stable error JSON. A partial batch also carries its per-object report.
fn error_json(err: AuthzError) -> serde_json::Value {
    let report = match &err {
        AuthzError::PartialBatch(report) => serde_json::to_value(report.as_ref()).ok(),
        _ => None,
    };
    let mut json = ServiceError::from(err).to_json();
    if let (Some(report), Some(obj)) = (report, json.as_object_mut()) {
        obj.insert("report".to_string(), report);
    }
    json
}

fn run(command: Commands, config: CtlConfig) -> anyhow::Result<()> {
    let sqlite_path = config.storage.resolve_sqlite_path();
    if let Some(parent) = sqlite_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let sql: Arc<dyn SQLStore> = Arc::new(
        SqliteStore::open(&sqlite_path)
            .map_err(|e| anyhow::anyhow!("failed to open SQL store: {}", e))?,
    );
    let svc = AuthzService::new(Arc::clone(&sql), config.defaults.clone())?;
    info!("Opened {}", sqlite_path.display());

    match command {
        Commands::Seed { file } => {
            let path = file.unwrap_or_else(|| config.storage.resolve_catalog_path());
            let summary = CatalogSeed::load(&path)?.apply(&svc, sql.as_ref())?;
            print(&summary)
        }
        Commands::Catalog { module } => {
            let mut out = serde_json::Map::new();
            for (name, objects) in svc.list_objects_by_module()? {
                if module.as_ref().is_some_and(|m| m != &name) {
                    continue;
                }
                let mut entries = Vec::new();
                for object in objects {
                    let fields = svc.list_fields(&object.id)?;
                    entries.push(serde_json::json!({ "object": object, "fields": fields }));
                }
                out.insert(name, serde_json::Value::Array(entries));
            }
            print(&out)
        }
        Commands::PatchObject { id, json_body } => {
            let patch: serde_json::Value = serde_json::from_str(&json_body)?;
            print(&svc.update_object(&id, &patch)?)
        }
        Commands::Deactivate { id } => print(&svc.deactivate_object(&id)?),
        Commands::DeleteObject { id, yes } => {
            if !yes && !svc.list_grants(&object_query(&id))?.is_empty() {
                anyhow::bail!("object '{id}' has grants; pass --yes to delete them too");
            }
            print(&svc.delete_object(&id)?)
        }
        Commands::Modules { role } => print(&svc.available_modules(&role)?),
        Commands::Grants { role, module } => print(&svc.list_role_authorizations(&role, module.as_deref())?),
        Commands::Cascade { role, module, action, yes } => {
            let action = ModuleAction::from_str(&action)
                .ok_or_else(|| anyhow::anyhow!("unknown action '{action}'"))?;
            print(&svc.apply_module_action(&role, &module, action, confirmation(yes))?)
        }
        Commands::Bulk { role, objects, module, template, level } => {
            let input = BulkAssign {
                role_id: role,
                object_ids: objects,
                template: parse_template(&template)?,
                cascade_level: parse_level(&level)?,
                module,
            };
            print(&svc.bulk_assign(input)?)
        }
        Commands::Assign { role, object } => {
            print(&svc.assign_object(&role, &object)?)
        }
        Commands::Unassign { role, object } => {
            let removed = svc.unassign_object(&role, &object)?;
            print(&serde_json::json!({ "removed": removed }))
        }
        Commands::Remove { grant } => {
            svc.remove_grant(&grant)?;
            print(&serde_json::json!({ "removed": grant }))
        }
        Commands::FullAccess { grant } => {
            print(&svc.grant_object_full_access(&grant)?)
        }
        Commands::Convert { grant, yes } => print(&svc.convert_to_custom(&grant, confirmation(yes))?),
        Commands::Edit { grant, field, values } => {
            let mut session = svc.open_field_editor(&grant)?;
            session.clear(&field)?;
            for value in values.split(',').map(str::trim).filter(|v| !v.is_empty()) {
                session.toggle(&field, value)?;
            }
            print(&svc.save_field_edits(&mut session)?)
        }
        Commands::Effective { role, object, field } => print(&svc.effective_values(&role, &object, &field)?),
        Commands::Check { role, object, values } => {
            let mut req = CheckRequest {
                role_id: role,
                object_id: object,
                values: Default::default(),
            };
            for pair in values {
                let (field, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow::anyhow!("expected FIELD=VALUE, got '{pair}'"))?;
                req.values.insert(field.to_string(), value.to_string());
            }
            print(&svc.check_access(&req)?)
        }
        Commands::Domain { object, field, parent } => match parent {
            Some(parent) => {
                let tree = svc.org_tree()?;
                print(&tree.scoped_domain(&field, &parent)?)
            }
            None => print(&svc.field_domain(&object, &field)?),
        },
        Commands::OrgTree => {
            let tree = svc.org_tree()?;
            let roots: Vec<_> = tree.roots().iter().map(|&id| org_json(&tree, id)).collect();
            let orphans: Vec<_> = tree
                .orphans()
                .iter()
                .filter_map(|&id| tree.node(id))
                .collect();
            print(&serde_json::json!({ "roots": roots, "orphans": orphans }))
        }
    }
}

fn print<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn confirmation(yes: bool) -> Confirmation {
    if yes {
        Confirmation::Confirmed
    } else {
        Confirmation::Unconfirmed
    }
}

fn object_query(object_id: &str) -> openerp_authz::GrantQuery {
    openerp_authz::GrantQuery {
        object_id: Some(object_id.to_string()),
        ..Default::default()
    }
}

fn parse_template(s: &str) -> anyhow::Result<AccessTemplate> {
    match s {
        "full_access" => Ok(AccessTemplate::FullAccess),
        "default_access" => Ok(AccessTemplate::DefaultAccess),
        other => anyhow::bail!("unknown template '{other}'"),
    }
}

fn parse_level(s: &str) -> anyhow::Result<CascadeLevel> {
    match s {
        "module" => Ok(CascadeLevel::Module),
        "object" => Ok(CascadeLevel::Object),
        other => anyhow::bail!("unknown cascade level '{other}'"),
    }
}

/// Nested `{code, name, kind, children}` view of one subtree.
fn org_json(tree: &openerp_authz::OrgTree, root: openerp_authz::NodeId) -> serde_json::Value {
    // Build bottom-up over the depth-first order so no recursion is needed.
    let mut order = vec![root];
    order.extend(tree.descendants(root));
    let mut built: std::collections::HashMap<openerp_authz::NodeId, serde_json::Value> =
        std::collections::HashMap::new();
    for &id in order.iter().rev() {
        let Some(node) = tree.node(id) else { continue };
        let children: Vec<serde_json::Value> = tree
            .children(id)
            .iter()
            .filter_map(|c| built.remove(c))
            .collect();
        built.insert(
            id,
            serde_json::json!({
                "kind": node.kind,
                "code": node.code,
                "name": node.name,
                "children": children,
            }),
        );
    }
    built.remove(&root).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use openerp_authz::BatchReport;

    use super::*;

    #[test]
    fn cli_parses_cascade() {
        let cli = Cli::parse_from([
            "authzctl", "cascade", "--role", "PM1", "--module", "materials", "remove_all", "--yes",
        ]);
        match cli.command {
            Commands::Cascade { role, action, yes, .. } => {
                assert_eq!(role, "PM1");
                assert_eq!(action, "remove_all");
                assert!(yes);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn partial_batch_error_lists_failed_objects() {
        let mut report = BatchReport::new("PM1", Some("materials"));
        report.record_success("M_VIEW");
        report.record_failure("M_EDIT", "conflict: changed concurrently");

        let json = error_json(AuthzError::PartialBatch(Box::new(report)));
        assert_eq!(json["code"], "PARTIAL_FAILURE");
        assert_eq!(json["report"]["succeeded"], serde_json::json!(["M_VIEW"]));
        assert_eq!(json["report"]["failures"][0]["object_id"], "M_EDIT");
        assert_eq!(json["report"]["failures"][0]["cause"], "conflict: changed concurrently");
    }

    #[test]
    fn plain_error_has_no_report() {
        let json = error_json(AuthzError::NotFound("role 'PM9'".into()));
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json.get("report").is_none());
    }

    #[test]
    fn template_and_level_names() {
        assert_eq!(parse_template("default_access").unwrap(), AccessTemplate::DefaultAccess);
        assert_eq!(parse_level("module").unwrap(), CascadeLevel::Module);
        assert!(parse_level("field").is_err());
    }
}
