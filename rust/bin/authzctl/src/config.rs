//! `authzctl` configuration file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/authz"
//!
//! [log]
//! filter = "info,openerp_authz=debug"
//!
//! [defaults]
//! fallback_default = ["*"]
//! validate_field_values = true
//!
//! [defaults.default_values]
//! ACTVT = ["01", "02", "03", "05", "06"]
//! ```

use std::path::Path;

use serde::Deserialize;

use openerp_authz::AuthzConfig;
use openerp_core::ServiceConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_filter")]
    pub filter: String,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CtlConfig {
    #[serde(default)]
    pub storage: ServiceConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub defaults: AuthzConfig,
}

impl CtlConfig {
    /// Load from disk. A missing file yields the defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: CtlConfig = toml::from_str(&content)?;
        Ok(config)
    }
}
