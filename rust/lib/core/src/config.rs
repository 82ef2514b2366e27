use std::path::PathBuf;

use serde::Deserialize;

/// Storage configuration shared by every binary in the workspace.
///
/// Deserialized from the `[storage]` table of a binary's TOML config;
/// explicit paths win over the ones derived from `data_dir`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfig {
    /// Directory holding the database and seed files.
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// Path to the SQLite database file.
    /// Defaults to `{data_dir}/data.sqlite` if not specified.
    #[serde(default)]
    pub sqlite_path: Option<PathBuf>,

    /// Catalog seed file (TOML).
    /// Defaults to `{data_dir}/catalog.toml` if not specified.
    #[serde(default)]
    pub catalog_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Resolve the SQLite database path, falling back to `{data_dir}/data.sqlite`.
    pub fn resolve_sqlite_path(&self) -> PathBuf {
        self.sqlite_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("data.sqlite"))
    }

    /// Resolve the catalog seed path, falling back to `{data_dir}/catalog.toml`.
    pub fn resolve_catalog_path(&self) -> PathBuf {
        self.catalog_path
            .clone()
            .unwrap_or_else(|| self.resolve_data_subpath("catalog.toml"))
    }

    fn resolve_data_subpath(&self, name: &str) -> PathBuf {
        self.data_dir
            .as_ref()
            .map(|d| d.join(name))
            .unwrap_or_else(|| PathBuf::from(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/data")),
            ..Default::default()
        };
        assert_eq!(config.resolve_sqlite_path(), PathBuf::from("/data/data.sqlite"));
        assert_eq!(config.resolve_catalog_path(), PathBuf::from("/data/catalog.toml"));
    }

    #[test]
    fn test_explicit_paths_win() {
        let config = ServiceConfig {
            data_dir: Some(PathBuf::from("/data")),
            sqlite_path: Some(PathBuf::from("/var/lib/authz.sqlite")),
            catalog_path: None,
        };
        assert_eq!(config.resolve_sqlite_path(), PathBuf::from("/var/lib/authz.sqlite"));
    }

    #[test]
    fn test_no_data_dir() {
        let config = ServiceConfig::default();
        assert_eq!(config.resolve_sqlite_path(), PathBuf::from("data.sqlite"));
    }
}
