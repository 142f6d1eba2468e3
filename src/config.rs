//! Runtime configuration loaded from environment variables.
//!
//! - `DPCTL_DB` - Path to the SQLite database (default: platform data directory)
//! - `DPCTL_PORT` - Port for the HTTP API (default: `17020`)
//! - `DPCTL_API_KEY` - Bearer token required by the HTTP API (optional)
//! - `RUST_LOG` - Log filter (default: `dataplane_compute=info,tower_http=info`)

use std::path::PathBuf;

use anyhow::Result;

use crate::db::Database;

pub const DEFAULT_PORT: u16 = 17020;
pub const DEFAULT_LOG_FILTER: &str = "dataplane_compute=info,tower_http=info";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub db_path: Option<PathBuf>,
    pub port: u16,
    pub api_key: Option<String>,
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: None,
            port: DEFAULT_PORT,
            api_key: None,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source. Unparseable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            db_path: lookup("DPCTL_DB").map(PathBuf::from),
            port: lookup("DPCTL_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            api_key: lookup("DPCTL_API_KEY").filter(|k| !k.is_empty()),
            log_filter: lookup("RUST_LOG").unwrap_or(defaults.log_filter),
        }
    }

    /// Open and migrate the configured database.
    pub fn open_database(&self) -> Result<Database> {
        let db = match &self.db_path {
            Some(path) => Database::open(path.clone())?,
            None => Database::open_default()?,
        };
        db.migrate()?;
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        assert_eq!(Config::from_lookup(lookup(&[])), Config::default());
    }

    #[test]
    fn reads_all_variables() {
        let config = Config::from_lookup(lookup(&[
            ("DPCTL_DB", "/tmp/dp.db"),
            ("DPCTL_PORT", "8080"),
            ("DPCTL_API_KEY", "secret"),
            ("RUST_LOG", "debug"),
        ]));

        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/dp.db")));
        assert_eq!(config.port, 8080);
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.log_filter, "debug");
    }

    #[test]
    fn ignores_bad_port_and_empty_key() {
        let config = Config::from_lookup(lookup(&[("DPCTL_PORT", "http"), ("DPCTL_API_KEY", "")]));

        assert_eq!(config.port, DEFAULT_PORT);
        assert!(config.api_key.is_none());
    }
}
