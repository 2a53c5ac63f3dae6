//! Gateway settings file
//!
//! ```toml
//! [runtime]
//! blocking_threads = 10
//!
//! [logging]
//! profile = "production"
//!
//! [pools.dia]
//! max_connections = 3
//! params = { server_code = "acme", username = "ws", password = "...", api_key = "..." }
//!
//! [pools.warehouse]
//! kind = "sqlserver"
//! params = { host = "db01", database = "WMS", username = "svc", password = "..." }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use erpgate_connectors::DEFAULT_BLOCKING_THREADS;
use erpgate_core::{ConnectorKind, Params};
use erpgate_pool::DEFAULT_MAX_CONNECTIONS;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Prefix of per-pool environment overrides, `ERPGATE_<POOL>_<KEY>`
pub const ENV_PREFIX: &str = "ERPGATE_";
const SETTINGS_FILE: &str = "gateway.toml";

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .context("Could not determine config directory")
        .map(|p| p.join("erpgate"))
}

pub fn default_settings_path() -> Result<PathBuf> {
    config_dir().map(|p| p.join(SETTINGS_FILE))
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub runtime: RuntimeSettings,
    pub logging: LoggingSettings,
    pub pools: BTreeMap<String, PoolSettings>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// Concurrent blocking driver calls across all pools
    pub blocking_threads: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            blocking_threads: DEFAULT_BLOCKING_THREADS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogProfile {
    Development,
    Production,
    Testing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Preset; development in debug builds, production otherwise
    pub profile: Option<LogProfile>,
    /// Filter used when `RUST_LOG` is unset
    pub filter: Option<String>,
    pub log_dir: Option<PathBuf>,
    /// Write JSON logs to a daily rotated file
    pub json: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    pub enabled: bool,
    /// Resolved from the pool name when absent
    pub kind: Option<ConnectorKind>,
    pub max_connections: usize,
    /// Untyped connection parameters, normalized by `ConnectionConfig`
    pub params: Params,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            kind: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            params: Params::new(),
        }
    }
}

impl GatewaySettings {
    /// Parse a settings file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path))
    }

    /// The settings file to use: the explicit path, which must exist, or the
    /// default location when a file is present there
    pub fn resolve_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        match explicit {
            Some(path) => {
                anyhow::ensure!(path.exists(), "settings file {:?} does not exist", path);
                Ok(Some(path.to_path_buf()))
            }
            None => Ok(default_settings_path().ok().filter(|p| p.exists())),
        }
    }

    /// Load from `path` when given, else start from defaults, then apply
    /// environment overrides
    pub fn load_with_env(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        settings.apply_env_overrides(std::env::vars());
        Ok(settings)
    }

    /// Apply `ERPGATE_<POOL>_<KEY>=value` overrides.
    ///
    /// `<POOL>` is the pool name upper-cased with `-` as `_`. `ENABLED` and
    /// `MAX_CONNECTIONS` set the pool settings; any other key sets the
    /// lower-cased param. Variables for unknown pools are ignored.
    pub fn apply_env_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let prefixes: Vec<(String, String)> = self
            .pools
            .keys()
            .map(|name| {
                let prefix = format!("{}{}_", ENV_PREFIX, name.to_uppercase().replace('-', "_"));
                (prefix, name.clone())
            })
            .collect();

        for (var, value) in vars {
            let Some((key, name)) = prefixes
                .iter()
                .filter_map(|(prefix, name)| var.strip_prefix(prefix.as_str()).map(|key| (key, name)))
                .max_by_key(|(key, _)| std::cmp::Reverse(key.len()))
            else {
                continue;
            };
            let Some(pool) = self.pools.get_mut(name) else {
                continue;
            };

            match key {
                "ENABLED" => match value.trim().to_ascii_lowercase().as_str() {
                    "1" | "true" | "yes" | "on" => pool.enabled = true,
                    "0" | "false" | "no" | "off" => pool.enabled = false,
                    _ => tracing::warn!(var = %var, "ignoring non-boolean override"),
                },
                "MAX_CONNECTIONS" => match value.trim().parse() {
                    Ok(max) => pool.max_connections = max,
                    Err(_) => tracing::warn!(var = %var, "ignoring non-numeric override"),
                },
                "" => {}
                param => {
                    pool.params
                        .insert(param.to_ascii_lowercase(), Value::String(value));
                }
            }
        }
    }

    /// Keep only the named pool, for commands that need one
    pub fn only_pool(mut self, name: &str) -> Self {
        self.pools.retain(|pool, _| pool == name);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const SAMPLE: &str = r#"
        [runtime]
        blocking_threads = 4

        [logging]
        profile = "production"
        filter = "info,erpgate_pool=debug"

        [pools.dia]
        max_connections = 3
        params = { server_code = "acme", username = "ws", password = "pw", api_key = "k" }

        [pools.warehouse]
        kind = "mssql"
        enabled = false

        [pools.warehouse.params]
        host = "db01"
        port = 1433
        database = "WMS"
    "#;

    #[test]
    fn test_parse_settings() {
        let settings: GatewaySettings = toml::from_str(SAMPLE).expect("parse");

        assert_eq!(settings.runtime.blocking_threads, 4);
        assert_eq!(settings.logging.profile, Some(LogProfile::Production));

        let dia = &settings.pools["dia"];
        assert!(dia.enabled);
        assert_eq!(dia.kind, None);
        assert_eq!(dia.max_connections, 3);
        assert_eq!(dia.params["server_code"], json!("acme"));

        let warehouse = &settings.pools["warehouse"];
        assert!(!warehouse.enabled);
        assert_eq!(warehouse.kind, Some(ConnectorKind::SqlServer));
        assert_eq!(warehouse.max_connections, DEFAULT_MAX_CONNECTIONS);
        assert_eq!(warehouse.params["port"], json!(1433));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings: GatewaySettings = toml::from_str("").expect("parse");
        assert_eq!(settings, GatewaySettings::default());
        assert_eq!(settings.runtime.blocking_threads, DEFAULT_BLOCKING_THREADS);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, SAMPLE).expect("write");

        let settings = GatewaySettings::load(&path).expect("load");
        assert_eq!(settings.pools.len(), 2);

        assert_eq!(
            GatewaySettings::resolve_path(Some(&path)).expect("resolve"),
            Some(path.clone())
        );
        assert!(GatewaySettings::resolve_path(Some(&dir.path().join("missing.toml"))).is_err());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[pools.dia]\nmax_connections = \"many\"").expect("write");

        let err = GatewaySettings::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("gateway.toml"));
    }

    #[test]
    fn test_env_overrides() {
        let mut settings: GatewaySettings = toml::from_str(SAMPLE).expect("parse");
        settings.pools.insert("sap-rest".to_string(), PoolSettings::default());

        settings.apply_env_overrides(vec![
            ("ERPGATE_DIA_PASSWORD".to_string(), "from-env".to_string()),
            ("ERPGATE_DIA_MAX_CONNECTIONS".to_string(), "8".to_string()),
            ("ERPGATE_WAREHOUSE_ENABLED".to_string(), "true".to_string()),
            ("ERPGATE_SAP_REST_BASE_URL".to_string(), "https://sap".to_string()),
            ("ERPGATE_OTHER_HOST".to_string(), "ignored".to_string()),
            ("PATH".to_string(), "/usr/bin".to_string()),
        ]);

        let dia = &settings.pools["dia"];
        assert_eq!(dia.params["password"], json!("from-env"));
        assert_eq!(dia.max_connections, 8);
        assert!(settings.pools["warehouse"].enabled);
        assert_eq!(settings.pools["sap-rest"].params["base_url"], json!("https://sap"));
        assert_eq!(settings.pools.len(), 3);
    }

    #[test]
    fn test_only_pool() {
        let settings: GatewaySettings = toml::from_str(SAMPLE).expect("parse");
        let only = settings.only_pool("dia");
        assert_eq!(only.pools.keys().collect::<Vec<_>>(), vec!["dia"]);
    }
}
