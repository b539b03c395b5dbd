//! Gateway configuration
//!
//! Priority order (highest to lowest):
//! 1. Environment variables (`DATABASE_URL`, `DATA_API_*`, `NOTEBOARD_*`)
//! 2. ./noteboard.toml
//! 3. Built-in defaults
//!
//! Values are read once at startup and treated as fixed afterwards.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// File consulted by [`GatewayConfig::load`]
pub const CONFIG_FILE: &str = "noteboard.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Primary database URI; no URI means no database tier
    #[serde(default)]
    pub database_url: Option<String>,

    #[serde(default = "default_pool_size")]
    pub pool_size: u32,

    /// Upper bound on acquiring/establishing a database connection
    #[serde(default = "default_selection_timeout_ms")]
    pub selection_timeout_ms: u64,

    /// Upper bound on any single query or remote request
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,

    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_dedup_window_secs")]
    pub dedup_window_secs: u64,

    #[serde(default)]
    pub remote: RemoteConfig,
}

/// Remote document API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_data_source")]
    pub data_source: String,

    #[serde(default = "default_database")]
    pub database: String,

    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            data_source: default_data_source(),
            database: default_database(),
            collection: default_collection(),
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            pool_size: default_pool_size(),
            selection_timeout_ms: default_selection_timeout_ms(),
            socket_timeout_ms: default_socket_timeout_ms(),
            connect_attempts: default_connect_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            dedup_window_secs: default_dedup_window_secs(),
            remote: RemoteConfig::default(),
        }
    }
}

// Default value functions for serde
fn default_pool_size() -> u32 {
    10
}

fn default_selection_timeout_ms() -> u64 {
    10_000
}

fn default_socket_timeout_ms() -> u64 {
    45_000
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    250
}

fn default_dedup_window_secs() -> u64 {
    10
}

fn default_data_source() -> String {
    "Cluster0".to_string()
}

fn default_database() -> String {
    "noteboard".to_string()
}

fn default_collection() -> String {
    "notes".to_string()
}

impl GatewayConfig {
    /// Load defaults, then ./noteboard.toml, then environment overrides.
    ///
    /// A missing or unparsable file is not an error; the gateway must always
    /// come up, if only on the fallback store.
    pub fn load() -> Self {
        let mut config = Self::load_file(&PathBuf::from(CONFIG_FILE)).unwrap_or_default();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Parse a TOML config file, returning None if it is absent or invalid.
    pub fn load_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }
        match std::fs::read_to_string(path) {
            Ok(contents) => match Self::from_toml_str(&contents) {
                Ok(config) => {
                    debug!("Loaded config from {}", path.display());
                    Some(config)
                }
                Err(e) => {
                    warn!("Failed to parse {}: {}", path.display(), e);
                    None
                }
            },
            Err(e) => {
                debug!("Failed to read {}: {}", path.display(), e);
                None
            }
        }
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Overlay values from an environment lookup.
    ///
    /// Takes the lookup as a closure so tests don't have to touch the
    /// process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(url) = get("DATABASE_URL") {
            self.database_url = Some(url);
        }
        if let Some(url) = get("DATA_API_URL") {
            self.remote.base_url = Some(url);
        }
        if let Some(key) = get("DATA_API_KEY") {
            self.remote.api_key = Some(key);
        }
        if let Some(source) = get("DATA_API_SOURCE") {
            self.remote.data_source = source;
        }
        if let Some(db) = get("DATA_API_DATABASE") {
            self.remote.database = db;
        }
        if let Some(collection) = get("DATA_API_COLLECTION") {
            self.remote.collection = collection;
        }

        parse_into(&get, "NOTEBOARD_POOL_SIZE", &mut self.pool_size);
        parse_into(
            &get,
            "NOTEBOARD_SELECTION_TIMEOUT_MS",
            &mut self.selection_timeout_ms,
        );
        parse_into(&get, "NOTEBOARD_SOCKET_TIMEOUT_MS", &mut self.socket_timeout_ms);
    }

    /// Database URI, if one is configured and non-blank.
    pub fn database_url(&self) -> Option<&str> {
        non_blank(self.database_url.as_deref())
    }

    pub fn selection_timeout(&self) -> Duration {
        Duration::from_millis(self.selection_timeout_ms)
    }

    pub fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn dedup_window(&self) -> Duration {
        Duration::from_secs(self.dedup_window_secs)
    }
}

impl RemoteConfig {
    /// Base URL and API key, only when both are present.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        Some((
            non_blank(self.base_url.as_deref())?,
            non_blank(self.api_key.as_deref())?,
        ))
    }

    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T)
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        match raw.trim().parse() {
            Ok(value) => *slot = value,
            Err(_) => warn!("Ignoring {}: '{}' is not a valid number", key, raw),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.database_url(), None);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.selection_timeout(), Duration::from_secs(10));
        assert_eq!(config.socket_timeout(), Duration::from_secs(45));
        assert_eq!(config.connect_attempts, 3);
        assert_eq!(config.initial_backoff(), Duration::from_millis(250));
        assert_eq!(config.dedup_window(), Duration::from_secs(10));
        assert_eq!(config.remote.data_source, "Cluster0");
        assert_eq!(config.remote.collection, "notes");
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = GatewayConfig::from_toml_str(
            r#"
            database_url = "postgres://localhost/noteboard"
            pool_size = 4

            [remote]
            base_url = "https://data.example.com/app/x/endpoint/data/v1"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url(), Some("postgres://localhost/noteboard"));
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.socket_timeout_ms, 45_000);
        assert_eq!(config.remote.database, "noteboard");
        // key is missing, so the remote tier stays off
        assert!(!config.remote.is_configured());
    }

    #[test]
    fn env_overrides_file() {
        let mut config = GatewayConfig::from_toml_str("pool_size = 4").unwrap();
        let env: HashMap<&str, &str> = [
            ("DATABASE_URL", "postgres://db/notes"),
            ("DATA_API_URL", "https://data.example.com"),
            ("DATA_API_KEY", "secret"),
            ("DATA_API_COLLECTION", "presents"),
            ("NOTEBOARD_POOL_SIZE", "7"),
            ("NOTEBOARD_SOCKET_TIMEOUT_MS", "not-a-number"),
        ]
        .into_iter()
        .collect();

        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.database_url(), Some("postgres://db/notes"));
        assert_eq!(config.pool_size, 7);
        assert_eq!(config.socket_timeout_ms, 45_000);
        assert_eq!(config.remote.collection, "presents");
        assert_eq!(
            config.remote.credentials(),
            Some(("https://data.example.com", "secret"))
        );
    }

    #[test]
    fn blank_values_count_as_absent() {
        let mut config = GatewayConfig::default();
        config.remote.base_url = Some("https://data.example.com".into());
        config.remote.api_key = Some("   ".into());
        config.database_url = Some(String::new());
        assert!(!config.remote.is_configured());
        assert_eq!(config.database_url(), None);

        config.apply_env(|k| (k == "DATABASE_URL").then(|| " ".to_string()));
        assert_eq!(config.database_url(), None);
    }

    #[test]
    fn load_file_handles_missing_and_invalid() {
        assert!(GatewayConfig::load_file(Path::new("/nonexistent/noteboard.toml")).is_none());

        let mut bad = tempfile::NamedTempFile::new().unwrap();
        writeln!(bad, "pool_size = \"many\"").unwrap();
        assert!(GatewayConfig::load_file(bad.path()).is_none());

        let mut good = tempfile::NamedTempFile::new().unwrap();
        writeln!(good, "dedup_window_secs = 30").unwrap();
        let config = GatewayConfig::load_file(good.path()).unwrap();
        assert_eq!(config.dedup_window(), Duration::from_secs(30));
    }
}
