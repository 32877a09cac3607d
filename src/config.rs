use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::graph::SortBy;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub opsgraph: OpsgraphConfig,
    #[serde(default)]
    pub traversal: TraversalConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub links: LinksConfig,
    #[serde(default)]
    pub actions: ActionsConfig,
    #[serde(default)]
    pub http_server: HttpServerConfig,
}

/// Session-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OpsgraphConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
    /// Tenant whose relationships are loaded at session start.
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Record kind passed to the persistence collaborator.
    #[serde(default = "default_relationship_kind")]
    pub relationship_kind: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for OpsgraphConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            tenant: default_tenant(),
            relationship_kind: default_relationship_kind(),
            log_level: default_log_level(),
        }
    }
}

/// Default traversal bounds
#[derive(Debug, Clone, Deserialize)]
pub struct TraversalConfig {
    #[serde(default = "default_max_distance")]
    pub max_distance: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default = "default_graph_depth")]
    pub graph_depth: usize,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_distance: default_max_distance(),
            limit: default_limit(),
            sort_by: SortBy::default(),
            graph_depth: default_graph_depth(),
        }
    }
}

/// LRU capacities for the path and short-link caches
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_path_cache_capacity")]
    pub path_cache_capacity: usize,
    #[serde(default = "default_short_link_capacity")]
    pub short_link_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path_cache_capacity: default_path_cache_capacity(),
            short_link_capacity: default_short_link_capacity(),
        }
    }
}

/// Deep link configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LinksConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl Default for LinksConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

/// Remote action collaborator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ActionsConfig {
    /// Base URL that relative action endpoints are joined onto.
    #[serde(default)]
    pub api_base_url: Option<String>,
    /// Name of the environment variable holding a bearer token, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            api_key_env: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
            allowed_origins: default_allowed_origins(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("opsgraph.db")
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_relationship_kind() -> String {
    "entity_relationship".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_max_distance() -> usize {
    3
}

fn default_limit() -> usize {
    100
}

fn default_graph_depth() -> usize {
    2
}

fn default_path_cache_capacity() -> usize {
    1024
}

fn default_short_link_capacity() -> usize {
    4096
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_http_port() -> u16 {
    8080
}

fn default_allowed_origins() -> Vec<String> {
    vec![]
}

impl Config {
    /// Load configuration from file
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in OPSGRAPH_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let _ = dotenv::dotenv();

        let config_path = std::env::var("OPSGRAPH_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        Self::from_toml_str(&config_str)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(config_str: &str) -> Result<Self> {
        let config: Config = toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.opsgraph.tenant.trim().is_empty() {
            anyhow::bail!("opsgraph.tenant must not be empty");
        }

        if self.traversal.max_distance == 0 {
            anyhow::bail!("traversal.max_distance must be greater than 0");
        }

        if self.traversal.limit == 0 {
            anyhow::bail!("traversal.limit must be greater than 0");
        }

        if self.cache.path_cache_capacity == 0 {
            anyhow::bail!("cache.path_cache_capacity must be greater than 0");
        }

        if self.cache.short_link_capacity == 0 {
            anyhow::bail!("cache.short_link_capacity must be greater than 0");
        }

        url::Url::parse(&self.links.base_url)
            .with_context(|| format!("links.base_url is not a valid URL: {}", self.links.base_url))?;

        if let Some(api_base) = &self.actions.api_base_url {
            url::Url::parse(api_base)
                .with_context(|| format!("actions.api_base_url is not a valid URL: {}", api_base))?;
        }

        if self.actions.timeout_secs == 0 {
            anyhow::bail!("actions.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.opsgraph.db_path
    }

    /// Bearer token for remote actions, read from the configured env var
    pub fn action_api_key(&self) -> Option<String> {
        self.actions
            .api_key_env
            .as_ref()
            .and_then(|name| std::env::var(name).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Serialize config tests that mutate process-wide env so they don't race.
    static CONFIG_TEST_LOCK: Mutex<()> = Mutex::new(());

    const FULL_CONFIG: &str = r#"
[opsgraph]
db_path = "./test.db"
tenant = "acme"
log_level = "debug"

[traversal]
max_distance = 4
limit = 50
sort_by = "impact"
graph_depth = 3

[cache]
path_cache_capacity = 16
short_link_capacity = 32

[links]
base_url = "https://ops.example.com/app"

[actions]
api_base_url = "https://api.example.com"
api_key_env = "OPSGRAPH_TEST_API_KEY"
timeout_secs = 5
"#;

    #[test]
    fn test_config_parse_full() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        assert_eq!(config.opsgraph.tenant, "acme");
        assert_eq!(config.opsgraph.log_level, "debug");
        assert_eq!(config.traversal.max_distance, 4);
        assert_eq!(config.traversal.limit, 50);
        assert_eq!(config.traversal.sort_by, SortBy::Impact);
        assert_eq!(config.cache.path_cache_capacity, 16);
        assert_eq!(config.links.base_url, "https://ops.example.com/app");
        assert_eq!(config.actions.timeout_secs, 5);
    }

    #[test]
    fn test_config_defaults_from_empty() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.opsgraph.tenant, "default");
        assert_eq!(config.opsgraph.relationship_kind, "entity_relationship");
        assert_eq!(config.traversal.max_distance, 3);
        assert_eq!(config.traversal.limit, 100);
        assert_eq!(config.traversal.sort_by, SortBy::Relevance);
        assert_eq!(config.traversal.graph_depth, 2);
        assert_eq!(config.http_server.port, 8080);
        assert!(config.actions.api_base_url.is_none());
    }

    #[test]
    fn test_config_rejects_zero_limit() {
        let err = Config::from_toml_str("[traversal]\nlimit = 0\n").unwrap_err();
        assert!(err.to_string().contains("traversal.limit"));
    }

    #[test]
    fn test_config_rejects_zero_max_distance() {
        let err = Config::from_toml_str("[traversal]\nmax_distance = 0\n").unwrap_err();
        assert!(err.to_string().contains("traversal.max_distance"));
    }

    #[test]
    fn test_config_rejects_bad_base_url() {
        let err = Config::from_toml_str("[links]\nbase_url = \"not a url\"\n").unwrap_err();
        assert!(err.to_string().contains("links.base_url"));
    }

    #[test]
    fn test_config_load_from_env_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("opsgraph.toml");
        fs::write(&config_path, FULL_CONFIG).unwrap();

        let original = std::env::var("OPSGRAPH_CONFIG").ok();
        std::env::set_var("OPSGRAPH_CONFIG", config_path.to_str().unwrap());
        let config = Config::load();
        std::env::remove_var("OPSGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("OPSGRAPH_CONFIG", v);
        }

        let config = config.unwrap();
        assert_eq!(config.opsgraph.tenant, "acme");
    }

    #[test]
    fn test_config_invalid_path() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let original = std::env::var("OPSGRAPH_CONFIG").ok();
        std::env::set_var("OPSGRAPH_CONFIG", "nonexistent-opsgraph.toml");
        let config = Config::load();
        std::env::remove_var("OPSGRAPH_CONFIG");
        if let Some(v) = original {
            std::env::set_var("OPSGRAPH_CONFIG", v);
        }
        assert!(config.is_err());
    }

    #[test]
    fn test_action_api_key_from_env() {
        let _lock = CONFIG_TEST_LOCK.lock().unwrap();
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();
        std::env::set_var("OPSGRAPH_TEST_API_KEY", "secret");
        assert_eq!(config.action_api_key().as_deref(), Some("secret"));
        std::env::remove_var("OPSGRAPH_TEST_API_KEY");
        assert!(config.action_api_key().is_none());
    }
}
