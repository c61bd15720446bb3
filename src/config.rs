use crate::common::constants::*;
use crate::common::error::{PlayScannerError, Result};
use crate::domain::Sport;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

pub const DEFAULT_CONFIG_PATH: &str = "playscanner.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub collection: CollectionConfig,
    pub search: SearchConfig,
    pub health: HealthConfig,
    pub playtomic: PlaytomicConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
    /// Bearer secret for /collect and /admin. Privileged routes reject everything when unset.
    pub secret: Option<String>,
    /// Adds diagnostic fields to responses
    pub debug: bool,
    pub metrics_addr: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 3000,
            secret: None,
            debug: false,
            metrics_addr: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub db_path: String,
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: "data/playscanner.db".to_string(),
            timeout_ms: DEFAULT_STORE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub provider: String,
    pub sport: Sport,
    pub cities: Vec<String>,
    pub days_ahead: u32,
    pub request_delay_ms: u64,
    pub cache_ttl_secs: i64,
    pub fetch_timeout_ms: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            provider: PLAYTOMIC_PROVIDER.to_string(),
            sport: Sport::Padel,
            cities: DEFAULT_COLLECTION_CITIES.iter().map(|c| c.to_string()).collect(),
            days_ahead: DEFAULT_DAYS_AHEAD,
            request_delay_ms: DEFAULT_REQUEST_DELAY_MS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            fetch_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
        }
    }
}

impl CollectionConfig {
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.cache_ttl_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Serve searches from the persistent cache unless a request overrides it
    pub use_cached_mode: bool,
    pub providers: Vec<String>,
    pub provider_timeout_ms: u64,
    pub health_check_timeout_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            use_cached_mode: true,
            providers: vec![PLAYTOMIC_PROVIDER.to_string()],
            provider_timeout_ms: DEFAULT_PROVIDER_TIMEOUT_MS,
            health_check_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub success_window_hours: u32,
    pub freshness_threshold_mins: i64,
    pub run_retention_days: u32,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            success_window_hours: DEFAULT_SUCCESS_WINDOW_HOURS,
            freshness_threshold_mins: DEFAULT_FRESHNESS_THRESHOLD_MINS,
            run_retention_days: DEFAULT_RUN_RETENTION_DAYS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaytomicConfig {
    pub base_url: String,
    pub search_radius_m: u32,
    pub max_venues: u32,
    pub request_timeout_ms: u64,
    /// Time allowed for one availability fetch across all venues. Venues not reached
    /// in time are skipped and the slots gathered so far are returned. Keep this
    /// below `collection.fetch_timeout_ms`.
    pub fetch_budget_ms: u64,
    pub health_timeout_ms: u64,
    pub user_agent: String,
}

impl Default for PlaytomicConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.playtomic.io".to_string(),
            search_radius_m: 50_000,
            max_venues: 40,
            request_timeout_ms: 15_000,
            fetch_budget_ms: DEFAULT_PLAYTOMIC_FETCH_BUDGET_MS,
            health_timeout_ms: DEFAULT_HEALTH_CHECK_TIMEOUT_MS,
            user_agent: format!("playscanner/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

fn env_bool(name: &str) -> Option<bool> {
    env::var(name)
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes"))
}

impl Config {
    /// Load configuration from a TOML file (missing file means defaults), then apply
    /// environment overrides. Call `dotenv` before this to pick up a local `.env`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH));
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                PlayScannerError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            info!("Loaded configuration from {}", path.display());
            Self::from_toml(&content)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Config::default()
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(secret) = env::var("PLAYSCANNER_SECRET") {
            if !secret.trim().is_empty() {
                self.server.secret = Some(secret);
            }
        }
        if let Some(debug) = env_bool("PLAYSCANNER_DEBUG") {
            self.server.debug = debug;
        }
        if let Some(cached) = env_bool("PLAYSCANNER_USE_CACHED_MODE") {
            self.search.use_cached_mode = cached;
        }
        if let Ok(path) = env::var("PLAYSCANNER_DB_PATH") {
            self.storage.db_path = path;
        }
        if let Ok(port) = env::var("PLAYSCANNER_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| PlayScannerError::Config(format!("Invalid PLAYSCANNER_PORT '{port}'")))?;
        }
        if let Ok(addr) = env::var("PLAYSCANNER_METRICS_ADDR") {
            self.server.metrics_addr = Some(addr);
        }
        if let Ok(url) = env::var("PLAYTOMIC_BASE_URL") {
            self.playtomic.base_url = url;
        }
        Ok(())
    }
}
