//! Delivery settings, loaded from `config.json` and the environment.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// Default collector base URL (can be overridden at compile time via BEACON_DEFAULT_COLLECTOR_URL env var).
pub const DEFAULT_COLLECTOR_URL: &str = match option_env!("BEACON_DEFAULT_COLLECTOR_URL") {
    Some(url) => url,
    None => "https://api.keen.io/3.0",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default seconds between cache sweeps.
pub const DEFAULT_SWEEP_INTERVAL_SECS: f64 = 15.0;

/// Sweep intervals at or below this are rejected.
pub const MIN_SWEEP_INTERVAL_SECS: f64 = 0.5;

/// Default number of cached events resubmitted per sweep.
pub const DEFAULT_SWEEP_BATCH_SIZE: u32 = 10;

/// Default attempts ceiling for cached events (0 = unlimited).
pub const DEFAULT_MAX_ATTEMPTS: u32 = 9;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 2_000;

/// Event delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Collector project identifier.
    #[serde(default)]
    pub project_id: String,
    /// Write credential attached to every submission.
    #[serde(default)]
    pub write_key: String,
    /// Collector base URL, including the API version segment.
    #[serde(default = "default_collector_url")]
    pub collector_url: String,
    /// Seconds between cache sweeps.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: f64,
    /// Cached events resubmitted per sweep.
    #[serde(default = "default_sweep_batch_size")]
    pub sweep_batch_size: u32,
    /// Cached events that failed this many times are no longer swept (0 = unlimited).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Event cache database path. `None` uses [`Paths::default_cache_file`].
    #[serde(default)]
    pub cache_path: Option<PathBuf>,
    /// Whether failed events are cached at all.
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    /// HTTP request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight submissions before flushing them to the cache.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_collector_url() -> String {
    DEFAULT_COLLECTOR_URL.to_string()
}

fn default_sweep_interval_secs() -> f64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

fn default_sweep_batch_size() -> u32 {
    DEFAULT_SWEEP_BATCH_SIZE
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_shutdown_grace_ms() -> u64 {
    DEFAULT_SHUTDOWN_GRACE_MS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            write_key: String::new(),
            collector_url: default_collector_url(),
            sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            cache_path: None,
            cache_enabled: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load settings from `<base>/config.json`, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save settings to `<base>/config.json`.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override settings from environment variables.
    fn load_from_env(&mut self) {
        if let Some(project_id) = non_empty_env("BEACON_PROJECT_ID") {
            self.project_id = project_id;
        }
        if let Some(write_key) = non_empty_env("BEACON_WRITE_KEY") {
            self.write_key = write_key;
        }
        if let Some(collector_url) = non_empty_env("BEACON_COLLECTOR_URL") {
            self.collector_url = collector_url;
        }
        if let Some(log_level) = non_empty_env("BEACON_LOG_LEVEL") {
            self.log_level = log_level;
        }
    }

    /// Get the collector base URL as a parsed URL.
    pub fn collector_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.collector_url)?;
        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "collector url cannot be a base: {}",
                self.collector_url
            )));
        }
        Ok(url)
    }

    /// Resolve the cache database path, `None` when caching is disabled.
    pub fn resolved_cache_path(&self, paths: &Paths) -> Option<PathBuf> {
        if !self.cache_enabled {
            return None;
        }
        Some(
            self.cache_path
                .clone()
                .unwrap_or_else(|| paths.default_cache_file()),
        )
    }

    /// Copy of these settings with the write key masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.write_key.is_empty() {
            let visible: String = copy.write_key.chars().take(4).collect();
            copy.write_key = format!("{visible}****");
        }
        copy
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
