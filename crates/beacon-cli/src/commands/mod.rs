//! CLI command implementations.

mod config;
mod flush;
mod send;
mod status;

pub use config::config;
pub use flush::flush;
pub use send::send;
pub use status::status;

use anyhow::{Context, Result};
use beacon_config_and_utils::{Config, Paths};
use beacon_event_cache::{EventCache, SqliteEventCache};
use beacon_outbox::{ClientConfig, EventClient, HttpTransport, TransportConfig};
use std::sync::Arc;
use tracing::{debug, warn};

/// Load settings from the config file and environment.
pub fn load_settings() -> Result<(Paths, Config)> {
    let paths = Paths::new()?;
    let settings = Config::load(&paths)
        .with_context(|| format!("failed to load {}", paths.config_file().display()))?;
    Ok((paths, settings))
}

/// Log level from settings, for when none was given on the command line.
pub fn configured_log_level() -> Option<String> {
    load_settings().ok().map(|(_, settings)| settings.log_level)
}

/// Open the configured event cache. `None` when caching is disabled.
fn open_cache(settings: &Config, paths: &Paths) -> Result<Option<Arc<dyn EventCache>>> {
    let Some(path) = settings.resolved_cache_path(paths) else {
        debug!("Event cache disabled");
        return Ok(None);
    };
    if settings.cache_path.is_none() {
        paths.ensure_dirs()?;
    }

    let cache = SqliteEventCache::open(Some(&path));
    if !cache.ready() {
        warn!(path = %path.display(), "Event cache unavailable; failed events will be dropped");
    }
    Ok(Some(Arc::new(cache)))
}

/// Build a client from settings, failing early on invalid settings.
fn open_client(settings: &Config, paths: &Paths) -> Result<EventClient> {
    let mut config = ClientConfig::from_settings(settings);
    if let Some(cache) = open_cache(settings, paths)? {
        config = config.with_cache(cache);
    }
    config
        .validate()
        .context("invalid settings; set BEACON_PROJECT_ID and BEACON_WRITE_KEY or edit the config file")?;

    let transport = HttpTransport::new(TransportConfig {
        timeout_secs: settings.request_timeout_secs,
    })?;
    Ok(EventClient::new(config, Arc::new(transport))?)
}
