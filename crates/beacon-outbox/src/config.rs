//! Client configuration.

use crate::transport::event_url;
use crate::{EventCallback, OutboxError, OutboxResult};
use beacon_config_and_utils::{
    Config, DEFAULT_COLLECTOR_URL, DEFAULT_MAX_ATTEMPTS, DEFAULT_SWEEP_BATCH_SIZE,
    DEFAULT_SWEEP_INTERVAL_SECS, MIN_SWEEP_INTERVAL_SECS,
};
use beacon_event_cache::EventCache;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Settings for an [`EventClient`](crate::EventClient).
///
/// A client only dispatches with a configuration that passes
/// [`validate`](ClientConfig::validate).
#[derive(Clone)]
pub struct ClientConfig {
    pub project_id: String,
    /// Sent verbatim as the `Authorization` header.
    pub write_key: String,
    pub collector_url: String,
    /// Period between cache sweeps. Must exceed half a second.
    pub sweep_interval: Duration,
    /// Maximum events resubmitted per sweep.
    pub sweep_batch_size: usize,
    /// Cached events with this many attempts are no longer swept. `0` means
    /// unlimited.
    pub max_attempts: u32,
    /// How long shutdown waits for in-flight sends before flushing them.
    pub shutdown_grace: Duration,
    /// Default callback for submissions without their own, and for sweep
    /// results.
    pub event_callback: Option<EventCallback>,
    /// Durable store for failed events. Without one, failures are final.
    pub cache: Option<Arc<dyn EventCache>>,
}

impl ClientConfig {
    /// Defaults for everything but the credentials.
    pub fn new(project_id: impl Into<String>, write_key: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            write_key: write_key.into(),
            collector_url: DEFAULT_COLLECTOR_URL.to_string(),
            sweep_interval: Duration::from_secs_f64(DEFAULT_SWEEP_INTERVAL_SECS),
            sweep_batch_size: DEFAULT_SWEEP_BATCH_SIZE as usize,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            shutdown_grace: Duration::from_secs(2),
            event_callback: None,
            cache: None,
        }
    }

    /// Build from file/env settings. The cache is attached separately.
    ///
    /// A negative or non-finite sweep interval becomes zero, which
    /// [`validate`](Self::validate) rejects.
    pub fn from_settings(settings: &Config) -> Self {
        Self {
            project_id: settings.project_id.clone(),
            write_key: settings.write_key.clone(),
            collector_url: settings.collector_url.clone(),
            sweep_interval: Duration::try_from_secs_f64(settings.sweep_interval_secs)
                .unwrap_or(Duration::ZERO),
            sweep_batch_size: settings.sweep_batch_size as usize,
            max_attempts: settings.max_attempts,
            shutdown_grace: Duration::from_millis(settings.shutdown_grace_ms),
            event_callback: None,
            cache: None,
        }
    }

    /// Attach a durable store.
    pub fn with_cache(mut self, cache: Arc<dyn EventCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the default callback.
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.event_callback = Some(callback);
        self
    }

    /// Check that the client can dispatch with these settings.
    pub fn validate(&self) -> OutboxResult<()> {
        if self.project_id.trim().is_empty() {
            return Err(OutboxError::Config("project id is empty".to_string()));
        }
        if self.write_key.trim().is_empty() {
            return Err(OutboxError::Config("write key is empty".to_string()));
        }
        if self.sweep_interval.as_secs_f64() <= MIN_SWEEP_INTERVAL_SECS {
            return Err(OutboxError::Config(format!(
                "sweep interval must exceed {MIN_SWEEP_INTERVAL_SECS}s, got {:?}",
                self.sweep_interval
            )));
        }
        if self.sweep_batch_size == 0 {
            return Err(OutboxError::Config(
                "sweep batch size must be at least 1".to_string(),
            ));
        }
        self.collector()?;
        Ok(())
    }

    /// Parsed collector base URL.
    pub fn collector(&self) -> OutboxResult<Url> {
        let url = Url::parse(&self.collector_url)
            .map_err(|e| OutboxError::Config(format!("invalid collector url: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(OutboxError::Config(format!(
                "collector url cannot be a base: {}",
                self.collector_url
            )));
        }
        Ok(url)
    }

    /// Address of the collection's event endpoint.
    pub fn event_url(&self, collection: &str) -> OutboxResult<Url> {
        event_url(&self.collector()?, &self.project_id, collection)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("project_id", &self.project_id)
            .field("write_key", &"****")
            .field("collector_url", &self.collector_url)
            .field("sweep_interval", &self.sweep_interval)
            .field("sweep_batch_size", &self.sweep_batch_size)
            .field("max_attempts", &self.max_attempts)
            .field("shutdown_grace", &self.shutdown_grace)
            .field("event_callback", &self.event_callback.is_some())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}
