//! The `status` command.

use super::load_settings;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use beacon_event_cache::{EventCache, SqliteEventCache};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct CacheStatus {
    enabled: bool,
    path: Option<String>,
    ready: bool,
    pending: Option<usize>,
}

/// Show the cache location, readiness and pending entry count.
pub fn status(format: &OutputFormat) -> Result<()> {
    let (paths, settings) = load_settings()?;

    let path = settings.resolved_cache_path(&paths);
    let cache = path
        .as_deref()
        .filter(|path| path.exists())
        .map(|path| SqliteEventCache::open(Some(path)));
    let ready = cache.as_ref().is_some_and(|cache| cache.ready());

    let status = CacheStatus {
        enabled: settings.cache_enabled,
        path: path.as_ref().map(|path| path.display().to_string()),
        ready,
        pending: cache
            .as_ref()
            .filter(|cache| cache.ready())
            .map(|cache| cache.pending_count()),
    };
    if let Some(cache) = &cache {
        cache.close();
    }

    match format {
        OutputFormat::Json => output::print_json(&status),
        OutputFormat::Text => {
            output::print_heading("Event cache");
            output::print_row("Enabled", if status.enabled { "yes" } else { "no" });
            output::print_row("Path", status.path.as_deref().unwrap_or("-"));
            let state = match (&cache, status.ready) {
                (None, _) => "not created",
                (Some(_), true) => "ready",
                (Some(_), false) => "unavailable (locked or corrupt)",
            };
            output::print_row("State", state);
            output::print_row(
                "Pending",
                &status
                    .pending
                    .map_or_else(|| "-".to_string(), |n| n.to_string()),
            );
        }
    }
    Ok(())
}
