//! The `flush` command.

use super::{load_settings, open_client};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Result};
use serde::Serialize;
use std::time::Duration;
use tokio::time::{interval, Instant};
use tracing::info;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize)]
struct FlushSummary {
    pending_before: usize,
    pending_after: usize,
    timed_out: bool,
}

/// Sweep the cache until no eligible event is left or the timeout elapses.
///
/// Events past the attempts ceiling are never resent and stay counted in
/// `pending_after`.
pub async fn flush(timeout_secs: u64, format: &OutputFormat) -> Result<()> {
    let (paths, settings) = load_settings()?;
    let client = open_client(&settings, &paths)?;

    let Some(cache) = client.cache().filter(|cache| cache.ready()) else {
        client.shutdown().await;
        bail!("event cache is not available");
    };
    let pending_before = cache.pending_count();

    let deadline = Instant::now() + Duration::from_secs(timeout_secs);
    let mut timed_out = false;
    if pending_before > 0 {
        client.start_sweep();
        let mut ticker = interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if cache.read(1, settings.max_attempts).is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                timed_out = true;
                break;
            }
        }
    }

    let pending_after = cache.pending_count();
    client.shutdown().await;
    info!(pending_before, pending_after, timed_out, "Flush finished");

    let summary = FlushSummary {
        pending_before,
        pending_after,
        timed_out,
    };
    match format {
        OutputFormat::Json => output::print_json(&summary),
        OutputFormat::Text => {
            let delivered = pending_before.saturating_sub(pending_after);
            output::print_row("Delivered", &delivered.to_string());
            output::print_row("Still cached", &pending_after.to_string());
            if timed_out {
                println!("Timed out after {}s", timeout_secs);
            }
        }
    }
    Ok(())
}
