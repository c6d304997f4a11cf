//! The `send` command.

use super::{load_settings, open_client};
use crate::output::{self, OutputFormat};
use anyhow::{bail, Context, Result};
use beacon_outbox::{event_callback, EventStatus};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Send one event and report its outcome.
pub async fn send(
    collection: &str,
    payload: Option<&str>,
    file: Option<&Path>,
    timeout_secs: u64,
    format: &OutputFormat,
) -> Result<()> {
    let payload = match (payload, file) {
        (Some(payload), _) => payload.to_string(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?,
        (None, None) => bail!("a payload or --file is required"),
    };
    let payload = payload.trim();
    serde_json::from_str::<serde_json::Value>(payload).context("payload is not valid JSON")?;

    let (paths, settings) = load_settings()?;
    let client = open_client(&settings, &paths)?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    client.submit(
        collection,
        payload,
        Some(event_callback(move |data| {
            let _ = tx.send(data);
        })),
    );

    let outcome = match tokio::time::timeout(Duration::from_secs(timeout_secs), rx.recv()).await {
        Ok(outcome) => {
            client.shutdown().await;
            outcome
        }
        Err(_) => {
            debug!(timeout_secs, "No outcome yet; shutting down");
            // Shutdown flushes the pending send and reports it.
            client.shutdown().await;
            rx.recv().await
        }
    };
    let Some(data) = outcome else {
        bail!("event outcome was not reported");
    };

    match format {
        OutputFormat::Json => output::print_json(&data),
        OutputFormat::Text => match data.status {
            EventStatus::Submitted => println!("Event sent to {}", data.event.name()),
            EventStatus::Cached => {
                println!("Delivery failed; event cached for retry (run 'beacon flush')")
            }
            EventStatus::Failed => {}
        },
    }

    if data.status == EventStatus::Failed {
        bail!("event could not be delivered or cached");
    }
    Ok(())
}
