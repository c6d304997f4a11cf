//! Submission outcomes reported to the host.

use beacon_event_cache::Event;
use serde::Serialize;
use std::sync::Arc;

/// Terminal outcome of one submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    /// The collector accepted the event.
    Submitted,
    /// Delivery failed and the event is in the cache awaiting a sweep.
    Cached,
    /// Delivery failed and the event could not be cached. It is lost.
    Failed,
}

/// Payload handed to an [`EventCallback`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallbackData {
    pub status: EventStatus,
    pub event: Event,
}

/// Host callback invoked once per submission with its terminal outcome.
///
/// Called from a runtime worker thread, never from the thread that submitted.
pub type EventCallback = Arc<dyn Fn(CallbackData) + Send + Sync>;

/// Wrap a closure as an [`EventCallback`].
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(CallbackData) + Send + Sync + 'static,
{
    Arc::new(f)
}

pub(crate) fn notify(callback: Option<&EventCallback>, status: EventStatus, event: Event) {
    if let Some(callback) = callback {
        callback(CallbackData { status, event });
    }
}
