//! Single-attempt dispatch with cache reconciliation.

use crate::callback::notify;
use crate::in_flight::InFlightRequest;
use crate::transport::JSON_CONTENT_TYPE;
use crate::{
    ClientConfig, EventCallback, EventStatus, InFlightTracker, OutboxError, OutboxResult, Origin,
    PostRequest, RequestId, Transport,
};
use beacon_event_cache::{Event, EventCache};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

/// Sends each event once and reconciles the outcome with the cache.
///
/// On success the event's cache entry is removed. On failure it is written
/// to the cache, which inserts it or bumps its attempts. The outcome is
/// reported through the submission's callback as [`EventStatus::Submitted`],
/// [`EventStatus::Cached`] or [`EventStatus::Failed`].
pub struct Dispatcher {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    tracker: Arc<InFlightTracker>,
    runtime: Handle,
}

impl Dispatcher {
    /// Create a dispatcher. Fails if the configuration does not validate.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        tracker: Arc<InFlightTracker>,
        runtime: Handle,
    ) -> OutboxResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            tracker,
            runtime,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The configured cache, if any.
    pub fn cache(&self) -> Option<&Arc<dyn EventCache>> {
        self.config.cache.as_ref()
    }

    pub fn tracker(&self) -> &Arc<InFlightTracker> {
        &self.tracker
    }

    /// Start one network attempt for `event`.
    ///
    /// Returns immediately; the callback fires later from a runtime worker.
    /// Events that cannot be addressed are reported as failed without a
    /// network attempt, and `None` is returned.
    pub fn submit(
        &self,
        event: Event,
        callback: Option<EventCallback>,
        origin: Origin,
    ) -> Option<RequestId> {
        let request = match self.build_request(&event) {
            Ok(request) => request,
            Err(e) => {
                error!(
                    event_name = %event.name(),
                    error = %e,
                    "Event rejected before sending"
                );
                notify(callback.as_ref(), EventStatus::Failed, event);
                return None;
            }
        };

        let id = self.tracker.register(event, origin, callback);
        let guard = self.tracker.task_guard();
        let transport = self.transport.clone();
        let tracker = self.tracker.clone();
        let cache = self.config.cache.clone();

        debug!(request_id = %id, origin = ?origin, url = %request.url, "Dispatching event");

        let task = self.runtime.spawn(async move {
            let _guard = guard;
            let result = transport.post(request).await;

            let Some(in_flight) = tracker.complete(id) else {
                debug!(request_id = %id, "Result arrived after flush; dropped");
                return;
            };
            // Cache writes wait on fsync.
            let reconciled =
                tokio::task::spawn_blocking(move || reconcile(cache.as_deref(), in_flight, result));
            if let Err(e) = reconciled.await {
                error!(request_id = %id, error = %e, "Reconciliation task failed");
            }
        });
        self.tracker.attach(id, task.abort_handle());

        Some(id)
    }

    fn build_request(&self, event: &Event) -> OutboxResult<PostRequest> {
        if event.name().is_empty() {
            return Err(OutboxError::Config("event name is empty".to_string()));
        }
        if event.payload().is_empty() {
            return Err(OutboxError::Config("event payload is empty".to_string()));
        }
        Ok(PostRequest {
            url: self.config.event_url(event.name())?,
            authorization: self.config.write_key.clone(),
            content_type: JSON_CONTENT_TYPE,
            body: event.payload().to_string(),
        })
    }
}

/// Apply a network result to the cache and report it.
fn reconcile(cache: Option<&dyn EventCache>, request: InFlightRequest, result: OutboxResult<()>) {
    let cache = cache.filter(|cache| cache.ready());

    let status = match result {
        Ok(()) => {
            info!(
                request_id = %request.id,
                event_name = %request.event.name(),
                origin = ?request.origin,
                "Event submitted"
            );
            if let Some(cache) = cache {
                if cache.remove(&request.event) {
                    debug!(request_id = %request.id, "Delivered event removed from cache");
                }
            }
            EventStatus::Submitted
        }
        Err(e) => {
            warn!(
                request_id = %request.id,
                event_name = %request.event.name(),
                origin = ?request.origin,
                error = %e,
                "Event submission failed"
            );
            match cache {
                Some(cache) if cache.write(&request.event) => EventStatus::Cached,
                _ => {
                    error!(
                        request_id = %request.id,
                        event_name = %request.event.name(),
                        "Failed event could not be cached; dropped"
                    );
                    EventStatus::Failed
                }
            }
        }
    };

    notify(request.callback.as_ref(), status, request.event);
}
