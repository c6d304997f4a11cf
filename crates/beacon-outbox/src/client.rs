//! Host-facing event client.

use crate::callback::notify;
use crate::{
    ClientConfig, Dispatcher, EventCallback, EventStatus, FlushReport, InFlightTracker,
    OutboxError, OutboxResult, Origin, StandardEvent, SweepScheduler, ToWireFormat, Transport,
};
use beacon_event_cache::{Event, EventCache};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Upper bound on waiting for submission tasks to exit once they were flushed.
const TASK_EXIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Snapshot of a client, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// The current configuration passed validation.
    pub validated: bool,
    /// [`EventClient::shutdown`] has been called.
    pub closed: bool,
    pub sweep_running: bool,
    /// Submissions awaiting a network result.
    pub in_flight: usize,
    /// Cached entries, `None` without a ready cache.
    pub cached: Option<usize>,
}

struct ClientState {
    config: ClientConfig,
    /// `None` while the configuration is invalid.
    dispatcher: Option<Arc<Dispatcher>>,
}

/// Entry point for hosts.
///
/// Submissions return immediately; each one reports exactly one
/// [`EventStatus`] through its callback, or through the configured
/// `event_callback` when it has none. The sweep starts with the first
/// submission. Call [`shutdown`](EventClient::shutdown) before exiting so
/// in-flight events reach the cache.
pub struct EventClient {
    transport: Arc<dyn Transport>,
    tracker: Arc<InFlightTracker>,
    runtime: Handle,
    /// Submissions hold a read lock while they call back into the host, so
    /// readers use `read_recursive`.
    state: RwLock<ClientState>,
    scheduler: SweepScheduler,
    /// Serializes `reconfigure` and `shutdown`.
    lifecycle: Mutex<()>,
    /// Set under the state write lock.
    closed: AtomicBool,
}

impl EventClient {
    /// Create a client on the current Tokio runtime.
    ///
    /// An invalid configuration is logged and leaves the client unvalidated:
    /// it reports every submission as failed until
    /// [`reconfigure`](Self::reconfigure) succeeds. Only a missing runtime is an
    /// error.
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> OutboxResult<Self> {
        let runtime = Handle::try_current().map_err(|e| OutboxError::Runtime(e.to_string()))?;
        let tracker = Arc::new(InFlightTracker::new());
        let state = build_state(config, &transport, &tracker, &runtime);

        Ok(Self {
            transport,
            tracker,
            scheduler: SweepScheduler::new(runtime.clone()),
            runtime,
            state: RwLock::new(state),
            lifecycle: Mutex::new(()),
            closed: AtomicBool::new(false),
        })
    }

    /// Whether the current configuration passed validation.
    pub fn is_validated(&self) -> bool {
        self.state.read_recursive().dispatcher.is_some()
    }

    /// Submit one event. `on_result` overrides the configured callback.
    pub fn submit(&self, collection: &str, payload: &str, on_result: Option<EventCallback>) {
        self.submit_event(Event::new(collection, payload), on_result);
    }

    /// Serialize `record` and submit it to `collection`.
    pub fn submit_record<T>(&self, collection: &str, record: &T, on_result: Option<EventCallback>)
    where
        T: ToWireFormat + ?Sized,
    {
        match record.to_wire_format() {
            Ok(payload) => self.submit(collection, &payload, on_result),
            Err(e) => {
                error!(event_name = %collection, error = %e, "Event record could not be serialized");
                let callback = self.resolve_callback(on_result);
                notify(callback.as_ref(), EventStatus::Failed, Event::new(collection, ""));
            }
        }
    }

    /// Submit a record to its standard collection.
    pub fn send_standard<T: StandardEvent>(&self, record: &T, on_result: Option<EventCallback>) {
        self.submit_record(T::COLLECTION, record, on_result);
    }

    /// Start the sweep without waiting for a submission.
    ///
    /// Returns whether a sweep is running afterwards.
    pub fn start_sweep(&self) -> bool {
        if self.closed.load(Ordering::SeqCst) {
            return false;
        }
        let (dispatcher, callback) = {
            let state = self.state.read_recursive();
            (state.dispatcher.clone(), state.config.event_callback.clone())
        };
        match dispatcher {
            Some(dispatcher) => {
                self.scheduler.start(dispatcher, callback);
                self.scheduler.is_running()
            }
            None => {
                warn!("Client is not configured; sweep not started");
                false
            }
        }
    }

    /// Replace the configuration.
    ///
    /// Stops the sweep, gives in-flight submissions the outgoing grace period
    /// and flushes the rest into the outgoing cache, then validates `config`.
    /// The sweep restarts on the new configuration if it was running, or was
    /// started by a submission meanwhile, and the new configuration is valid.
    /// The outgoing cache is left open. Returns whether the new configuration
    /// validated.
    pub async fn reconfigure(&self, config: ClientConfig) -> bool {
        let _lifecycle = self.lifecycle.lock().await;
        if self.closed.load(Ordering::SeqCst) {
            warn!("Client is shut down; reconfigure ignored");
            return false;
        }

        let was_running = self.scheduler.stop().await;
        let (outgoing_cache, grace) = {
            let state = self.state.read_recursive();
            (state.config.cache.clone(), state.config.shutdown_grace)
        };
        self.settle_in_flight(outgoing_cache, grace).await;

        let state = build_state(config, &self.transport, &self.tracker, &self.runtime);
        let dispatcher = state.dispatcher.clone();
        let callback = state.config.event_callback.clone();
        *self.state.write() = state;

        // Submissions during the grace period restart the sweep on the
        // outgoing dispatcher. Sweeps start under the state lock, so any such
        // sweep is visible here.
        let restarted = self.scheduler.stop().await;
        if restarted {
            debug!("Stopped sweep started during reconfigure");
        }

        let Some(dispatcher) = dispatcher else {
            return false;
        };
        let restart = was_running || restarted;
        info!(restart_sweep = restart, "Event client reconfigured");
        if restart {
            self.scheduler.start(dispatcher, callback);
        }
        true
    }

    /// Stop the client for good.
    ///
    /// Halts the sweep, waits up to the configured grace period for in-flight
    /// submissions, flushes whatever is still in flight into the cache, waits
    /// for submission tasks to exit and closes the cache. Idempotent.
    pub async fn shutdown(&self) {
        {
            // Submissions register under the read lock, so every one that saw
            // the client open is tracked once this returns.
            let _state = self.state.write();
            if self.closed.swap(true, Ordering::SeqCst) {
                return;
            }
        }
        let _lifecycle = self.lifecycle.lock().await;
        info!(in_flight = self.tracker.len(), "Shutting down event client");

        self.scheduler.halt().await;

        let (cache, grace) = {
            let state = self.state.read_recursive();
            (state.config.cache.clone(), state.config.shutdown_grace)
        };
        let report = self.settle_in_flight(cache.clone(), grace).await;

        if !self.tracker.wait_idle(TASK_EXIT_TIMEOUT).await {
            warn!(
                active_tasks = self.tracker.active_tasks(),
                "Submission tasks still running at shutdown"
            );
        }
        if let Some(cache) = cache {
            if let Err(e) = tokio::task::spawn_blocking(move || cache.close()).await {
                error!(error = %e, "Closing the event cache failed");
            }
        }

        info!(
            flushed = report.flushed,
            lost = report.lost,
            "Event client shut down"
        );
    }

    pub fn status(&self) -> ClientStatus {
        let state = self.state.read_recursive();
        let cached = state
            .config
            .cache
            .as_ref()
            .filter(|cache| cache.ready())
            .map(|cache| cache.pending_count());

        ClientStatus {
            validated: state.dispatcher.is_some(),
            closed: self.closed.load(Ordering::SeqCst),
            sweep_running: self.scheduler.is_running(),
            in_flight: self.tracker.len(),
            cached,
        }
    }

    /// The configured cache, if any.
    pub fn cache(&self) -> Option<Arc<dyn EventCache>> {
        self.state.read_recursive().config.cache.clone()
    }

    fn submit_event(&self, event: Event, on_result: Option<EventCallback>) {
        let state = self.state.read_recursive();
        let callback = on_result.or_else(|| state.config.event_callback.clone());

        if self.closed.load(Ordering::SeqCst) {
            drop(state);
            warn!(event_name = %event.name(), "Client is shut down; event dropped");
            notify(callback.as_ref(), EventStatus::Failed, event);
            return;
        }
        let Some(dispatcher) = state.dispatcher.clone() else {
            drop(state);
            error!(event_name = %event.name(), "Client is not configured; event dropped");
            notify(callback.as_ref(), EventStatus::Failed, event);
            return;
        };

        if !self.scheduler.is_running() {
            self.scheduler
                .start(dispatcher.clone(), state.config.event_callback.clone());
        }
        dispatcher.submit(event, callback, Origin::Live);
    }

    fn resolve_callback(&self, on_result: Option<EventCallback>) -> Option<EventCallback> {
        on_result.or_else(|| self.state.read_recursive().config.event_callback.clone())
    }

    /// Wait out the grace period, then flush what is still in flight.
    async fn settle_in_flight(
        &self,
        cache: Option<Arc<dyn EventCache>>,
        grace: Duration,
    ) -> FlushReport {
        if !self.tracker.is_empty() && !self.tracker.wait_idle(grace).await {
            info!(
                in_flight = self.tracker.len(),
                grace = ?grace,
                "Grace period elapsed; flushing in-flight events"
            );
        }
        let tracker = self.tracker.clone();
        match tokio::task::spawn_blocking(move || tracker.flush_into(cache.as_deref())).await {
            Ok(report) => report,
            Err(e) => {
                error!(error = %e, "Flushing in-flight events failed");
                FlushReport::default()
            }
        }
    }
}

impl Drop for EventClient {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) && !self.tracker.is_empty() {
            warn!(
                in_flight = self.tracker.len(),
                "Event client dropped without shutdown; in-flight events may be lost"
            );
        }
    }
}

fn build_state(
    config: ClientConfig,
    transport: &Arc<dyn Transport>,
    tracker: &Arc<InFlightTracker>,
    runtime: &Handle,
) -> ClientState {
    let dispatcher = match Dispatcher::new(
        config.clone(),
        transport.clone(),
        tracker.clone(),
        runtime.clone(),
    ) {
        Ok(dispatcher) => Some(Arc::new(dispatcher)),
        Err(e) => {
            error!(error = %e, "Client configuration invalid; submissions will fail");
            None
        }
    };

    if config.cache.is_none() {
        warn!("No event cache configured; failed events will be dropped");
    } else if !config.cache.as_ref().is_some_and(|cache| cache.ready()) {
        warn!("Event cache not ready; caching disabled");
    }

    ClientState { config, dispatcher }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_callback, CallbackData, PostRequest, Session};
    use async_trait::async_trait;
    use beacon_event_cache::MemoryEventCache;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingTransport {
        posts: Mutex<Vec<PostRequest>>,
    }

    #[async_trait]
    impl Transport for RecordingTransport {
        async fn post(&self, request: PostRequest) -> OutboxResult<()> {
            self.posts.lock().push(request);
            Ok(())
        }
    }

    /// Never answers posts whose body is `"hang"`.
    #[derive(Default)]
    struct HangingTransport {
        posts: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl Transport for HangingTransport {
        async fn post(&self, request: PostRequest) -> OutboxResult<()> {
            let hang = request.body == "\"hang\"";
            self.posts.lock().push((request.authorization, request.body));
            if hang {
                std::future::pending::<()>().await;
            }
            Ok(())
        }
    }

    fn channel_callback() -> (EventCallback, mpsc::UnboundedReceiver<CallbackData>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            event_callback(move |data| {
                let _ = tx.send(data);
            }),
            rx,
        )
    }

    fn valid_config() -> ClientConfig {
        ClientConfig::new("proj", "key").with_cache(Arc::new(MemoryEventCache::new()))
    }

    #[test]
    fn new_requires_runtime() {
        let result = EventClient::new(valid_config(), Arc::new(RecordingTransport::default()));
        assert!(matches!(result, Err(OutboxError::Runtime(_))));
    }

    #[tokio::test]
    async fn unvalidated_client_reports_failed() {
        let (callback, mut rx) = channel_callback();
        let config = ClientConfig::new("", "key").with_event_callback(callback);
        let transport = Arc::new(RecordingTransport::default());
        let client = EventClient::new(config, transport.clone()).unwrap();

        assert!(!client.is_validated());
        client.submit("clicks", "{}", None);

        assert_eq!(rx.recv().await.unwrap().status, EventStatus::Failed);
        assert!(transport.posts.lock().is_empty());
    }

    #[tokio::test]
    async fn per_call_callback_takes_precedence() {
        let (default_cb, mut default_rx) = channel_callback();
        let (call_cb, mut call_rx) = channel_callback();
        let client = EventClient::new(
            valid_config().with_event_callback(default_cb),
            Arc::new(RecordingTransport::default()),
        )
        .unwrap();

        client.submit("clicks", "{}", Some(call_cb));
        assert_eq!(call_rx.recv().await.unwrap().status, EventStatus::Submitted);

        client.submit("clicks", "[]", None);
        assert_eq!(
            default_rx.recv().await.unwrap().status,
            EventStatus::Submitted
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn first_submission_starts_sweep() {
        let client =
            EventClient::new(valid_config(), Arc::new(RecordingTransport::default())).unwrap();
        assert!(!client.status().sweep_running);

        let (callback, mut rx) = channel_callback();
        client.submit("clicks", "{}", Some(callback));
        rx.recv().await.unwrap();

        assert!(client.status().sweep_running);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_reports_failed() {
        let client =
            EventClient::new(valid_config(), Arc::new(RecordingTransport::default())).unwrap();
        client.shutdown().await;
        client.shutdown().await;

        let (callback, mut rx) = channel_callback();
        client.submit("clicks", "{}", Some(callback));

        assert_eq!(rx.recv().await.unwrap().status, EventStatus::Failed);
        let status = client.status();
        assert!(status.closed);
        assert!(!status.sweep_running);
        assert_eq!(status.cached, None);
        assert!(!client.start_sweep());
    }

    #[tokio::test]
    async fn send_standard_uses_collection_name() {
        let transport = Arc::new(RecordingTransport::default());
        let client = EventClient::new(valid_config(), transport.clone()).unwrap();
        let (callback, mut rx) = channel_callback();

        client.send_standard(
            &Session {
                duration: 12.0,
                ..Session::default()
            },
            Some(callback),
        );

        let data = rx.recv().await.unwrap();
        assert_eq!(data.event.name(), "Session");
        let posts = transport.posts.lock();
        assert!(posts[0].url.path().ends_with("/events/Session"));
        assert!(posts[0].body.contains("\"duration\":12.0"));
        drop(posts);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn reconfigure_validates_new_settings() {
        let client = EventClient::new(
            ClientConfig::new("proj", ""),
            Arc::new(RecordingTransport::default()),
        )
        .unwrap();
        assert!(!client.is_validated());

        assert!(client.reconfigure(valid_config()).await);
        assert!(client.is_validated());

        assert!(!client.reconfigure(ClientConfig::new("", "key")).await);
        assert!(!client.is_validated());
    }

    #[tokio::test]
    async fn reconfigure_restarts_running_sweep() {
        let client =
            EventClient::new(valid_config(), Arc::new(RecordingTransport::default())).unwrap();
        assert!(client.start_sweep());

        let replacement = Arc::new(MemoryEventCache::new());
        assert!(
            client
                .reconfigure(ClientConfig::new("proj", "key2").with_cache(replacement))
                .await
        );
        assert!(client.status().sweep_running);
        client.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn submission_during_reconfigure_does_not_pin_old_sweep() {
        let transport = Arc::new(HangingTransport::default());
        let old_cache = Arc::new(MemoryEventCache::new());
        let mut old = ClientConfig::new("proj", "old").with_cache(old_cache);
        old.sweep_interval = Duration::from_secs(1);
        old.shutdown_grace = Duration::from_secs(1);
        let client = Arc::new(EventClient::new(old, transport.clone()).unwrap());
        client.submit("clicks", "\"hang\"", None);

        let new_cache = Arc::new(MemoryEventCache::new());
        let backlog = Event::new("clicks", r#"{"n":1}"#);
        new_cache.write(&backlog);
        let mut new = ClientConfig::new("proj", "new").with_cache(new_cache.clone());
        new.sweep_interval = Duration::from_secs(1);

        let reconfiguring = tokio::spawn({
            let client = client.clone();
            async move { client.reconfigure(new).await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.submit("clicks", "{}", None);

        assert!(reconfiguring.await.unwrap());
        let posted_before = transport.posts.lock().len();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(client.status().sweep_running);
        assert!(!new_cache.exists(&backlog));
        let posts = transport.posts.lock().clone();
        assert!(posts[posted_before..]
            .iter()
            .all(|(key, _)| key == "new"));
        assert!(posts
            .iter()
            .any(|(key, body)| key == "new" && body == r#"{"n":1}"#));
        client.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submissions_racing_shutdown_report_once() {
        const SUBMISSIONS: usize = 200;
        let mut config = valid_config();
        config.shutdown_grace = Duration::from_millis(50);
        let client =
            Arc::new(EventClient::new(config, Arc::new(HangingTransport::default())).unwrap());
        let reported = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let callback = {
            let reported = reported.clone();
            event_callback(move |data| {
                assert_ne!(data.status, EventStatus::Submitted);
                reported.fetch_add(1, Ordering::SeqCst);
            })
        };

        let submitter = tokio::task::spawn_blocking({
            let client = client.clone();
            move || {
                for _ in 0..SUBMISSIONS {
                    client.submit("clicks", "\"hang\"", Some(callback.clone()));
                }
            }
        });
        tokio::task::yield_now().await;
        client.shutdown().await;
        submitter.await.unwrap();

        assert_eq!(client.status().in_flight, 0);
        assert_eq!(reported.load(Ordering::SeqCst), SUBMISSIONS);
    }

    #[tokio::test]
    async fn shutdown_closes_cache() {
        let cache = Arc::new(MemoryEventCache::new());
        let client = EventClient::new(
            ClientConfig::new("proj", "key").with_cache(cache.clone()),
            Arc::new(RecordingTransport::default()),
        )
        .unwrap();
        assert_eq!(client.status().cached, Some(0));

        client.shutdown().await;
        assert!(!cache.ready());
    }
}
