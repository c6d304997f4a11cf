//! Tracking of submissions awaiting a network result.
//!
//! Every dispatched event is registered here before its task is spawned and
//! removed exactly once: either by its task when the network result arrives,
//! or by [`InFlightTracker::flush_into`] at shutdown. Whoever removes the entry
//! owns the callback, so a submission is never reported twice.

use crate::callback::notify;
use crate::{EventCallback, EventStatus};
use beacon_event_cache::{Event, EventCache};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Identifier of one in-flight submission.
pub type RequestId = Uuid;

/// Where a submission came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Submitted by the host.
    Live,
    /// Resubmitted by a cache sweep.
    FromCache,
}

/// A submission whose network result has not been reconciled yet.
pub struct InFlightRequest {
    pub id: RequestId,
    pub event: Event,
    pub origin: Origin,
    pub callback: Option<EventCallback>,
    pub started_at: DateTime<Utc>,
    abort: Option<AbortHandle>,
}

/// Outcome of flushing in-flight submissions to the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Written to the cache.
    pub flushed: usize,
    /// Sweep resubmissions whose entry was still cached.
    pub already_cached: usize,
    /// Could not be cached.
    pub lost: usize,
}

impl FlushReport {
    pub fn total(&self) -> usize {
        self.flushed + self.already_cached + self.lost
    }
}

/// Registry of in-flight submissions plus a count of live submission tasks.
pub struct InFlightTracker {
    requests: Mutex<HashMap<RequestId, InFlightRequest>>,
    active_tasks: Arc<watch::Sender<usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (active_tasks, _) = watch::channel(0);
        Self {
            requests: Mutex::new(HashMap::new()),
            active_tasks: Arc::new(active_tasks),
        }
    }

    /// Record a submission about to be dispatched.
    pub fn register(
        &self,
        event: Event,
        origin: Origin,
        callback: Option<EventCallback>,
    ) -> RequestId {
        let id = Uuid::new_v4();
        let request = InFlightRequest {
            id,
            event,
            origin,
            callback,
            started_at: Utc::now(),
            abort: None,
        };
        self.requests.lock().insert(id, request);
        id
    }

    /// Attach the abort handle of the task sending `id`.
    ///
    /// No-op when the entry is already gone.
    pub(crate) fn attach(&self, id: RequestId, abort: AbortHandle) {
        if let Some(request) = self.requests.lock().get_mut(&id) {
            request.abort = Some(abort);
        }
    }

    /// Remove an entry. `None` means someone else already took it.
    pub fn complete(&self, id: RequestId) -> Option<InFlightRequest> {
        self.requests.lock().remove(&id)
    }

    pub fn contains(&self, id: RequestId) -> bool {
        self.requests.lock().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    /// Remove every entry and abort their tasks.
    pub fn drain(&self) -> Vec<InFlightRequest> {
        let drained: Vec<InFlightRequest> =
            self.requests.lock().drain().map(|(_, request)| request).collect();
        for request in &drained {
            if let Some(abort) = &request.abort {
                abort.abort();
            }
        }
        drained
    }

    /// Drain every entry into the cache and report each one.
    ///
    /// Sweep resubmissions whose entry is still cached are not written again,
    /// so a flush never bumps an attempts counter. Without a ready cache every
    /// drained event is lost.
    pub fn flush_into(&self, cache: Option<&dyn EventCache>) -> FlushReport {
        let mut report = FlushReport::default();
        let cache = cache.filter(|cache| cache.ready());

        for request in self.drain() {
            let status = match cache {
                Some(cache) if request.origin == Origin::FromCache && cache.exists(&request.event) => {
                    report.already_cached += 1;
                    EventStatus::Cached
                }
                Some(cache) if cache.write(&request.event) => {
                    report.flushed += 1;
                    EventStatus::Cached
                }
                _ => {
                    error!(
                        request_id = %request.id,
                        event_name = %request.event.name(),
                        "In-flight event lost: cache unavailable"
                    );
                    report.lost += 1;
                    EventStatus::Failed
                }
            };
            debug!(
                request_id = %request.id,
                origin = ?request.origin,
                status = ?status,
                "Flushed in-flight event"
            );
            notify(request.callback.as_ref(), status, request.event);
        }

        if report.total() > 0 {
            info!(
                flushed = report.flushed,
                already_cached = report.already_cached,
                lost = report.lost,
                "In-flight events flushed"
            );
        }
        report
    }

    /// Count a submission task as running until the guard drops.
    pub(crate) fn task_guard(&self) -> TaskGuard {
        self.active_tasks.send_modify(|n| *n += 1);
        TaskGuard {
            active_tasks: self.active_tasks.clone(),
        }
    }

    /// Number of submission tasks that have not exited.
    pub fn active_tasks(&self) -> usize {
        *self.active_tasks.borrow()
    }

    /// Wait until no submission task is running. Returns `false` on timeout.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.active_tasks.subscribe();
        let idle = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|n| *n == 0)).await,
            Ok(Ok(_))
        );
        idle
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the active task count on drop, including when the task is
/// aborted.
pub(crate) struct TaskGuard {
    active_tasks: Arc<watch::Sender<usize>>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active_tasks.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{event_callback, CallbackData};
    use beacon_event_cache::MemoryEventCache;

    fn recording_callback() -> (EventCallback, Arc<Mutex<Vec<CallbackData>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (event_callback(move |data| sink.lock().push(data)), seen)
    }

    #[test]
    fn complete_removes_once() {
        let tracker = InFlightTracker::new();
        let id = tracker.register(Event::new("clicks", "{}"), Origin::Live, None);

        assert!(tracker.contains(id));
        assert_eq!(tracker.len(), 1);
        assert!(tracker.complete(id).is_some());
        assert!(tracker.complete(id).is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn attach_after_complete_is_ignored() {
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let tracker = InFlightTracker::new();
        let id = tracker.register(Event::new("clicks", "{}"), Origin::Live, None);
        tracker.complete(id);

        let handle = rt.spawn(async {});
        tracker.attach(id, handle.abort_handle());
        assert!(tracker.is_empty());
    }

    #[test]
    fn flush_writes_live_events() {
        let tracker = InFlightTracker::new();
        let cache = MemoryEventCache::new();
        let (callback, seen) = recording_callback();
        let event = Event::new("clicks", "{}");
        tracker.register(event.clone(), Origin::Live, Some(callback));

        let report = tracker.flush_into(Some(&cache));

        assert_eq!(report.flushed, 1);
        assert!(tracker.is_empty());
        assert_eq!(cache.attempts(&event), Some(1));
        assert_eq!(seen.lock()[0].status, EventStatus::Cached);
    }

    #[test]
    fn flush_does_not_bump_cached_resubmissions() {
        let tracker = InFlightTracker::new();
        let cache = MemoryEventCache::new();
        let event = Event::new("clicks", "{}");
        cache.write(&event);
        tracker.register(event.clone(), Origin::FromCache, None);

        let report = tracker.flush_into(Some(&cache));

        assert_eq!(report.already_cached, 1);
        assert_eq!(cache.attempts(&event), Some(1));
    }

    #[test]
    fn flush_rewrites_resubmission_removed_meanwhile() {
        let tracker = InFlightTracker::new();
        let cache = MemoryEventCache::new();
        let event = Event::new("clicks", "{}");
        tracker.register(event.clone(), Origin::FromCache, None);

        let report = tracker.flush_into(Some(&cache));

        assert_eq!(report.flushed, 1);
        assert!(cache.exists(&event));
    }

    #[test]
    fn flush_without_cache_loses_events() {
        let tracker = InFlightTracker::new();
        let (callback, seen) = recording_callback();
        tracker.register(Event::new("clicks", "{}"), Origin::Live, Some(callback.clone()));
        tracker.register(Event::new("clicks", "[]"), Origin::Live, Some(callback));

        let report = tracker.flush_into(None);

        assert_eq!(report.lost, 2);
        assert!(seen.lock().iter().all(|d| d.status == EventStatus::Failed));
    }

    #[test]
    fn flush_into_closed_cache_loses_events() {
        let tracker = InFlightTracker::new();
        let cache = MemoryEventCache::new();
        cache.close();
        tracker.register(Event::new("clicks", "{}"), Origin::Live, None);

        assert_eq!(tracker.flush_into(Some(&cache)).lost, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_idle_tracks_task_guards() {
        let tracker = InFlightTracker::new();
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);

        let guard = tracker.task_guard();
        assert_eq!(tracker.active_tasks(), 1);
        assert!(!tracker.wait_idle(Duration::from_millis(10)).await);

        drop(guard);
        assert_eq!(tracker.active_tasks(), 0);
        assert!(tracker.wait_idle(Duration::from_millis(10)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn drain_aborts_tasks() {
        let tracker = Arc::new(InFlightTracker::new());
        let id = tracker.register(Event::new("clicks", "{}"), Origin::Live, None);
        let guard = tracker.task_guard();
        let handle = tokio::spawn(async move {
            let _guard = guard;
            std::future::pending::<()>().await;
        });
        tracker.attach(id, handle.abort_handle());

        assert_eq!(tracker.drain().len(), 1);
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(tracker.active_tasks(), 0);
    }
}
