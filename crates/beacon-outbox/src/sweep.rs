//! Periodic resubmission of cached events.

use crate::{event_callback, CallbackData, Dispatcher, EventCallback, EventStatus, Origin};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

struct RunningSweep {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Drives cache sweeps on a fixed period.
///
/// Idle until [`start`](SweepScheduler::start), then Running until
/// [`stop`](SweepScheduler::stop). Each sweep reads a random batch of
/// eligible cached events, resubmits them through the dispatcher, and waits
/// for every one of them to reach a terminal status before the next period
/// can begin. A sweep that overruns its period delays the next one rather
/// than overlapping it. After [`halt`](SweepScheduler::halt) it never starts
/// again.
pub struct SweepScheduler {
    runtime: Handle,
    running: Mutex<Option<RunningSweep>>,
    halted: AtomicBool,
}

impl SweepScheduler {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            running: Mutex::new(None),
            halted: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Start sweeping for `dispatcher`. The first sweep runs immediately.
    ///
    /// Sweep results are also forwarded to `on_result`. Returns `false` when
    /// already running, halted, or when the dispatcher has no ready cache.
    pub fn start(&self, dispatcher: Arc<Dispatcher>, on_result: Option<EventCallback>) -> bool {
        let mut running = self.running.lock();
        if running.is_some() || self.halted.load(Ordering::SeqCst) {
            return false;
        }
        if !dispatcher.cache().is_some_and(|cache| cache.ready()) {
            debug!("No ready cache; sweep stays idle");
            return false;
        }

        info!(
            interval = ?dispatcher.config().sweep_interval,
            batch_size = dispatcher.config().sweep_batch_size,
            max_attempts = dispatcher.config().max_attempts,
            "Starting cache sweep"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = self
            .runtime
            .spawn(run_sweeps(dispatcher, stop_rx, on_result));
        *running = Some(RunningSweep { stop_tx, task });
        true
    }

    /// Stop sweeping and wait for the sweep task to exit.
    ///
    /// Resubmissions already dispatched stay in flight. Returns whether a
    /// sweep was running.
    pub async fn stop(&self) -> bool {
        let running = self.running.lock().take();
        let Some(sweep) = running else {
            return false;
        };
        let _ = sweep.stop_tx.send(true);
        if let Err(e) = sweep.task.await {
            warn!(error = %e, "Sweep task ended abnormally");
        }
        info!("Cache sweep stopped");
        true
    }

    /// Stop for good: later calls to [`start`](Self::start) are refused.
    pub async fn halt(&self) -> bool {
        {
            let _running = self.running.lock();
            self.halted.store(true, Ordering::SeqCst);
        }
        self.stop().await
    }
}

impl Drop for SweepScheduler {
    fn drop(&mut self) {
        if let Some(sweep) = self.running.get_mut().take() {
            sweep.task.abort();
        }
    }
}

async fn run_sweeps(
    dispatcher: Arc<Dispatcher>,
    mut stop_rx: watch::Receiver<bool>,
    on_result: Option<EventCallback>,
) {
    let config = dispatcher.config();
    let mut ticker = interval(config.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            _ = ticker.tick() => {}
        }

        let Some(cache) = dispatcher.cache().filter(|cache| cache.ready()).cloned() else {
            debug!("Cache not ready; skipping sweep");
            continue;
        };

        let (batch_size, max_attempts) = (config.sweep_batch_size, config.max_attempts);
        let batch = match tokio::task::spawn_blocking(move || cache.read(batch_size, max_attempts))
            .await
        {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Cache read task failed; skipping sweep");
                continue;
            }
        };
        if batch.is_empty() {
            continue;
        }
        debug!(events = batch.len(), "Resubmitting cached events");

        // Every callback holds a sender; the channel closes once all of
        // them have reported and been dropped.
        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<()>();
        for event in batch {
            let callback = sweep_callback(done_tx.clone(), on_result.clone());
            dispatcher.submit(event, Some(callback), Origin::FromCache);
        }
        drop(done_tx);

        loop {
            tokio::select! {
                biased;
                _ = stop_rx.changed() => return,
                received = done_rx.recv() => {
                    if received.is_none() {
                        break;
                    }
                }
            }
        }
    }
}

fn sweep_callback(
    done_tx: mpsc::UnboundedSender<()>,
    on_result: Option<EventCallback>,
) -> EventCallback {
    event_callback(move |data: CallbackData| {
        match data.status {
            EventStatus::Submitted => {
                info!(event_name = %data.event.name(), "Cached event delivered")
            }
            _ => debug!(
                event_name = %data.event.name(),
                status = ?data.status,
                "Cached event still undelivered"
            ),
        }
        if let Some(on_result) = &on_result {
            on_result(data);
        }
        let _ = done_tx.send(());
    })
}
