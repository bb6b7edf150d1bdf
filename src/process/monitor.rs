//! Status monitor - background task that notices jobs exiting on their own

use crate::events::StatusChange;
use crate::manager::Shared;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

/// Default wait between liveness passes
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Interval to actually poll at. Zero falls back to [`DEFAULT_INTERVAL`].
pub fn effective_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        warn!(
            "monitor interval must be positive, using {}ms",
            DEFAULT_INTERVAL.as_millis()
        );
        return DEFAULT_INTERVAL;
    }
    interval
}

/// Handle to the polling task. Aborts the task when dropped.
#[derive(Debug)]
pub struct StatusMonitor {
    interval: Duration,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StatusMonitor {
    /// Spawn the polling loop on the current Tokio runtime
    pub(crate) fn spawn(shared: Arc<Shared>, interval: Duration) -> Self {
        let interval = effective_interval(interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(shared, interval, shutdown_rx));

        Self {
            interval,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Stop the loop and wait for it to finish. Safe to call more than once.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(task) = task {
            match task.await {
                Err(e) if e.is_panic() => error!("Status monitor panicked: {e}"),
                _ => debug!("Status monitor stopped"),
            }
        }
    }
}

impl Drop for StatusMonitor {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            task.abort();
        }
    }
}

async fn run(shared: Arc<Shared>, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&shared);
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}

/// One reconciliation pass. Publishes at most once, listing every job that died.
pub(crate) fn poll_once(shared: &Shared) -> Vec<String> {
    let exited = shared.registry().reap_exited();
    debug!(exited = exited.len(), "Refreshed job status");

    if !exited.is_empty() {
        shared
            .subscribers
            .publish(&StatusChange::new(exited.clone()));
    }
    exited
}
