//! Job manager - the entry point the CLI and dashboard use to run jobs

use crate::config::Preset;
use crate::error::{JobError, Result};
use crate::events::{StatusCallback, StatusChange, Subscribers, SubscriptionId};
use crate::process::monitor::{self, StatusMonitor, DEFAULT_INTERVAL};
use crate::process::{JobRegistry, JobView};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{error, info, warn};

/// Runtime knobs for a [`JobManager`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagerSettings {
    /// Wait between status monitor passes
    pub interval: Duration,
    /// Terminate Running jobs in [`JobManager::shutdown`]
    pub terminate_on_shutdown: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            terminate_on_shutdown: true,
        }
    }
}

/// State shared between the manager and its monitor task
#[derive(Debug, Default)]
pub(crate) struct Shared {
    registry: Mutex<JobRegistry>,
    pub(crate) subscribers: Subscribers,
}

impl Shared {
    pub(crate) fn registry(&self) -> MutexGuard<'_, JobRegistry> {
        // Registry methods never panic halfway through a mutation
        self.registry.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Starts, stops, and tracks named jobs, and tells subscribers when any of them change
///
/// Construct one per application inside a Tokio runtime and share it (usually
/// behind an `Arc`). Call [`JobManager::shutdown`] before exiting so jobs are not
/// left orphaned.
#[derive(Debug)]
pub struct JobManager {
    shared: Arc<Shared>,
    monitor: StatusMonitor,
    settings: ManagerSettings,
    closed: AtomicBool,
}

impl JobManager {
    /// Create a manager and start its status monitor. Requires a Tokio runtime.
    ///
    /// A zero interval is replaced by [`DEFAULT_INTERVAL`].
    pub fn new(mut settings: ManagerSettings) -> Self {
        let shared = Arc::new(Shared::default());
        let monitor = StatusMonitor::spawn(shared.clone(), settings.interval);
        settings.interval = monitor.interval();

        Self {
            shared,
            monitor,
            settings,
            closed: AtomicBool::new(false),
        }
    }

    pub fn settings(&self) -> ManagerSettings {
        self.settings
    }

    /// Whether the background monitor is still polling
    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Start `command` under `name`. Returns false if a job of that name is running,
    /// the command could not be launched, or the manager has shut down.
    pub fn start_job(&self, name: &str, command: &str) -> bool {
        self.start_job_in(name, command, None)
    }

    /// Like [`JobManager::start_job`], running the command in `cwd`
    pub fn start_job_in(&self, name: &str, command: &str, cwd: Option<&Path>) -> bool {
        report(name, "start", self.try_start_job(name, command, cwd))
    }

    pub fn try_start_job(&self, name: &str, command: &str, cwd: Option<&Path>) -> Result<JobView> {
        self.ensure_open()?;
        let view = self.shared.registry().start(name, command, cwd)?;
        self.notify(name);
        Ok(view)
    }

    /// Start a configured preset under its own name
    pub fn start_preset(&self, preset: &Preset) -> bool {
        let cwd = preset.cwd.as_deref().map(Path::new);
        self.start_job_in(&preset.name, &preset.command, cwd)
    }

    /// Start a stopped job again with the command it last ran
    pub fn restart_job(&self, name: &str) -> bool {
        let result = self
            .ensure_open()
            .and_then(|()| self.shared.registry().restart(name));
        if result.is_ok() {
            self.notify(name);
        }
        report(name, "restart", result)
    }

    /// Terminate a job. Returns false only if no job has that name.
    pub fn stop_job(&self, name: &str) -> bool {
        report(name, "stop", self.try_stop_job(name))
    }

    pub fn try_stop_job(&self, name: &str) -> Result<JobView> {
        let view = self.shared.registry().stop(name)?;
        self.notify(name);
        Ok(view)
    }

    pub fn get_jobs(&self) -> BTreeMap<String, JobView> {
        self.shared.registry().get_all()
    }

    pub fn get_job(&self, name: &str) -> Option<JobView> {
        self.shared.registry().get(name)
    }

    pub fn is_job_running(&self, name: &str) -> bool {
        self.shared.registry().is_running(name)
    }

    pub fn running_count(&self) -> usize {
        self.shared.registry().running_count()
    }

    /// Subscribe to status changes. The same `Arc` registered twice is called once.
    pub fn register_status_change_callback(&self, callback: StatusCallback) -> SubscriptionId {
        self.shared.subscribers.subscribe(callback)
    }

    pub fn unregister_status_change_callback(&self, id: SubscriptionId) -> bool {
        self.shared.subscribers.unsubscribe(id)
    }

    /// Convenience wrapper for closures that don't need identity-based dedup
    pub fn on_status_change<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StatusChange) + Send + Sync + 'static,
    {
        self.register_status_change_callback(Arc::new(callback))
    }

    /// Run one monitor pass now instead of waiting for the next tick
    pub fn refresh(&self) -> Vec<String> {
        monitor::poll_once(&self.shared)
    }

    /// Whether [`JobManager::shutdown`] has been called
    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop the monitor and, if configured, terminate every Running job
    ///
    /// Nothing can be started afterwards; stop and query operations keep working.
    pub async fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.monitor.shutdown().await;

        if !self.settings.terminate_on_shutdown {
            return;
        }

        let stopped = self.shared.registry().stop_all();
        if !stopped.is_empty() {
            info!(count = stopped.len(), "Terminated running jobs on shutdown");
            self.shared.subscribers.publish(&StatusChange::new(stopped));
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_shut_down() {
            return Err(JobError::ShutDown);
        }
        Ok(())
    }

    fn notify(&self, name: &str) {
        self.shared.subscribers.publish(&StatusChange::single(name));
    }
}

/// Log a failed operation and collapse the result to a bool
fn report(name: &str, action: &str, result: Result<JobView>) -> bool {
    match result {
        Ok(_) => true,
        Err(e @ JobError::DuplicateRunning(_))
        | Err(e @ JobError::UnknownJob(_))
        | Err(e @ JobError::ShutDown) => {
            warn!(job = name, action, "{e}");
            false
        }
        Err(e) => {
            error!(job = name, action, "{e}");
            false
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast() -> ManagerSettings {
        ManagerSettings {
            interval: Duration::from_millis(100),
            terminate_on_shutdown: true,
        }
    }

    #[tokio::test]
    async fn test_start_and_stop_notify_before_returning() {
        let manager = JobManager::new(fast());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        manager.on_status_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(manager.start_job("tb", "sleep 5"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(manager.stop_job("tb"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_operations_do_not_notify() {
        let manager = JobManager::new(fast());
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        manager.on_status_change(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!manager.stop_job("nonexistent"));
        assert!(!manager.restart_job("nonexistent"));
        assert!(!manager.start_job_in("bad", "true", Some(Path::new("/definitely/not/here"))));
        assert_eq!(count.load(Ordering::SeqCst), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_refresh_reaps_without_waiting_for_tick() {
        let manager = JobManager::new(ManagerSettings {
            interval: Duration::from_secs(3600),
            terminate_on_shutdown: true,
        });
        // Let the immediate first tick pass before the job exists
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.start_job("x", "exit 0"));
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(manager.refresh(), vec!["x".to_string()]);
        assert_eq!(manager.running_count(), 0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_zero_interval_falls_back_to_default() {
        let manager = JobManager::new(ManagerSettings {
            interval: Duration::ZERO,
            terminate_on_shutdown: true,
        });
        assert_eq!(manager.settings().interval, DEFAULT_INTERVAL);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_monitoring());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn test_no_starts_after_shutdown() {
        let manager = JobManager::new(fast());
        assert!(manager.start_job("tb", "sleep 5"));
        manager.shutdown().await;
        assert!(manager.is_shut_down());

        assert!(!manager.start_job("other", "sleep 5"));
        assert!(!manager.restart_job("tb"));
        assert!(matches!(
            manager.try_start_job("other", "sleep 5", None),
            Err(JobError::ShutDown)
        ));
        assert!(manager.get_job("other").is_none());
        assert_eq!(manager.running_count(), 0);

        // Queries and stops still answer
        assert!(manager.stop_job("tb"));
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_harmless() {
        let manager = JobManager::new(fast());
        assert!(manager.is_monitoring());
        manager.shutdown().await;
        manager.shutdown().await;
        assert!(!manager.is_monitoring());
    }
}
