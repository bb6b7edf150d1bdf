//! Job registry - tracks named jobs and the processes behind them

use super::handle::ProcessHandle;
use crate::error::{JobError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Running,
    Stopped,
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Running => f.write_str("Running"),
            JobStatus::Stopped => f.write_str("Stopped"),
        }
    }
}

/// Why a job last became Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Stopped through the manager
    Requested,
    /// The process exited on its own
    Exited,
}

/// Owned snapshot of a job, safe to hand out to consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobView {
    pub name: String,
    pub command: String,
    pub cwd: Option<PathBuf>,
    pub status: JobStatus,
    pub process_id: Option<u32>,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
}

impl JobView {
    pub fn is_running(&self) -> bool {
        self.status == JobStatus::Running
    }
}

/// A job owned by the registry. The handle is present iff the job is Running.
#[derive(Debug)]
struct Job {
    name: String,
    command: String,
    cwd: Option<PathBuf>,
    handle: Option<ProcessHandle>,
    run_id: Uuid,
    started_at: DateTime<Utc>,
    stopped_at: Option<DateTime<Utc>>,
    stop_reason: Option<StopReason>,
}

impl Job {
    fn launch(name: &str, command: &str, cwd: Option<&Path>) -> Result<Self> {
        let handle = ProcessHandle::spawn_in(command, cwd).map_err(|source| JobError::Launch {
            name: name.to_string(),
            source,
        })?;

        Ok(Self {
            name: name.to_string(),
            command: command.to_string(),
            cwd: cwd.map(Path::to_path_buf),
            handle: Some(handle),
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            stopped_at: None,
            stop_reason: None,
        })
    }

    fn status(&self) -> JobStatus {
        if self.handle.is_some() {
            JobStatus::Running
        } else {
            JobStatus::Stopped
        }
    }

    /// Running according to the registry and the OS agrees
    fn is_alive(&mut self) -> bool {
        self.handle.as_mut().map(|h| h.is_alive()).unwrap_or(false)
    }

    /// Detach the handle and record why. The caller decides whether to signal it first.
    fn mark_stopped(&mut self, reason: StopReason) -> Option<ProcessHandle> {
        let handle = self.handle.take();
        if handle.is_some() {
            self.stopped_at = Some(Utc::now());
            self.stop_reason = Some(reason);
        }
        handle
    }

    fn view(&self) -> JobView {
        JobView {
            name: self.name.clone(),
            command: self.command.clone(),
            cwd: self.cwd.clone(),
            status: self.status(),
            process_id: self.handle.as_ref().map(ProcessHandle::pid),
            run_id: self.run_id,
            started_at: self.started_at,
            stopped_at: self.stopped_at,
            stop_reason: self.stop_reason,
        }
    }
}

/// In-memory map of job name to job
#[derive(Debug, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<String, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launch `command` under `name`
    ///
    /// A name whose previous run has stopped is reused; the old entry is replaced.
    pub fn start(&mut self, name: &str, command: &str, cwd: Option<&Path>) -> Result<JobView> {
        if let Some(existing) = self.jobs.get_mut(name) {
            if existing.is_alive() {
                return Err(JobError::DuplicateRunning(name.to_string()));
            }
        }

        let job = Job::launch(name, command, cwd)?;
        let view = job.view();
        info!(
            job = name,
            pid = view.process_id,
            run_id = %view.run_id,
            "Started job"
        );
        self.jobs.insert(name.to_string(), job);
        Ok(view)
    }

    /// Start a stopped job again with its stored command and working directory
    pub fn restart(&mut self, name: &str) -> Result<JobView> {
        let (command, cwd) = match self.jobs.get(name) {
            Some(job) => (job.command.clone(), job.cwd.clone()),
            None => return Err(JobError::UnknownJob(name.to_string())),
        };
        self.start(name, &command, cwd.as_deref())
    }

    /// Terminate the job's process and mark it Stopped without waiting for exit
    pub fn stop(&mut self, name: &str) -> Result<JobView> {
        let job = self
            .jobs
            .get_mut(name)
            .ok_or_else(|| JobError::UnknownJob(name.to_string()))?;

        if let Some(mut handle) = job.mark_stopped(StopReason::Requested) {
            if let Err(e) = handle.terminate() {
                warn!(job = name, error = %e, "Terminate failed");
            }
            info!(job = name, pid = handle.pid(), "Stopped job");
        }

        Ok(job.view())
    }

    /// Terminate every Running job. Returns the names that were running.
    pub fn stop_all(&mut self) -> Vec<String> {
        let mut stopped = Vec::new();
        for (name, job) in self.jobs.iter_mut() {
            if let Some(mut handle) = job.mark_stopped(StopReason::Requested) {
                if let Err(e) = handle.terminate() {
                    warn!(job = %name, error = %e, "Terminate failed");
                }
                stopped.push(name.clone());
            }
        }
        stopped
    }

    /// Mark every Running job whose process has exited as Stopped
    ///
    /// Returns the names of jobs that changed.
    pub fn reap_exited(&mut self) -> Vec<String> {
        let mut exited = Vec::new();
        for (name, job) in self.jobs.iter_mut() {
            if job.handle.is_some() && !job.is_alive() {
                if let Some(handle) = job.mark_stopped(StopReason::Exited) {
                    info!(job = %name, pid = handle.pid(), "Job exited");
                }
                exited.push(name.clone());
            }
        }
        exited
    }

    pub fn get(&self, name: &str) -> Option<JobView> {
        self.jobs.get(name).map(Job::view)
    }

    pub fn get_all(&self) -> BTreeMap<String, JobView> {
        self.jobs
            .iter()
            .map(|(name, job)| (name.clone(), job.view()))
            .collect()
    }

    /// Whether the job exists, is marked Running, and its process is still alive
    pub fn is_running(&mut self, name: &str) -> bool {
        self.jobs
            .get_mut(name)
            .map(|job| job.is_alive())
            .unwrap_or(false)
    }

    pub fn running_count(&self) -> usize {
        self.jobs.values().filter(|j| j.handle.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(200)).await;
    }

    #[tokio::test]
    async fn test_start_records_running_job() {
        let mut registry = JobRegistry::new();
        let view = registry.start("tb", "sleep 5", None).unwrap();

        assert_eq!(view.status, JobStatus::Running);
        assert!(view.process_id.is_some());
        assert!(registry.is_running("tb"));
        assert_eq!(registry.running_count(), 1);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_duplicate_start_keeps_first_process() {
        let mut registry = JobRegistry::new();
        let first = registry.start("tb", "sleep 5", None).unwrap();

        let err = registry.start("tb", "sleep 5", None).unwrap_err();
        assert!(matches!(err, JobError::DuplicateRunning(ref n) if n == "tb"));
        assert_eq!(registry.get("tb").unwrap().process_id, first.process_id);
        assert_eq!(registry.get("tb").unwrap().run_id, first.run_id);

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_stop_clears_process_id() {
        let mut registry = JobRegistry::new();
        registry.start("tb", "sleep 5", None).unwrap();

        let view = registry.stop("tb").unwrap();
        assert_eq!(view.status, JobStatus::Stopped);
        assert_eq!(view.process_id, None);
        assert_eq!(view.stop_reason, Some(StopReason::Requested));
        assert!(view.stopped_at.is_some());
        assert!(!registry.is_running("tb"));

        // Second stop leaves it Stopped
        let again = registry.stop("tb").unwrap();
        assert_eq!(again.status, JobStatus::Stopped);
        assert_eq!(again.stopped_at, view.stopped_at);
    }

    #[test]
    fn test_stop_unknown_job() {
        let mut registry = JobRegistry::new();
        let err = registry.stop("nonexistent").unwrap_err();
        assert!(matches!(err, JobError::UnknownJob(_)));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reap_exited_marks_dead_jobs() {
        let mut registry = JobRegistry::new();
        registry.start("quick-a", "exit 0", None).unwrap();
        registry.start("quick-b", "exit 3", None).unwrap();
        registry.start("slow", "sleep 5", None).unwrap();
        settle().await;

        let exited = registry.reap_exited();
        assert_eq!(exited, vec!["quick-a".to_string(), "quick-b".to_string()]);

        let quick = registry.get("quick-a").unwrap();
        assert_eq!(quick.status, JobStatus::Stopped);
        assert_eq!(quick.process_id, None);
        assert_eq!(quick.stop_reason, Some(StopReason::Exited));
        assert!(registry.get("slow").unwrap().is_running());

        // Nothing new on the next pass
        assert!(registry.reap_exited().is_empty());

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_restart_reuses_command_with_new_run() {
        let mut registry = JobRegistry::new();
        let first = registry.start("tb", "sleep 5", None).unwrap();
        registry.stop("tb").unwrap();

        let second = registry.restart("tb").unwrap();
        assert_eq!(second.command, "sleep 5");
        assert!(second.is_running());
        assert_ne!(second.run_id, first.run_id);

        assert!(matches!(
            registry.restart("tb"),
            Err(JobError::DuplicateRunning(_))
        ));
        assert!(matches!(
            registry.restart("missing"),
            Err(JobError::UnknownJob(_))
        ));

        registry.stop_all();
    }

    #[tokio::test]
    async fn test_launch_failure_leaves_registry_untouched() {
        let mut registry = JobRegistry::new();
        let err = registry
            .start("bad", "true", Some(Path::new("/definitely/not/here")))
            .unwrap_err();
        assert!(matches!(err, JobError::Launch { .. }));
        assert!(registry.get("bad").is_none());
    }

    #[tokio::test]
    async fn test_get_all_is_a_snapshot() {
        let mut registry = JobRegistry::new();
        registry.start("b", "sleep 5", None).unwrap();
        registry.start("a", "sleep 5", None).unwrap();

        let mut snapshot = registry.get_all();
        let names: Vec<_> = snapshot.keys().cloned().collect();
        assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

        snapshot.get_mut("a").unwrap().status = JobStatus::Stopped;
        assert!(registry.get("a").unwrap().is_running());

        assert_eq!(registry.stop_all().len(), 2);
        assert_eq!(registry.running_count(), 0);
    }
}
