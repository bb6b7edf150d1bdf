//! lpjobs library - run and watch the long-running jobs behind the pose dashboard

pub mod config;
pub mod error;
pub mod events;
pub mod manager;
pub mod process;

// Re-export commonly used types
pub use config::{Config, Preset, PresetManager};
pub use error::{JobError, Result};
pub use events::{StatusCallback, StatusChange, Subscribers, SubscriptionId};
pub use manager::{JobManager, ManagerSettings};
pub use process::{JobStatus, JobView, ProcessHandle, StopReason};
