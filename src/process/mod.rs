//! Process management for named background jobs

pub mod handle;
pub mod monitor;
pub mod registry;

pub use handle::ProcessHandle;
pub use monitor::{StatusMonitor, DEFAULT_INTERVAL};
pub use registry::{JobRegistry, JobStatus, JobView, StopReason};
