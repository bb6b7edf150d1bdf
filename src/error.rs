//! Error types for job management

use thiserror::Error;

/// Reasons a job operation can fail
///
/// The boolean operations on [`crate::JobManager`] log these and return `false`;
/// the `try_*` variants hand them back to the caller.
#[derive(Debug, Error)]
pub enum JobError {
    #[error("failed to launch job '{name}': {source}")]
    Launch {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("job '{0}' is already running")]
    DuplicateRunning(String),

    #[error("job '{0}' not found")]
    UnknownJob(String),

    #[error("job manager has shut down")]
    ShutDown,

    #[error("failed to signal process {pid}: {message}")]
    Signal { pid: u32, message: String },
}

pub type Result<T> = std::result::Result<T, JobError>;
