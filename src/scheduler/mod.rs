//! Batch scheduler submission

pub mod qsub;

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use qsub::QsubScheduler;

/// Error types for job submission
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("Failed to run '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Scheduler rejected {} (exit code {code}): {stderr}", .script.display())]
    Rejected {
        script: PathBuf,
        code: i32,
        stderr: String,
    },

    #[error("Submission of {} timed out after {secs} seconds", .script.display())]
    Timeout { script: PathBuf, secs: u64 },
}

/// Trait for job submission - allows for different schedulers and test doubles.
///
/// Submission is fire-and-forget: the job's progress is only ever observed
/// through the files it writes.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Submit `script` from `workdir`
    async fn submit(&self, script: &Path, workdir: &Path) -> Result<(), SubmitError>;
}
