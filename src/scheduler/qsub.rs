//! PBS/Torque `qsub` subprocess scheduler

use crate::scheduler::{JobScheduler, SubmitError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Submits job scripts by running `qsub <script>` in the job's directory
#[derive(Debug, Clone)]
pub struct QsubScheduler {
    /// Path to the qsub executable
    qsub_path: String,

    /// Timeout for the submission command in seconds
    timeout_secs: u64,
}

impl Default for QsubScheduler {
    fn default() -> Self {
        Self {
            qsub_path: "qsub".to_string(),
            timeout_secs: 120,
        }
    }
}

impl QsubScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_path(mut self, qsub_path: impl Into<String>) -> Self {
        self.qsub_path = qsub_path.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn qsub_path(&self) -> &str {
        &self.qsub_path
    }
}

#[async_trait]
impl JobScheduler for QsubScheduler {
    async fn submit(&self, script: &Path, workdir: &Path) -> Result<(), SubmitError> {
        debug!(
            "Running {} {} in {}",
            self.qsub_path,
            script.display(),
            workdir.display()
        );

        let output = timeout(
            Duration::from_secs(self.timeout_secs),
            Command::new(&self.qsub_path)
                .arg(script)
                .current_dir(workdir)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| SubmitError::Timeout {
            script: script.to_path_buf(),
            secs: self.timeout_secs,
        })?
        .map_err(|source| SubmitError::Spawn {
            command: self.qsub_path.clone(),
            source,
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output.status.code().unwrap_or(-1);
            warn!("{} exited with code {}: {}", self.qsub_path, code, stderr);
            return Err(SubmitError::Rejected {
                script: script.to_path_buf(),
                code,
                stderr,
            });
        }

        // The job id is not tracked; progress is read from the job's log files
        let stdout = String::from_utf8_lossy(&output.stdout);
        info!("Submitted {} ({})", script.display(), stdout.trim());
        Ok(())
    }
}
