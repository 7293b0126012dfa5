//! Job stage - submit one batch job and follow it through two wait phases

use crate::core::{ConditionSet, ProbeExecutor, StageResult, Verdict};
use crate::execution::waiter::{JobWaiter, WaitError, WaitSpec};
use crate::scheduler::{JobScheduler, SubmitError};
use crate::workspace::{StagingAction, StagingError};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Poll interval while waiting for a job's first artifact
pub const APPEARANCE_INTERVAL: Duration = Duration::from_secs(25);

/// Wait phase of a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum WaitPhase {
    /// The job's log has not appeared yet
    Appearance,
    /// The log exists; waiting for a success or failure marker
    Completion,
}

impl fmt::Display for WaitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitPhase::Appearance => f.write_str("appearance"),
            WaitPhase::Completion => f.write_str("completion"),
        }
    }
}

/// Errors that stop a stage before its outcome can be observed
#[derive(Debug, Error)]
pub enum StageError {
    #[error("Job submission failed: {0}")]
    Submission(#[from] SubmitError),

    #[error("Failed to stage job inputs: {0}")]
    Staging(#[from] StagingError),
}

/// Everything needed to run one stage's job
#[derive(Debug, Clone)]
pub struct StageSpec {
    pub name: String,
    /// Directory the job is submitted from and probes run in
    pub workdir: PathBuf,
    /// Job script, relative to `workdir`
    pub job_script: PathBuf,
    /// Run before submission, in order
    pub staging: Vec<StagingAction>,
    /// Phase 1: the job's first artifact exists
    pub appearance: WaitSpec,
    /// Phase 2: success or failure marker in the job's log
    pub completion: WaitSpec,
    /// Files (relative to `workdir`) that must exist after a success marker
    pub required_outputs: Vec<PathBuf>,
}

impl StageSpec {
    /// A stage whose first artifact is `artifact` (glob), polled every 25 seconds
    pub fn new(
        name: impl Into<String>,
        workdir: impl Into<PathBuf>,
        job_script: impl Into<PathBuf>,
        artifact: &str,
        completion: WaitSpec,
    ) -> Self {
        Self {
            name: name.into(),
            workdir: workdir.into(),
            job_script: job_script.into(),
            staging: Vec::new(),
            appearance: WaitSpec::new(ConditionSet::appearance(artifact), APPEARANCE_INTERVAL),
            completion,
            required_outputs: Vec::new(),
        }
    }

    pub fn with_staging(mut self, action: StagingAction) -> Self {
        self.staging.push(action);
        self
    }

    pub fn with_required_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_outputs.push(path.into());
        self
    }

    /// Deadlines for both wait phases
    pub fn with_timeouts(mut self, appearance: Option<Duration>, completion: Option<Duration>) -> Self {
        self.appearance = self.appearance.with_timeout(appearance);
        self.completion = self.completion.with_timeout(completion);
        self
    }
}

/// How a stage ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageOutcome {
    pub result: StageResult,
    /// Artifact or reason behind a failure
    pub detail: Option<String>,
    /// Phase that ended the stage, when a wait did
    pub phase: Option<WaitPhase>,
}

impl StageOutcome {
    fn success() -> Self {
        Self {
            result: StageResult::Success,
            detail: None,
            phase: Some(WaitPhase::Completion),
        }
    }

    fn failed(detail: String) -> Self {
        Self {
            result: StageResult::Failed,
            detail: Some(detail),
            phase: Some(WaitPhase::Completion),
        }
    }

    fn timed_out(phase: WaitPhase, error: WaitError) -> Self {
        Self {
            result: StageResult::TimedOut,
            detail: Some(error.to_string()),
            phase: Some(phase),
        }
    }
}

/// Submits a stage's job and determines its outcome
pub struct JobStage<'a, S: ?Sized, P: ?Sized> {
    scheduler: &'a S,
    probes: &'a P,
    debug_mode: bool,
}

impl<'a, S, P> JobStage<'a, S, P>
where
    S: JobScheduler + ?Sized,
    P: ProbeExecutor + ?Sized,
{
    pub fn new(scheduler: &'a S, probes: &'a P, debug_mode: bool) -> Self {
        Self {
            scheduler,
            probes,
            debug_mode,
        }
    }

    /// Stage inputs, submit exactly one job, then wait for its log to appear and resolve.
    ///
    /// In debug mode nothing is staged, submitted or waited on.
    pub async fn submit_and_wait(&self, spec: &StageSpec) -> Result<StageOutcome, StageError> {
        if self.debug_mode {
            info!(stage = %spec.name, "Debug mode is active, skipping job");
            return Ok(StageOutcome {
                result: StageResult::Success,
                detail: Some("debug mode".to_string()),
                phase: None,
            });
        }

        for action in &spec.staging {
            action.apply()?;
        }

        info!(stage = %spec.name, "Submitting {}", spec.job_script.display());
        self.scheduler.submit(&spec.job_script, &spec.workdir).await?;

        let appearance = JobWaiter::new(
            format!("{} {}", spec.name, WaitPhase::Appearance),
            self.probes,
            &spec.workdir,
        );
        if let Err(e) = appearance.wait(&spec.appearance).await {
            return Ok(StageOutcome::timed_out(WaitPhase::Appearance, e));
        }
        info!(stage = %spec.name, "Job output found, waiting for completion");

        let completion = JobWaiter::new(
            format!("{} {}", spec.name, WaitPhase::Completion),
            self.probes,
            &spec.workdir,
        );
        let resolution = match completion.wait(&spec.completion).await {
            Ok(resolution) => resolution,
            Err(e) => return Ok(StageOutcome::timed_out(WaitPhase::Completion, e)),
        };

        match resolution.verdict {
            Verdict::Failure => {
                let artifact = spec
                    .completion
                    .conditions
                    .get(resolution.condition_index)
                    .map(|c| c.probe().artifact())
                    .unwrap_or_default();
                warn!(
                    stage = %spec.name,
                    "Failure marker in {}: {}",
                    artifact,
                    resolution.output.trim()
                );
                Ok(StageOutcome::failed(artifact))
            }
            Verdict::Success => {
                if let Some(missing) = first_missing(&spec.workdir, &spec.required_outputs) {
                    warn!(stage = %spec.name, "Expected output {} is missing", missing.display());
                    return Ok(StageOutcome::failed(missing.display().to_string()));
                }
                info!(stage = %spec.name, "Job completed successfully");
                Ok(StageOutcome::success())
            }
        }
    }
}

fn first_missing<'p>(workdir: &Path, required: &'p [PathBuf]) -> Option<&'p PathBuf> {
    required.iter().find(|path| !workdir.join(path).exists())
}
