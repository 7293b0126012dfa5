//! Pipeline controller - runs the stage sequence, applies gates and decides fatality

use crate::core::{
    ConfigError, ControllerState, ExecutionStatus, FailurePolicy, PipelineState, ProbeExecutor,
    StageRecord, StageResult,
};
use crate::execution::stage::{JobStage, StageError, StageOutcome, StageSpec, WaitPhase};
use crate::execution::workflow::PreparationError;
use crate::scheduler::{JobScheduler, SubmitError};
use crate::workspace::{Cleaner, CleanupProfile, StagingError};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Fatal run errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage {stage} failed: failure marker found in {artifact}")]
    ProbeFailureMatch { stage: String, artifact: String },

    #[error("Stage {stage} timed out in the {phase} wait")]
    WaitTimeout { stage: String, phase: WaitPhase },

    #[error("Configuration error: {0}")]
    ConfigurationMissing(#[from] ConfigError),

    #[error("Stage {stage} could not be submitted: {source}")]
    SubmissionFailure {
        stage: String,
        #[source]
        source: SubmitError,
    },

    #[error("Stage {stage} could not stage its inputs: {source}")]
    Staging {
        stage: String,
        #[source]
        source: StagingError,
    },

    #[error("Run preparation failed: {0}")]
    Preparation(#[from] PreparationError),
}

impl PipelineError {
    /// Stage the error belongs to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::ProbeFailureMatch { stage, .. }
            | PipelineError::WaitTimeout { stage, .. }
            | PipelineError::SubmissionFailure { stage, .. }
            | PipelineError::Staging { stage, .. } => Some(stage),
            _ => None,
        }
    }
}

/// Events that can occur during a run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        run_name: String,
        total_stages: usize,
    },
    StageStarted {
        stage: String,
        index: usize,
    },
    StageSkipped {
        stage: String,
        reason: String,
    },
    StageCompleted {
        stage: String,
        detail: Option<String>,
    },
    StageFailed {
        stage: String,
        result: StageResult,
        detail: Option<String>,
        fatal: bool,
    },
    CleanupStarted {
        profile: &'static str,
    },
    PipelineCompleted {
        execution_id: Uuid,
        status: ExecutionStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Whether a stage runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageGate {
    /// Mandatory stage
    Always,
    /// Optional stage behind a configuration flag
    Flag { name: &'static str, enabled: bool },
    /// Handled outside this program; recorded as a success without a job
    Delegated { reason: String },
}

/// A stage in the run plan
#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub spec: StageSpec,
    pub gate: StageGate,
    pub policy: FailurePolicy,
}

impl PlannedStage {
    pub fn mandatory(spec: StageSpec) -> Self {
        Self {
            spec,
            gate: StageGate::Always,
            policy: FailurePolicy::Fatal,
        }
    }

    pub fn gated(mut self, gate: StageGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn recoverable(mut self) -> Self {
        self.policy = FailurePolicy::Recoverable;
        self
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// Sequences stages strictly one after another
pub struct PipelineController<S, P, C> {
    scheduler: S,
    probes: P,
    cleaner: C,
    stages: Vec<PlannedStage>,
    debug_mode: bool,
    run_name: String,
    state: PipelineState,
    machine: ControllerState,
    event_handlers: Vec<EventHandler>,
}

impl<S, P, C> PipelineController<S, P, C>
where
    S: JobScheduler,
    P: ProbeExecutor,
    C: Cleaner,
{
    pub fn new(stages: Vec<PlannedStage>, scheduler: S, probes: P, cleaner: C) -> Self {
        Self {
            scheduler,
            probes,
            cleaner,
            stages,
            debug_mode: false,
            run_name: "wrf".to_string(),
            state: PipelineState::new(),
            machine: ControllerState::NotStarted,
            event_handlers: Vec::new(),
        }
    }

    pub fn with_debug_mode(mut self, debug_mode: bool) -> Self {
        self.debug_mode = debug_mode;
        self
    }

    pub fn with_run_name(mut self, run_name: impl Into<String>) -> Self {
        self.run_name = run_name.into();
        self
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
    }

    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    pub fn into_state(self) -> PipelineState {
        self.state
    }

    pub fn controller_state(&self) -> ControllerState {
        self.machine
    }

    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    /// Run every stage in order.
    ///
    /// Returns the final status, or the error that aborted the run after the
    /// fatal cleanup profile has been applied.
    pub async fn run(&mut self) -> Result<ExecutionStatus, PipelineError> {
        let total = self.stages.len();
        let execution_id = self.state.execution_id;

        info!("Starting run {} ({})", self.run_name, execution_id);
        self.state.start(total);
        self.emit_event(ExecutionEvent::PipelineStarted {
            execution_id,
            run_name: self.run_name.clone(),
            total_stages: total,
        });

        let mut fatal_error = None;
        let mut recovered = false;
        self.machine = self.machine.begin(total);

        loop {
            match self.machine {
                ControllerState::NotStarted => {
                    self.machine = self.machine.begin(total);
                }
                ControllerState::RunningStage(index) => match self.run_stage(index).await {
                    Ok((result, error)) => {
                        let policy = self.stages[index].policy;
                        self.machine = self.machine.on_result(result, policy, total);
                        if self.machine == ControllerState::StageFailedFatal(index) {
                            fatal_error = error;
                        }
                    }
                    Err(e) => {
                        fatal_error = Some(e);
                        self.machine = ControllerState::StageFailedFatal(index);
                    }
                },
                ControllerState::StageFailedRecoverable(index) => {
                    warn!(
                        stage = %self.stages[index].name(),
                        "Stage failed, continuing with the remaining stages"
                    );
                    recovered = true;
                    self.machine = self.machine.resume(total);
                }
                ControllerState::StageFailedFatal(index) => {
                    let stage = self.stages[index].name().to_string();
                    error!(stage = %stage, "Fatal stage outcome, aborting run");
                    self.cleanup(&CleanupProfile::FATAL);
                    self.finish(ExecutionStatus::Failed);
                    return Err(fatal_error.unwrap_or(PipelineError::ProbeFailureMatch {
                        stage,
                        artifact: "unknown".to_string(),
                    }));
                }
                ControllerState::AllStagesComplete => {
                    self.cleanup(&CleanupProfile::SUCCESS);
                    let status = if recovered {
                        ExecutionStatus::CompletedWithFailures
                    } else {
                        ExecutionStatus::Completed
                    };
                    self.finish(status);
                    return Ok(status);
                }
            }
        }
    }

    /// Run (or skip) one stage and record its result.
    ///
    /// `Err` means the job could not be staged or submitted, which aborts the
    /// run whatever the stage's policy.
    async fn run_stage(
        &mut self,
        index: usize,
    ) -> Result<(StageResult, Option<PipelineError>), PipelineError> {
        let planned = &self.stages[index];
        let name = planned.name().to_string();
        let started_at = Utc::now();
        self.emit_event(ExecutionEvent::StageStarted {
            stage: name.clone(),
            index,
        });

        let (outcome, error) = match &planned.gate {
            StageGate::Flag {
                name: flag,
                enabled: false,
            } => {
                info!(stage = %name, "{} is not set, skipping stage", flag);
                let outcome = StageOutcome {
                    result: StageResult::Skipped,
                    detail: Some(format!("{} is not set", flag)),
                    phase: None,
                };
                (outcome, None)
            }
            StageGate::Delegated { reason } => {
                info!(stage = %name, "{}", reason);
                let outcome = StageOutcome {
                    result: StageResult::Success,
                    detail: Some(reason.clone()),
                    phase: None,
                };
                (outcome, None)
            }
            StageGate::Always | StageGate::Flag { enabled: true, .. } => {
                let job = JobStage::new(&self.scheduler, &self.probes, self.debug_mode);
                match job.submit_and_wait(&planned.spec).await {
                    Ok(outcome) => {
                        let error = outcome_error(&name, &outcome);
                        (outcome, error)
                    }
                    Err(e) => {
                        let outcome = StageOutcome {
                            result: StageResult::Failed,
                            detail: Some(e.to_string()),
                            phase: None,
                        };
                        let error = match e {
                            StageError::Submission(source) => PipelineError::SubmissionFailure {
                                stage: name.clone(),
                                source,
                            },
                            StageError::Staging(source) => PipelineError::Staging {
                                stage: name.clone(),
                                source,
                            },
                        };
                        self.state.record(stage_record(&name, &outcome, started_at));
                        self.emit_event(ExecutionEvent::StageFailed {
                            stage: name,
                            result: outcome.result,
                            detail: outcome.detail,
                            fatal: true,
                        });
                        return Err(error);
                    }
                }
            }
        };

        let fatal = match outcome.result {
            StageResult::TimedOut => true,
            StageResult::Failed => self.stages[index].policy == FailurePolicy::Fatal,
            _ => false,
        };
        self.state.record(stage_record(&name, &outcome, started_at));

        let event = match outcome.result {
            StageResult::Skipped => ExecutionEvent::StageSkipped {
                stage: name,
                reason: outcome.detail.unwrap_or_default(),
            },
            StageResult::Success => ExecutionEvent::StageCompleted {
                stage: name,
                detail: outcome.detail,
            },
            result => ExecutionEvent::StageFailed {
                stage: name,
                result,
                detail: outcome.detail,
                fatal,
            },
        };
        self.emit_event(event);

        Ok((outcome.result, error))
    }

    fn cleanup(&self, profile: &CleanupProfile) {
        self.emit_event(ExecutionEvent::CleanupStarted {
            profile: profile.name,
        });
        self.cleaner.clean(profile);
    }

    fn finish(&mut self, status: ExecutionStatus) {
        self.state.finish(status);
        info!("Run {} finished: {:?}", self.run_name, status);
        self.emit_event(ExecutionEvent::PipelineCompleted {
            execution_id: self.state.execution_id,
            status,
        });
    }
}

fn stage_record(stage: &str, outcome: &StageOutcome, started_at: DateTime<Utc>) -> StageRecord {
    StageRecord {
        stage: stage.to_string(),
        result: outcome.result,
        detail: outcome.detail.clone(),
        started_at,
        finished_at: Utc::now(),
    }
}

/// The error a stage outcome maps to if it turns out to be fatal
fn outcome_error(stage: &str, outcome: &StageOutcome) -> Option<PipelineError> {
    match outcome.result {
        StageResult::Failed => Some(PipelineError::ProbeFailureMatch {
            stage: stage.to_string(),
            artifact: outcome.detail.clone().unwrap_or_default(),
        }),
        StageResult::TimedOut => Some(PipelineError::WaitTimeout {
            stage: stage.to_string(),
            phase: outcome.phase.unwrap_or(WaitPhase::Completion),
        }),
        StageResult::Success | StageResult::Skipped => None,
    }
}
