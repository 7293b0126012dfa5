//! Execution state models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Overall pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Pipeline has not started
    Pending,
    /// Pipeline is currently running
    Running,
    /// Every stage succeeded or was skipped
    Completed,
    /// Finished, but a recoverable stage failed along the way
    CompletedWithFailures,
    /// Aborted on a fatal stage outcome
    Failed,
}

impl ExecutionStatus {
    /// Process exit status for a finished run
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutionStatus::Completed => 0,
            ExecutionStatus::CompletedWithFailures => 2,
            _ => 1,
        }
    }
}

/// Outcome of a single stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageResult {
    Success,
    Failed,
    TimedOut,
    Skipped,
}

impl StageResult {
    /// Whether the pipeline may move past this stage unconditionally
    pub fn is_passing(&self) -> bool {
        matches!(self, StageResult::Success | StageResult::Skipped)
    }
}

impl fmt::Display for StageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StageResult::Success => "SUCCESS",
            StageResult::Failed => "FAILED",
            StageResult::TimedOut => "TIMED OUT",
            StageResult::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

/// How a stage's `Failed` result is treated. `TimedOut` is always fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FailurePolicy {
    /// Abort the run
    #[default]
    Fatal,
    /// Record the failure and carry on with the next stage
    Recoverable,
}

/// One entry of the pipeline report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub result: StageResult,
    /// Artifact or reason behind the result
    pub detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Controller state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    NotStarted,
    RunningStage(usize),
    StageFailedFatal(usize),
    StageFailedRecoverable(usize),
    AllStagesComplete,
}

impl ControllerState {
    /// NotStarted -> RunningStage(0), or straight to AllStagesComplete for an empty plan
    pub fn begin(self, total: usize) -> Self {
        match self {
            ControllerState::NotStarted if total == 0 => ControllerState::AllStagesComplete,
            ControllerState::NotStarted => ControllerState::RunningStage(0),
            other => other,
        }
    }

    /// Transition out of RunningStage(i) once the stage has resolved
    pub fn on_result(self, result: StageResult, policy: FailurePolicy, total: usize) -> Self {
        let ControllerState::RunningStage(index) = self else {
            return self;
        };

        match result {
            StageResult::Success | StageResult::Skipped => Self::after(index, total),
            StageResult::TimedOut => ControllerState::StageFailedFatal(index),
            StageResult::Failed => match policy {
                FailurePolicy::Fatal => ControllerState::StageFailedFatal(index),
                FailurePolicy::Recoverable => ControllerState::StageFailedRecoverable(index),
            },
        }
    }

    /// Continue past a recoverable failure
    pub fn resume(self, total: usize) -> Self {
        match self {
            ControllerState::StageFailedRecoverable(index) => Self::after(index, total),
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ControllerState::StageFailedFatal(_) | ControllerState::AllStagesComplete
        )
    }

    fn after(index: usize, total: usize) -> Self {
        if index + 1 >= total {
            ControllerState::AllStagesComplete
        } else {
            ControllerState::RunningStage(index + 1)
        }
    }
}

/// Append-only record of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineState {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// Current execution status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution completed/failed
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of stages in the plan
    pub total_stages: usize,

    records: Vec<StageRecord>,
}

impl PipelineState {
    /// Create a new pipeline state
    pub fn new() -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            status: ExecutionStatus::Pending,
            started_at: None,
            completed_at: None,
            total_stages: 0,
            records: Vec::new(),
        }
    }

    /// Mark pipeline as started
    pub fn start(&mut self, total_stages: usize) {
        self.status = ExecutionStatus::Running;
        self.started_at = Some(Utc::now());
        self.total_stages = total_stages;
    }

    /// Mark pipeline as finished with the given status
    pub fn finish(&mut self, status: ExecutionStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }

    /// Append a stage result
    pub fn record(&mut self, record: StageRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[StageRecord] {
        &self.records
    }

    pub fn result_of(&self, stage: &str) -> Option<StageResult> {
        self.records
            .iter()
            .find(|r| r.stage == stage)
            .map(|r| r.result)
    }

    pub fn count(&self, result: StageResult) -> usize {
        self.records.iter().filter(|r| r.result == result).count()
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        self.records.len() as f64 / self.total_stages as f64
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stage: &str, result: StageResult) -> StageRecord {
        StageRecord {
            stage: stage.to_string(),
            result,
            detail: None,
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_happy_path_transitions() {
        let state = ControllerState::NotStarted.begin(2);
        assert_eq!(state, ControllerState::RunningStage(0));

        let state = state.on_result(StageResult::Success, FailurePolicy::Fatal, 2);
        assert_eq!(state, ControllerState::RunningStage(1));

        let state = state.on_result(StageResult::Skipped, FailurePolicy::Fatal, 2);
        assert_eq!(state, ControllerState::AllStagesComplete);
        assert!(state.is_terminal());
    }

    #[test]
    fn test_empty_plan_completes_immediately() {
        assert_eq!(
            ControllerState::NotStarted.begin(0),
            ControllerState::AllStagesComplete
        );
    }

    #[test]
    fn test_timeout_is_fatal_even_when_recoverable() {
        let state = ControllerState::RunningStage(1).on_result(
            StageResult::TimedOut,
            FailurePolicy::Recoverable,
            4,
        );
        assert_eq!(state, ControllerState::StageFailedFatal(1));
    }

    #[test]
    fn test_failure_follows_policy() {
        let fatal =
            ControllerState::RunningStage(2).on_result(StageResult::Failed, FailurePolicy::Fatal, 4);
        assert_eq!(fatal, ControllerState::StageFailedFatal(2));

        let recoverable = ControllerState::RunningStage(2).on_result(
            StageResult::Failed,
            FailurePolicy::Recoverable,
            4,
        );
        assert_eq!(recoverable, ControllerState::StageFailedRecoverable(2));
        assert_eq!(recoverable.resume(4), ControllerState::RunningStage(3));
        assert_eq!(
            ControllerState::StageFailedRecoverable(3).resume(4),
            ControllerState::AllStagesComplete
        );
    }

    #[test]
    fn test_terminal_states_do_not_move() {
        let fatal = ControllerState::StageFailedFatal(0);
        assert_eq!(
            fatal.on_result(StageResult::Success, FailurePolicy::Fatal, 3),
            fatal
        );
        assert_eq!(fatal.resume(3), fatal);
    }

    #[test]
    fn test_pipeline_state_records() {
        let mut state = PipelineState::new();
        state.start(4);
        assert_eq!(state.progress(), 0.0);

        state.record(record("geogrid", StageResult::Skipped));
        state.record(record("ungrib", StageResult::Success));
        assert_eq!(state.progress(), 0.5);
        assert_eq!(state.result_of("ungrib"), Some(StageResult::Success));
        assert_eq!(state.count(StageResult::Skipped), 1);
        assert_eq!(state.records()[0].stage, "geogrid");

        state.finish(ExecutionStatus::Completed);
        assert!(state.completed_at.is_some());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExecutionStatus::Completed.exit_code(), 0);
        assert_eq!(ExecutionStatus::Failed.exit_code(), 1);
        assert_eq!(ExecutionStatus::CompletedWithFailures.exit_code(), 2);
    }
}
