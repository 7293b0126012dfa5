//! Stage execution: polling, waiting, job stages and the controller

pub mod catalog;
pub mod controller;
pub mod poller;
pub mod stage;
pub mod waiter;
pub mod workflow;

pub use catalog::standard_stages;
pub use controller::{
    EventHandler, ExecutionEvent, PipelineController, PipelineError, PlannedStage, StageGate,
};
pub use poller::{ConditionPoller, PollOutcome, Resolution};
pub use stage::{JobStage, StageError, StageOutcome, StageSpec, WaitPhase};
pub use waiter::{Deadline, JobWaiter, WaitError, WaitSpec};
pub use workflow::{PreparationError, Workflow};
