//! wrf-pipeline - fetch model data, render namelists, and drive the WRF batch job chain

pub mod cli;
pub mod core;
pub mod execution;
pub mod fetch;
pub mod logging;
pub mod persistence;
pub mod scheduler;
pub mod workspace;

// Re-export commonly used types
pub use core::{ExecutionStatus, PipelineState, RunConfig, StageResult};
pub use execution::{ExecutionEvent, PipelineController, PipelineError, Workflow};
pub use scheduler::{JobScheduler, QsubScheduler};
