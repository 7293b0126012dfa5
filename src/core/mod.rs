//! Core domain models
//!
//! This module defines the run configuration, the wait-condition model and
//! the state accumulated over a pipeline run.

pub mod condition;
pub mod config;
pub mod model_data;
pub mod probe;
pub mod settings;
pub mod state;
pub mod template;

pub use condition::{Condition, ConditionSet, ConditionSetError, MatchRule, Verdict};
pub use config::{ConfigError, JobResources, PostProcessing, RunConfig, UnipostOutput};
pub use model_data::{DownloadItem, ModelDataSource};
pub use probe::{LocalProbeExecutor, Probe, ProbeError, ProbeExecutor};
pub use settings::Settings;
pub use state::*;
pub use template::{ReplacementKeys, TemplateError, TemplateWriter};
