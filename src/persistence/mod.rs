//! Persistence layer for run history

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteExecutionStore;

pub use crate::core::ExecutionStatus;
use crate::core::{PipelineState, StageRecord};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Summary of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionSummary {
    /// Unique execution ID
    pub execution_id: Uuid,

    /// `<modeldata>-<starttime>`
    pub run_name: String,

    /// Final status
    pub status: ExecutionStatus,

    /// When execution started
    pub started_at: DateTime<Utc>,

    /// When execution completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Stage results in execution order
    pub stages: Vec<StageRecord>,
}

impl ExecutionSummary {
    pub fn from_state(run_name: impl Into<String>, state: &PipelineState) -> Self {
        Self {
            execution_id: state.execution_id,
            run_name: run_name.into(),
            status: state.status,
            started_at: state.started_at.unwrap_or_else(Utc::now),
            completed_at: state.completed_at,
            stages: state.records().to_vec(),
        }
    }
}

/// Trait for persistence backends
#[async_trait::async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Save (or replace) a run
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()>;

    /// Load a run by ID
    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>>;

    /// Most recent runs first, optionally only those of one run name
    async fn list_executions(
        &self,
        run_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionSummary>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: tokio::sync::RwLock<std::collections::HashMap<Uuid, ExecutionSummary>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: tokio::sync::RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for InMemoryPersistence {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let mut execs = self.executions.write().await;
        execs.insert(execution.execution_id, execution.clone());
        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let execs = self.executions.read().await;
        Ok(execs.get(&execution_id).cloned())
    }

    async fn list_executions(
        &self,
        run_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionSummary>> {
        let execs = self.executions.read().await;
        let mut result: Vec<_> = execs
            .values()
            .filter(|e| run_name.map_or(true, |name| e.run_name == name))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }
}
