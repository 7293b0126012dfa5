//! SQLite-based run history store

use crate::core::ExecutionStatus;
use crate::persistence::{ExecutionSummary, PersistenceBackend};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use uuid::Uuid;

const SCHEMA: [&str; 3] = [
    r#"
    CREATE TABLE IF NOT EXISTS executions (
        id TEXT PRIMARY KEY,
        run_name TEXT NOT NULL,
        status TEXT NOT NULL,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        stages TEXT NOT NULL DEFAULT '[]',
        created_at TEXT NOT NULL DEFAULT (datetime('now'))
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_run_name ON executions(run_name)",
    "CREATE INDEX IF NOT EXISTS idx_started_at ON executions(started_at)",
];

/// SQLite execution store
pub struct SqliteExecutionStore {
    pool: SqlitePool,
}

impl SqliteExecutionStore {
    /// Open (creating if needed) the database at `db_path`
    pub async fn new(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open history database {}", db_path.display()))?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// `<data_local_dir>/wrf-pipeline/history.db`
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("wrf-pipeline")
            .join("history.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(db_dir) = db_path.parent() {
            std::fs::create_dir_all(db_dir)
                .with_context(|| format!("Failed to create {}", db_dir.display()))?;
        }
        Self::new(&db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize history schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn parse_status(status: &str) -> ExecutionStatus {
        match status {
            "Running" => ExecutionStatus::Running,
            "Completed" => ExecutionStatus::Completed,
            "CompletedWithFailures" => ExecutionStatus::CompletedWithFailures,
            "Failed" => ExecutionStatus::Failed,
            _ => ExecutionStatus::Pending,
        }
    }

    fn from_row(row: &SqliteRow) -> Result<ExecutionSummary> {
        let stages: String = row.get("stages");
        Ok(ExecutionSummary {
            execution_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            run_name: row.get("run_name"),
            status: Self::parse_status(&row.get::<String, _>("status")),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            stages: serde_json::from_str(&stages).context("Corrupt stage records")?,
        })
    }
}

#[async_trait::async_trait]
impl PersistenceBackend for SqliteExecutionStore {
    async fn save_execution(&self, execution: &ExecutionSummary) -> Result<()> {
        let stages = serde_json::to_string(&execution.stages)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO executions
            (id, run_name, status, started_at, completed_at, stages)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(execution.execution_id.to_string())
        .bind(&execution.run_name)
        .bind(format!("{:?}", execution.status))
        .bind(Self::to_naive(execution.started_at))
        .bind(execution.completed_at.map(Self::to_naive))
        .bind(stages)
        .execute(&self.pool)
        .await
        .context("Failed to save execution")?;

        Ok(())
    }

    async fn load_execution(&self, execution_id: Uuid) -> Result<Option<ExecutionSummary>> {
        let row = sqlx::query(
            r#"
            SELECT id, run_name, status, started_at, completed_at, stages
            FROM executions
            WHERE id = ?1
            "#,
        )
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load execution")?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn list_executions(
        &self,
        run_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ExecutionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT id, run_name, status, started_at, completed_at, stages
            FROM executions
            WHERE ?1 IS NULL OR run_name = ?1
            ORDER BY started_at DESC
            LIMIT ?2
            "#,
        )
        .bind(run_name)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list executions")?;

        rows.iter().map(Self::from_row).collect()
    }
}
