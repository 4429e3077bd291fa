//! Repository for pipeline stage execution records

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::Result;

/// A persisted stage execution row
#[derive(Debug, Clone, FromRow)]
pub struct ExecutionRecord {
    pub id: i64,
    pub session_id: i64,
    pub stage: String,
    pub duration_ms: i64,
    pub usage_units: Option<i64>,
    pub raw_output: Option<String>,
    pub error: Option<String>,
    pub created_at: String,
}

/// Fields required to persist a stage execution
#[derive(Debug, Clone)]
pub struct CreateExecution {
    pub stage: String,
    pub duration_ms: i64,
    pub usage_units: Option<i64>,
    pub raw_output: Option<String>,
    pub error: Option<String>,
}

/// Repository for managing stage execution rows
pub struct ExecutionRepo {
    pool: SqlitePool,
}

impl ExecutionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append execution records to a session, preserving order
    pub async fn insert_batch(
        &self,
        session_id: i64,
        executions: &[CreateExecution],
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for execution in executions {
            sqlx::query(
                "INSERT INTO stage_executions (
                    session_id, stage, duration_ms, usage_units, raw_output, error, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(&execution.stage)
            .bind(execution.duration_ms)
            .bind(execution.usage_units)
            .bind(&execution.raw_output)
            .bind(&execution.error)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// List executions of a session in insertion order
    pub async fn list_by_session(&self, session_id: i64) -> Result<Vec<ExecutionRecord>> {
        let executions = sqlx::query_as::<_, ExecutionRecord>(
            "SELECT * FROM stage_executions WHERE session_id = ? ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(executions)
    }
}
