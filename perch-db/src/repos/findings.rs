//! Repository for persisted review findings

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use crate::Result;

/// A persisted finding row
#[derive(Debug, Clone, FromRow)]
pub struct FindingRecord {
    pub id: i64,
    pub session_id: i64,
    pub agent: String,
    pub severity: String,
    pub file_path: String,
    pub line_number: Option<i64>,
    pub code_excerpt: Option<String>,
    pub description: String,
    pub suggestion: Option<String>,
    pub category: String,
    pub degraded: bool,
    pub created_at: String,
}

/// Fields required to persist a finding
#[derive(Debug, Clone)]
pub struct CreateFinding {
    pub agent: String,
    pub severity: String,
    pub file_path: String,
    pub line_number: Option<i64>,
    pub code_excerpt: Option<String>,
    pub description: String,
    pub suggestion: Option<String>,
    pub category: String,
    pub degraded: bool,
}

/// Repository for managing finding rows
pub struct FindingRepo {
    pool: SqlitePool,
}

impl FindingRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append findings to a session
    pub async fn insert_batch(&self, session_id: i64, findings: &[CreateFinding]) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        for finding in findings {
            sqlx::query(
                "INSERT INTO findings (
                    session_id, agent, severity, file_path, line_number,
                    code_excerpt, description, suggestion, category, degraded, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(session_id)
            .bind(&finding.agent)
            .bind(&finding.severity)
            .bind(&finding.file_path)
            .bind(finding.line_number)
            .bind(&finding.code_excerpt)
            .bind(&finding.description)
            .bind(&finding.suggestion)
            .bind(&finding.category)
            .bind(finding.degraded)
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// List findings of a session in insertion order
    pub async fn list_by_session(&self, session_id: i64) -> Result<Vec<FindingRecord>> {
        let findings = sqlx::query_as::<_, FindingRecord>(
            "SELECT * FROM findings WHERE session_id = ? ORDER BY id",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(findings)
    }
}
