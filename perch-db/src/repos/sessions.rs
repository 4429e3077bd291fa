//! Repository for review session operations
//!
//! A review session is one attempt to review a pull request head. The
//! partial unique index on (repository, pr_number) for in-flight
//! statuses is what makes session creation the idempotency commit
//! point: concurrent triggers for the same pull request race on the
//! insert and exactly one wins.

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use tracing::{info, warn};

use crate::{Error, Result};

/// Lifecycle status of a review session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "running" => Some(SessionStatus::Running),
            "completed" => Some(SessionStatus::Completed),
            "failed" => Some(SessionStatus::Failed),
            _ => None,
        }
    }

    /// Check if a transition to the target status is allowed
    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!(
            (self, target),
            (SessionStatus::Pending, SessionStatus::Running)
                | (SessionStatus::Pending, SessionStatus::Failed)
                | (SessionStatus::Running, SessionStatus::Completed)
                | (SessionStatus::Running, SessionStatus::Failed)
        )
    }

    /// Whether the session can never run again
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted review session row
#[derive(Debug, Clone, FromRow)]
pub struct ReviewSession {
    pub id: i64,
    pub repository: String,
    pub pr_number: i64,
    pub head_sha: String,
    pub pr_url: String,
    pub trigger_kind: String,
    pub status: String,
    pub disposition: Option<String>,
    pub summary: Option<String>,
    pub finding_count: i64,
    pub severity_critical: i64,
    pub severity_high: i64,
    pub severity_medium: i64,
    pub severity_low: i64,
    pub degraded: bool,
    pub duration_ms: Option<i64>,
    pub usage_units: Option<i64>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub completed_at: Option<String>,
}

impl ReviewSession {
    /// Parsed status of the session
    pub fn session_status(&self) -> Option<SessionStatus> {
        SessionStatus::parse(&self.status)
    }
}

/// Fields required to create a session
#[derive(Debug, Clone)]
pub struct CreateSession {
    pub repository: String,
    pub pr_number: i64,
    pub head_sha: String,
    pub pr_url: String,
    pub trigger_kind: String,
}

/// Aggregate outcome written when a session reaches a terminal status
///
/// The summary body and the per-severity counts are persisted here so
/// the session row stays a usable record of the review even when
/// delivery to the forge fails afterwards.
#[derive(Debug, Clone, Default)]
pub struct SessionOutcome {
    pub disposition: Option<String>,
    pub summary: Option<String>,
    pub finding_count: i64,
    pub severity_critical: i64,
    pub severity_high: i64,
    pub severity_medium: i64,
    pub severity_low: i64,
    pub degraded: bool,
    pub duration_ms: Option<i64>,
    pub usage_units: Option<i64>,
    pub error: Option<String>,
}

/// Repository for managing review session rows
pub struct SessionRepo {
    pool: SqlitePool,
}

impl SessionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a pending session for a pull request
    ///
    /// Fails with [`Error::ActiveSessionExists`] when another pending
    /// or running session holds the (repository, pr_number) slot.
    pub async fn create(&self, session: CreateSession) -> Result<ReviewSession> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO review_sessions (
                repository, pr_number, head_sha, pr_url, trigger_kind,
                status, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, 'pending', ?, ?)",
        )
        .bind(&session.repository)
        .bind(session.pr_number)
        .bind(&session.head_sha)
        .bind(&session.pr_url)
        .bind(&session.trigger_kind)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        let id = match result {
            Ok(done) => done.last_insert_rowid(),
            Err(e) if is_unique_violation(&e) => {
                return Err(Error::ActiveSessionExists {
                    repository: session.repository,
                    pr_number: session.pr_number,
                });
            }
            Err(e) => return Err(e.into()),
        };

        info!(
            session_id = id,
            repository = %session.repository,
            pr_number = session.pr_number,
            "Created review session"
        );
        self.get(id).await
    }

    /// Fetch a session by id
    pub async fn get(&self, id: i64) -> Result<ReviewSession> {
        sqlx::query_as::<_, ReviewSession>("SELECT * FROM review_sessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Review session with id {} not found", id)))
    }

    /// Fetch the in-flight session for a pull request, if any
    pub async fn get_active(&self, repository: &str, pr_number: i64) -> Result<Option<ReviewSession>> {
        let session = sqlx::query_as::<_, ReviewSession>(
            "SELECT * FROM review_sessions
             WHERE repository = ? AND pr_number = ? AND status IN ('pending', 'running')",
        )
        .bind(repository)
        .bind(pr_number)
        .fetch_optional(&self.pool)
        .await?;
        Ok(session)
    }

    /// List recent sessions, newest first, optionally scoped to a repository
    pub async fn list_recent(
        &self,
        repository: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ReviewSession>> {
        let sessions = match repository {
            Some(repo) => {
                sqlx::query_as::<_, ReviewSession>(
                    "SELECT * FROM review_sessions
                     WHERE repository = ?
                     ORDER BY id DESC LIMIT ?",
                )
                .bind(repo)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, ReviewSession>(
                    "SELECT * FROM review_sessions ORDER BY id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(sessions)
    }

    /// Transition a session between statuses
    ///
    /// The update is guarded on the expected current status, so a stale
    /// caller loses the race instead of clobbering newer state.
    pub async fn transition(
        &self,
        id: i64,
        from: SessionStatus,
        to: SessionStatus,
    ) -> Result<()> {
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let affected = sqlx::query(
            "UPDATE review_sessions SET status = ?, updated_at = ?
             WHERE id = ? AND status = ?",
        )
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: to.to_string(),
            });
        }

        info!(session_id = id, from = %from, to = %to, "Session status transition");
        Ok(())
    }

    /// Move a running session to a terminal status with its outcome
    pub async fn finalize(
        &self,
        id: i64,
        to: SessionStatus,
        outcome: SessionOutcome,
    ) -> Result<()> {
        if !to.is_terminal() {
            return Err(Error::InvalidTransition {
                from: "running".to_string(),
                to: to.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE review_sessions SET
                status = ?, disposition = ?, summary = ?, finding_count = ?,
                severity_critical = ?, severity_high = ?, severity_medium = ?,
                severity_low = ?, degraded = ?, duration_ms = ?, usage_units = ?,
                error = ?, updated_at = ?, completed_at = ?
             WHERE id = ? AND status IN ('pending', 'running')",
        )
        .bind(to.as_str())
        .bind(&outcome.disposition)
        .bind(&outcome.summary)
        .bind(outcome.finding_count)
        .bind(outcome.severity_critical)
        .bind(outcome.severity_high)
        .bind(outcome.severity_medium)
        .bind(outcome.severity_low)
        .bind(outcome.degraded)
        .bind(outcome.duration_ms)
        .bind(outcome.usage_units)
        .bind(&outcome.error)
        .bind(&now)
        .bind(&now)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            let current = self.get(id).await?;
            return Err(Error::InvalidTransition {
                from: current.status,
                to: to.to_string(),
            });
        }

        info!(session_id = id, status = %to, "Finalized review session");
        Ok(())
    }

    /// Fail every session left pending or running by a previous process
    ///
    /// Called at startup. A session stranded in an active status holds
    /// its (repository, pr_number) slot and would coalesce away every
    /// future review of that pull request.
    pub async fn recover_interrupted(&self) -> Result<u64> {
        let now = Utc::now().to_rfc3339();
        let affected = sqlx::query(
            "UPDATE review_sessions SET
                status = 'failed', error = ?, updated_at = ?, completed_at = ?
             WHERE status IN ('pending', 'running')",
        )
        .bind("interrupted by restart")
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected > 0 {
            warn!(
                recovered = affected,
                "Failed sessions left active by a previous run"
            );
        }
        Ok(affected)
    }
}

/// Check whether a sqlx error is a unique constraint violation
fn is_unique_violation(e: &sqlx::Error) -> bool {
    match e {
        sqlx::Error::Database(db) => {
            matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        }
        _ => false,
    }
}
