//! Database layer for Perch
//!
//! Provides persistence for review sessions, findings, and pipeline
//! stage executions.

pub mod error;
pub mod repos;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub use error::{Error, Result};
pub use repos::{
    executions::{CreateExecution, ExecutionRecord, ExecutionRepo},
    findings::{CreateFinding, FindingRecord, FindingRepo},
    sessions::{CreateSession, ReviewSession, SessionOutcome, SessionRepo, SessionStatus},
};

/// Database connection pool
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection from a file path
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::Io(format!("Failed to create database directory: {}", e)))?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Migration(e.to_string()))?;

        Ok(Self { pool })
    }

    /// Get the default database path (~/.cache/perch/perch.db)
    pub fn default_path() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| Error::Io("Could not determine cache directory".to_string()))?;
        Ok(cache_dir.join("perch").join("perch.db"))
    }

    /// Get the underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the review sessions repository
    pub fn sessions(&self) -> SessionRepo {
        SessionRepo::new(self.pool.clone())
    }

    /// Get the findings repository
    pub fn findings(&self) -> FindingRepo {
        FindingRepo::new(self.pool.clone())
    }

    /// Get the stage executions repository
    pub fn executions(&self) -> ExecutionRepo {
        ExecutionRepo::new(self.pool.clone())
    }
}
