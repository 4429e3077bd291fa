//! Error types for database operations

use thiserror::Error;

/// Database error types
#[derive(Error, Debug)]
pub enum Error {
    /// SQLx database error
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Migration error
    #[error("Migration error: {0}")]
    Migration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// An in-flight session already exists for the pull request
    #[error("Active review session already exists for {repository}#{pr_number}")]
    ActiveSessionExists { repository: String, pr_number: i64 },

    /// Invalid session status transition
    #[error("Invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for database operations
pub type Result<T> = std::result::Result<T, Error>;
