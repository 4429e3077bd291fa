//! Error types for Perch

use thiserror::Error;

/// Result type alias for Perch operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for Perch operations
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Review store error
    #[error("Store error: {0}")]
    Store(#[from] perch_db::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
