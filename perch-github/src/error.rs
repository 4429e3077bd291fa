//! Error types for GitHub operations

use thiserror::Error;

/// Result type for GitHub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during GitHub operations
///
/// Fetch and delivery failures are reported through the pipeline's own
/// `ProviderError`/`DeliveryError` enums; this covers client setup and
/// repository reference parsing.
#[derive(Error, Debug)]
pub enum Error {
    /// Authentication error
    #[error("GitHub authentication error: {0}")]
    Auth(String),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),
}
