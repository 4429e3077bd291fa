//! Diff provider seam
//!
//! The orchestrator fetches pull request diffs through this trait so
//! the pipeline can be exercised without a live forge.

use async_trait::async_trait;

use crate::diff::DiffBundle;

/// Failure modes when fetching a pull request diff
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("pull request not found: {repository}#{pr_number}")]
    NotFound { repository: String, pr_number: u64 },

    #[error("diff provider rate limited")]
    RateLimited,

    #[error("diff provider error: {0}")]
    Transient(String),
}

/// Fetches and normalizes the diff of a pull request
#[async_trait]
pub trait DiffProvider: Send + Sync {
    async fn fetch(&self, repository: &str, pr_number: u64) -> Result<DiffBundle, ProviderError>;
}
