//! CLI command implementations

mod review;
mod serve;
mod status;

pub use review::ReviewArgs;
pub use serve::ServeArgs;
pub use status::StatusArgs;

use std::sync::Arc;

use perch_core::orchestrator::Orchestrator;
use perch_core::{Config, Secrets};
use perch_db::Database;
use perch_github::{GitHubClient, GitHubDiffProvider, GitHubReviewSink};

use crate::analyzer::CommandAnalyzer;

/// The production orchestrator wiring: GitHub on both ends, a
/// subprocess analyzer in the middle
pub type GitHubOrchestrator = Orchestrator<GitHubDiffProvider, CommandAnalyzer, GitHubReviewSink>;

/// Build the orchestrator and its database from loaded config
pub async fn build_orchestrator(
    config: &Config,
    secrets: &Secrets,
) -> anyhow::Result<(Database, Arc<GitHubOrchestrator>)> {
    let client = GitHubClient::from_secrets(secrets, config.github.api_base.clone())?;

    let db_path = match &config.database.path {
        Some(path) => path.clone(),
        None => Database::default_path()?,
    };
    let db = Database::new(&db_path).await?;

    let orchestrator = Orchestrator::new(
        GitHubDiffProvider::new(client.clone()),
        CommandAnalyzer::new(&config.analyzer),
        GitHubReviewSink::new(client),
        db.clone(),
        config.review.clone(),
    );

    Ok((db, Arc::new(orchestrator)))
}
