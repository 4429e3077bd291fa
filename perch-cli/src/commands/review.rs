//! Manual review trigger
//!
//! Runs the same path as a webhook trigger, so coalescing and session
//! persistence behave identically.

use clap::Args;
use perch_core::orchestrator::{ReviewRequest, RunOutcome};
use perch_core::{Config, Secrets};
use perch_github::{parse_repository, GitHubClient};
use tracing::info;

use super::build_orchestrator;

/// Arguments for the review command
#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Repository (owner/repo or URL)
    repository: String,

    /// Pull request number
    pr_number: u64,
}

impl ReviewArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let secrets = Secrets::load()?;
        let (owner, repo) = parse_repository(&self.repository)?;
        let repository = format!("{owner}/{repo}");

        let client = GitHubClient::from_secrets(&secrets, config.github.api_base.clone())?;
        let pr = client.client().pulls(&owner, &repo).get(self.pr_number).await?;
        let head_sha = pr.head.sha.clone();
        let pr_url = pr
            .html_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://github.com/{repository}/pull/{}", self.pr_number));

        info!(
            repository = %repository,
            pr_number = self.pr_number,
            head_sha = %head_sha,
            "Triggering manual review"
        );

        let (_db, orchestrator) = build_orchestrator(config, &secrets).await?;
        let outcome = orchestrator
            .run(ReviewRequest {
                repository: repository.clone(),
                pr_number: self.pr_number,
                head_sha,
                pr_url,
                trigger_kind: "manual".to_string(),
            })
            .await?;

        match outcome {
            RunOutcome::Coalesced => {
                println!(
                    "A review for {}#{} is already in flight; nothing to do.",
                    repository, self.pr_number
                );
            }
            RunOutcome::Completed {
                session_id,
                disposition,
                delivered,
            } => {
                println!(
                    "Review completed (session {session_id}): {}",
                    disposition.as_event()
                );
                if !delivered {
                    println!("Warning: the review could not be posted to GitHub.");
                }
            }
            RunOutcome::Failed { session_id, error } => {
                println!("Review failed (session {session_id}): {error}");
            }
        }

        Ok(())
    }
}
