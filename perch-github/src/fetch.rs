//! GitHub-backed diff provider

use async_trait::async_trait;
use perch_core::diff::{parse_unified_diff, DiffBundle};
use perch_core::provider::{DiffProvider, ProviderError};
use tracing::{debug, info};

use crate::client::{parse_repository, GitHubClient};

/// Fetches pull request diffs from the GitHub API
#[derive(Clone)]
pub struct GitHubDiffProvider {
    client: GitHubClient,
}

impl GitHubDiffProvider {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DiffProvider for GitHubDiffProvider {
    async fn fetch(&self, repository: &str, pr_number: u64) -> Result<DiffBundle, ProviderError> {
        let (owner, repo) = parse_repository(repository)
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        debug!(owner = %owner, repo = %repo, pr_number, "Fetching pull request");

        let pr = self
            .client
            .client()
            .pulls(&owner, &repo)
            .get(pr_number)
            .await
            .map_err(|e| map_octocrab_error(e, repository, pr_number))?;

        let head_sha = pr.head.sha.clone();
        let pr_url = pr
            .html_url
            .as_ref()
            .map(|u| u.to_string())
            .unwrap_or_else(|| format!("https://github.com/{owner}/{repo}/pull/{pr_number}"));

        // The raw diff media type is not modeled by octocrab
        let url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.client.api_base(),
            owner,
            repo,
            pr_number
        );
        let response = self
            .client
            .http()
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.client.token()))
            .header("Accept", "application/vnd.github.v3.diff")
            .header("User-Agent", "perch")
            .send()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_status(status, repository, pr_number));
        }

        let diff = response
            .text()
            .await
            .map_err(|e| ProviderError::Transient(e.to_string()))?;
        let files = parse_unified_diff(&diff);

        info!(
            repository = %repository,
            pr_number,
            file_count = files.len(),
            "Fetched pull request diff"
        );

        Ok(DiffBundle {
            repository: repository.to_string(),
            pr_number,
            head_sha,
            pr_url,
            diff,
            files,
        })
    }
}

fn map_octocrab_error(e: octocrab::Error, repository: &str, pr_number: u64) -> ProviderError {
    if let octocrab::Error::GitHub { ref source, .. } = e {
        return map_status(source.status_code, repository, pr_number);
    }
    ProviderError::Transient(e.to_string())
}

fn map_status(
    status: reqwest::StatusCode,
    repository: &str,
    pr_number: u64,
) -> ProviderError {
    match status.as_u16() {
        404 => ProviderError::NotFound {
            repository: repository.to_string(),
            pr_number,
        },
        403 | 429 => ProviderError::RateLimited,
        code => ProviderError::Transient(format!("GitHub returned status {code}")),
    }
}
