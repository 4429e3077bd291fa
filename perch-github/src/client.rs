//! GitHub API client using octocrab

use octocrab::Octocrab;
use perch_core::Secrets;
use tracing::info;

use crate::{Error, Result};

/// GitHub API client shared by the diff provider and review sink
///
/// Webhook deliveries can come from any repository the token can see,
/// so the client is not bound to a single owner/repo pair; the target
/// travels with each call.
#[derive(Clone)]
pub struct GitHubClient {
    client: Octocrab,
    http: reqwest::Client,
    token: String,
    api_base: String,
}

impl GitHubClient {
    /// Create a client from an explicit token
    pub fn new(token: impl Into<String>, api_base: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let api_base = api_base.into().trim_end_matches('/').to_string();

        let client = Octocrab::builder()
            .personal_token(token.clone())
            .build()
            .map_err(|e| Error::Auth(format!("Failed to create GitHub client: {}", e)))?;

        info!(api_base = %api_base, "Created GitHub client");

        Ok(Self {
            client,
            http: reqwest::Client::new(),
            token,
            api_base,
        })
    }

    /// Create a client from loaded secrets
    ///
    /// Token is taken from (in priority order):
    /// 1. GITHUB_TOKEN environment variable
    /// 2. ~/.config/perch/secrets.toml
    pub fn from_secrets(secrets: &Secrets, api_base: impl Into<String>) -> Result<Self> {
        let token = secrets.github_token().ok_or_else(|| {
            Error::Auth(
                "GitHub token not found. Set GITHUB_TOKEN environment variable \
                 or add token to ~/.config/perch/secrets.toml"
                    .to_string(),
            )
        })?;
        Self::new(token, api_base)
    }

    /// Get the underlying octocrab client
    pub fn client(&self) -> &Octocrab {
        &self.client
    }

    /// Get the raw HTTP client for endpoints octocrab does not model
    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_base", &self.api_base)
            .finish_non_exhaustive()
    }
}

/// Split a repository reference into owner and repo
///
/// Supports formats:
/// - owner/repo
/// - https://github.com/owner/repo
/// - git@github.com:owner/repo.git
pub fn parse_repository(reference: &str) -> Result<(String, String)> {
    // HTTPS URL: https://github.com/owner/repo
    if reference.starts_with("https://") || reference.starts_with("http://") {
        let url = url::Url::parse(reference).map_err(|e| Error::Parse(e.to_string()))?;
        let path = url.path().trim_start_matches('/').trim_end_matches(".git");
        let parts: Vec<&str> = path.split('/').collect();
        if parts.len() >= 2 {
            return Ok((parts[0].to_string(), parts[1].to_string()));
        }
        return Err(Error::Parse(format!("Invalid GitHub URL path: {}", path)));
    }

    // SSH URL: git@github.com:owner/repo.git
    if reference.starts_with("git@") {
        if let Some(path) = reference.split(':').nth(1) {
            let path = path.trim_end_matches(".git");
            let parts: Vec<&str> = path.split('/').collect();
            if parts.len() >= 2 {
                return Ok((parts[0].to_string(), parts[1].to_string()));
            }
        }
        return Err(Error::Parse(format!("Invalid SSH URL: {}", reference)));
    }

    // Shorthand: owner/repo
    let parts: Vec<&str> = reference.split('/').collect();
    if parts.len() == 2 && !parts[0].is_empty() && !parts[1].is_empty() {
        return Ok((
            parts[0].to_string(),
            parts[1].trim_end_matches(".git").to_string(),
        ));
    }

    Err(Error::Parse(format!(
        "Invalid repository format: {}. Expected owner/repo",
        reference
    )))
}
