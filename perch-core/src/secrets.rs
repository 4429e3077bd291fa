//! Secrets management for Perch
//!
//! Secrets are stored separately from configuration to avoid accidental
//! sharing. The secrets file is located at `~/.config/perch/secrets.toml`
//! and must have restrictive permissions (0600 on Unix).
//!
//! Loading priority:
//! 1. Environment variables (GITHUB_TOKEN, PERCH_WEBHOOK_SECRET)
//! 2. Secrets file (~/.config/perch/secrets.toml)

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{Error, Result};

/// Secrets structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Secrets {
    /// GitHub configuration
    pub github: GitHubSecrets,
    /// Webhook configuration
    pub webhook: WebhookSecrets,
}

/// GitHub-related secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubSecrets {
    /// GitHub Personal Access Token
    pub token: Option<String>,
}

/// Webhook-related secrets
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookSecrets {
    /// Shared secret used to verify webhook signatures
    pub secret: Option<String>,
}

impl Secrets {
    /// Load secrets from the default location
    ///
    /// Returns default (empty) secrets if file doesn't exist
    pub fn load() -> Result<Self> {
        let secrets_path = Self::default_secrets_path();

        if let Some(path) = secrets_path {
            if path.exists() {
                return Self::load_from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Load secrets from a specific file with permission checking
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        // Check file permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let metadata = std::fs::metadata(path).map_err(Error::Io)?;
            let mode = metadata.permissions().mode();

            // Check if file is readable by group or others (mode & 0o077)
            if mode & 0o077 != 0 {
                return Err(Error::Config(format!(
                    "Secrets file {} has insecure permissions {:o}. \
                     Please run: chmod 600 {}",
                    path.display(),
                    mode & 0o777,
                    path.display()
                )));
            }

            debug!(path = %path.display(), mode = format!("{:o}", mode & 0o777), "Secrets file permissions OK");
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let mut secrets: Secrets = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse secrets: {}", e)))?;

        // Trim whitespace from stored values
        if let Some(ref mut token) = secrets.github.token {
            *token = token.trim().to_string();
        }
        if let Some(ref mut secret) = secrets.webhook.secret {
            *secret = secret.trim().to_string();
        }

        Ok(secrets)
    }

    /// Get the default secrets file path
    ///
    /// Returns `~/.config/perch/secrets.toml` on Unix
    pub fn default_secrets_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("perch").join("secrets.toml"))
    }

    /// Get GitHub token with environment variable override
    ///
    /// Priority: GITHUB_TOKEN env var > secrets file
    pub fn github_token(&self) -> Option<String> {
        // Check environment variable first
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            let token = token.trim().to_string();
            if !token.is_empty() {
                debug!("Using GitHub token from GITHUB_TOKEN environment variable");
                return Some(token);
            }
        }

        // Fall back to secrets file
        if let Some(ref token) = self.github.token {
            if !token.is_empty() {
                debug!("Using GitHub token from secrets file");
                return Some(token.clone());
            }
        }

        None
    }

    /// Get the webhook secret with environment variable override
    ///
    /// Priority: PERCH_WEBHOOK_SECRET env var > secrets file
    pub fn webhook_secret(&self) -> Option<String> {
        if let Ok(secret) = std::env::var("PERCH_WEBHOOK_SECRET") {
            let secret = secret.trim().to_string();
            if !secret.is_empty() {
                debug!("Using webhook secret from PERCH_WEBHOOK_SECRET environment variable");
                return Some(secret);
            }
        }

        if let Some(ref secret) = self.webhook.secret {
            if !secret.is_empty() {
                debug!("Using webhook secret from secrets file");
                return Some(secret.clone());
            }
        }

        None
    }
}
