//! Configuration management for Perch
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (PERCH_*)
//! 3. Config file (~/.config/perch/config.toml)
//! 4. Default values

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Webhook server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the webhook server binds to
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8700".to_string(),
        }
    }
}

/// Review pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Skip review for draft pull requests
    pub skip_drafts: bool,

    /// Timeout for the analyze stage (external analyzer invocation)
    #[serde(with = "humantime_serde")]
    pub stage_timeout: Duration,

    /// Timeout for fetching the PR diff
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,

    /// Timeout for posting the review back to GitHub
    #[serde(with = "humantime_serde")]
    pub delivery_timeout: Duration,

    /// Maximum number of inline comments per review submission
    pub max_inline_comments: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            skip_drafts: true,
            stage_timeout: Duration::from_secs(120),
            fetch_timeout: Duration::from_secs(30),
            delivery_timeout: Duration::from_secs(30),
            max_inline_comments: 50,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file (defaults to the cache dir)
    pub path: Option<PathBuf>,
}

/// External analyzer configuration
///
/// The analysis capability is an external command that receives a JSON
/// request on stdin and writes a findings payload to stdout.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Analyzer executable
    pub command: String,

    /// Extra arguments passed to the analyzer
    pub args: Vec<String>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            command: "perch-analyzer".to_string(),
            args: Vec::new(),
        }
    }
}

/// GitHub API configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// Base URL of the GitHub REST API
    pub api_base: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".to_string(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Webhook server configuration
    pub server: ServerConfig,
    /// Review pipeline configuration
    pub review: ReviewConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// External analyzer configuration
    pub analyzer: AnalyzerConfig,
    /// GitHub API configuration
    pub github: GitHubConfig,
}

impl Config {
    /// Load configuration from the default config file location
    ///
    /// Returns default config if file doesn't exist
    pub fn load() -> Result<Self> {
        let config_path = Self::default_config_path();

        if let Some(path) = config_path {
            if path.exists() {
                return Ok(Self::load_from_file(&path)?.with_env_overrides());
            }
        }

        Ok(Self::default().with_env_overrides())
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &PathBuf) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))
    }

    /// Get the default config file path
    ///
    /// Returns `~/.config/perch/config.toml` on Unix
    pub fn default_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("perch").join("config.toml"))
    }

    /// Apply environment variable overrides
    ///
    /// Supported variables:
    /// - PERCH_BIND_ADDR: Webhook server bind address
    /// - PERCH_DB_PATH: SQLite database path
    /// - PERCH_ANALYZER: Analyzer command
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(bind_addr) = std::env::var("PERCH_BIND_ADDR") {
            self.server.bind_addr = bind_addr;
        }
        if let Ok(db_path) = std::env::var("PERCH_DB_PATH") {
            self.database.path = Some(PathBuf::from(db_path));
        }
        if let Ok(command) = std::env::var("PERCH_ANALYZER") {
            self.analyzer.command = command;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8700");
        assert!(config.review.skip_drafts);
        assert_eq!(config.review.max_inline_comments, 50);
        assert_eq!(config.github.api_base, "https://api.github.com");
        assert!(config.database.path.is_none());
    }

    #[test]
    fn test_parse_config_with_durations() {
        let toml_str = r#"
            [server]
            bind_addr = "127.0.0.1:9000"

            [review]
            skip_drafts = false
            stage_timeout = "3m"
            fetch_timeout = "10s"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert!(!config.review.skip_drafts);
        assert_eq!(config.review.stage_timeout, Duration::from_secs(180));
        assert_eq!(config.review.fetch_timeout, Duration::from_secs(10));
        // Unspecified fields keep defaults
        assert_eq!(config.review.delivery_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analyzer.command, "perch-analyzer");
        assert_eq!(config.review.stage_timeout, Duration::from_secs(120));
    }
}
