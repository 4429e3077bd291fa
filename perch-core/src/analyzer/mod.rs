//! Analyzer abstraction
//!
//! The Analyze stage hands eligible file changes to an [`Analyzer`] and
//! gets back a raw payload. [`parse_findings`] performs the strict
//! structured parse; when that fails, [`salvage_findings`] attempts a
//! tolerant reconstruction so a malformed payload degrades the review
//! instead of failing it.

mod salvage;

pub use salvage::salvage_findings;

use async_trait::async_trait;
use serde::Deserialize;

use crate::diff::{DiffBundle, FileChange};
use crate::review::{Finding, Severity};

/// Raw output of one analyzer invocation
#[derive(Debug, Clone)]
pub struct AnalyzerOutput {
    /// Unparsed payload as produced by the analyzer
    pub payload: String,

    /// Resource usage reported by the analyzer, when available
    pub usage_units: Option<i64>,
}

/// Failure modes of an analyzer invocation
#[derive(Debug, thiserror::Error)]
pub enum AnalyzerError {
    #[error("analyzer timed out")]
    Timeout,

    #[error("analyzer rate limited")]
    RateLimited,

    #[error("analyzer unavailable: {0}")]
    Unavailable(String),

    #[error("analyzer produced malformed output: {0}")]
    Malformed(String),
}

impl AnalyzerError {
    /// Whether a retry could plausibly succeed
    ///
    /// Only timeouts and rate limits qualify; an unavailable or
    /// malformed analyzer will not recover within one retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, AnalyzerError::Timeout | AnalyzerError::RateLimited)
    }
}

/// Produces review findings for a set of changed files
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Stable name recorded on findings and stage executions
    fn name(&self) -> &str;

    /// Analyze the eligible files of a pull request diff
    async fn analyze(
        &self,
        bundle: &DiffBundle,
        files: &[FileChange],
    ) -> Result<AnalyzerOutput, AnalyzerError>;
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    severity: String,
    file_path: String,
    #[serde(default)]
    line_number: Option<u64>,
    #[serde(default)]
    code_excerpt: Option<String>,
    description: String,
    #[serde(default)]
    suggestion: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPayload {
    findings: Vec<RawFinding>,
}

/// Strictly parse an analyzer payload into findings
///
/// Accepts the payload wrapped in a Markdown code fence, since chat
/// oriented analyzers routinely emit one. Unknown severities reject the
/// payload rather than being silently coerced.
pub fn parse_findings(payload: &str, agent: &str) -> Result<Vec<Finding>, AnalyzerError> {
    let body = strip_code_fence(payload);

    let raw: RawPayload = serde_json::from_str(body)
        .map_err(|e| AnalyzerError::Malformed(format!("invalid JSON: {e}")))?;

    let mut findings = Vec::with_capacity(raw.findings.len());
    for item in raw.findings {
        let severity = Severity::parse(&item.severity)
            .ok_or_else(|| AnalyzerError::Malformed(format!("unknown severity: {}", item.severity)))?;
        if item.file_path.trim().is_empty() {
            return Err(AnalyzerError::Malformed("finding with empty file path".into()));
        }

        findings.push(Finding {
            agent: agent.to_string(),
            severity,
            file_path: item.file_path,
            line_number: item.line_number,
            code_excerpt: item.code_excerpt,
            description: item.description,
            suggestion: item.suggestion,
            category: item.category.unwrap_or_else(|| "general".to_string()),
            degraded: false,
        });
    }

    Ok(findings)
}

/// Strip a surrounding ```json / ``` fence, if present
fn strip_code_fence(payload: &str) -> &str {
    let trimmed = payload.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip an optional language tag on the fence line
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => return trimmed,
    };
    rest.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}
