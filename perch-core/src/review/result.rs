//! Formatted review output

use serde::{Deserialize, Serialize};

use super::{Finding, Severity};

/// Overall review verdict derived from finding severities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Approve,
    RequestChanges,
    Comment,
}

impl Disposition {
    /// Derive the verdict from a set of findings
    ///
    /// Critical or High findings request changes, anything else with at
    /// least one finding comments, an empty set approves.
    pub fn from_findings(findings: &[Finding]) -> Self {
        if findings.is_empty() {
            return Disposition::Approve;
        }
        if findings
            .iter()
            .any(|f| f.severity >= Severity::High)
        {
            Disposition::RequestChanges
        } else {
            Disposition::Comment
        }
    }

    /// GitHub review event name for this verdict
    pub fn as_event(&self) -> &str {
        match self {
            Disposition::Approve => "APPROVE",
            Disposition::RequestChanges => "REQUEST_CHANGES",
            Disposition::Comment => "COMMENT",
        }
    }
}

/// An inline comment anchored to a diff line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineComment {
    /// Path of the file the comment attaches to
    pub path: String,

    /// New-side line number within a diff hunk
    pub line: u64,

    /// Rendered comment body
    pub body: String,
}

/// Final formatted review, ready for delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    /// Review summary body posted with the verdict
    pub summary: String,

    /// Overall verdict
    pub disposition: Disposition,

    /// True when any finding came from degraded-mode reconstruction
    pub degraded: bool,

    /// Findings that survived filtering and deduplication
    pub findings: Vec<Finding>,

    /// Inline comments, all anchored to lines visible in the diff
    pub inline_comments: Vec<InlineComment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(severity: Severity) -> Finding {
        Finding::new("analyzer", severity, "src/lib.rs", "issue", "general")
    }

    #[test]
    fn test_disposition_empty_approves() {
        assert_eq!(Disposition::from_findings(&[]), Disposition::Approve);
    }

    #[test]
    fn test_disposition_high_requests_changes() {
        let findings = vec![finding(Severity::Low), finding(Severity::High)];
        assert_eq!(
            Disposition::from_findings(&findings),
            Disposition::RequestChanges
        );
        let findings = vec![finding(Severity::Critical)];
        assert_eq!(
            Disposition::from_findings(&findings),
            Disposition::RequestChanges
        );
    }

    #[test]
    fn test_disposition_low_medium_comments() {
        let findings = vec![finding(Severity::Low), finding(Severity::Medium)];
        assert_eq!(Disposition::from_findings(&findings), Disposition::Comment);
    }

    #[test]
    fn test_disposition_is_deterministic() {
        let findings = vec![finding(Severity::Medium), finding(Severity::Low)];
        let first = Disposition::from_findings(&findings);
        let second = Disposition::from_findings(&findings);
        assert_eq!(first, second);
    }
}
