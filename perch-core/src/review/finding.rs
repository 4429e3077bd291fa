//! Individual review findings

use serde::{Deserialize, Serialize};

/// Severity of a finding, ordered from least to most severe
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }

    /// Parse a severity from its stored/wire form (case-insensitive)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Some(Severity::Low),
            "MEDIUM" => Some(Severity::Medium),
            "HIGH" => Some(Severity::High),
            "CRITICAL" => Some(Severity::Critical),
            _ => None,
        }
    }

    /// Emoji marker used when rendering comment bodies
    pub fn marker(&self) -> &str {
        match self {
            Severity::Low => "\u{1F7E2}",      // green circle
            Severity::Medium => "\u{1F7E1}",   // yellow circle
            Severity::High => "\u{1F7E0}",     // orange circle
            Severity::Critical => "\u{1F534}", // red circle
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single identified issue
///
/// File path is always present; line number is optional because some
/// findings are file-level rather than line-addressable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the stage/agent that produced this finding
    pub agent: String,

    /// Severity of the issue
    pub severity: Severity,

    /// Path of the affected file
    pub file_path: String,

    /// New-side line number, when the finding is line-addressable
    pub line_number: Option<u64>,

    /// Offending code excerpt, when available
    pub code_excerpt: Option<String>,

    /// Explanation of the problem
    pub description: String,

    /// Suggested fix, when available
    pub suggestion: Option<String>,

    /// Category tag (e.g. "security", "performance")
    pub category: String,

    /// True when recovered via degraded-mode reconstruction
    pub degraded: bool,
}

impl Finding {
    /// Create a finding with the required fields
    pub fn new(
        agent: impl Into<String>,
        severity: Severity,
        file_path: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            severity,
            file_path: file_path.into(),
            line_number: None,
            code_excerpt: None,
            description: description.into(),
            suggestion: None,
            category: category.into(),
            degraded: false,
        }
    }

    /// Set the line number
    pub fn at_line(mut self, line: u64) -> Self {
        self.line_number = Some(line);
        self
    }

    /// Set the fix suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Mark the finding as degraded-mode output
    pub fn degraded(mut self) -> Self {
        self.degraded = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
    }

    #[test]
    fn test_severity_parse_round_trip() {
        for sev in [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ] {
            assert_eq!(Severity::parse(sev.as_str()), Some(sev));
        }
        assert_eq!(Severity::parse("high"), Some(Severity::High));
        assert_eq!(Severity::parse(" critical "), Some(Severity::Critical));
        assert_eq!(Severity::parse("urgent"), None);
    }

    #[test]
    fn test_severity_serde_wire_form() {
        let json = serde_json::to_string(&Severity::High).unwrap();
        assert_eq!(json, "\"HIGH\"");
        let sev: Severity = serde_json::from_str("\"CRITICAL\"").unwrap();
        assert_eq!(sev, Severity::Critical);
    }

    #[test]
    fn test_finding_builder() {
        let finding = Finding::new(
            "analyzer",
            Severity::High,
            "src/auth.rs",
            "Hardcoded credential",
            "security",
        )
        .at_line(42)
        .with_suggestion("Load the credential from the environment");

        assert_eq!(finding.line_number, Some(42));
        assert!(finding.suggestion.is_some());
        assert!(!finding.degraded);
    }
}
