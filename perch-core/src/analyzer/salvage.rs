//! Degraded-mode reconstruction of malformed analyzer output
//!
//! When the strict JSON parse fails, scan the payload line by line for
//! `path:line` references followed by prose. Anything recovered is
//! marked degraded and assigned Medium severity, since the original
//! severity cannot be trusted.

use tracing::debug;

use crate::review::{Finding, Severity};

/// Attempt to recover findings from an unparseable payload
///
/// Returns an empty vector when nothing recognizable is present, in
/// which case the caller treats the stage as failed.
pub fn salvage_findings(payload: &str, agent: &str) -> Vec<Finding> {
    let mut findings = Vec::new();

    for line in payload.lines() {
        let Some((path, line_no, comment)) = extract_reference(line) else {
            continue;
        };

        findings.push(
            Finding::new(agent, Severity::Medium, path, comment, "general")
                .at_line(line_no)
                .degraded(),
        );
    }

    debug!(
        recovered = findings.len(),
        agent = %agent,
        "Salvaged findings from malformed payload"
    );
    findings
}

/// Find a `path:line` token in a line and return it with trailing prose
///
/// The path must contain a file extension or path separator so bare
/// `word:number` text (timestamps, ratios) is not misread.
fn extract_reference(line: &str) -> Option<(String, u64, String)> {
    for (idx, token) in line.split_whitespace().enumerate() {
        let token = token.trim_matches(|c: char| {
            !c.is_ascii_alphanumeric() && c != '/' && c != '.' && c != '_' && c != '-' && c != ':'
        });
        let Some((path, rest)) = token.split_once(':') else {
            continue;
        };
        if !path.contains('/') && !path.contains('.') {
            continue;
        }
        // Tolerate `path:line:col` by taking the first number
        let Ok(line_no) = rest.split(':').next().unwrap_or(rest).parse::<u64>() else {
            continue;
        };
        if line_no == 0 {
            continue;
        }

        let comment: String = line
            .split_whitespace()
            .skip(idx + 1)
            .collect::<Vec<_>>()
            .join(" ");
        let comment = comment
            .trim_start_matches(['-', ':', '\u{2013}', ' '])
            .trim()
            .to_string();
        if comment.is_empty() {
            continue;
        }

        return Some((path.to_string(), line_no, comment));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salvage_path_line_comment() {
        let payload = "\
Here is what I found:
- src/auth.rs:42 - token compared without constant time
- src/db.rs:7: query built by string concatenation
Nothing else stood out.";

        let findings = salvage_findings(payload, "analyzer");
        assert_eq!(findings.len(), 2);

        assert_eq!(findings[0].file_path, "src/auth.rs");
        assert_eq!(findings[0].line_number, Some(42));
        assert_eq!(findings[0].severity, Severity::Medium);
        assert!(findings[0].degraded);
        assert!(findings[0].description.contains("constant time"));

        assert_eq!(findings[1].file_path, "src/db.rs");
        assert_eq!(findings[1].line_number, Some(7));
    }

    #[test]
    fn test_salvage_ignores_bare_prose() {
        let payload = "The ratio is 3:1 and the build took 02:15 total.";
        assert!(salvage_findings(payload, "analyzer").is_empty());
    }

    #[test]
    fn test_salvage_empty_payload() {
        assert!(salvage_findings("", "analyzer").is_empty());
    }

    #[test]
    fn test_salvage_requires_trailing_comment() {
        let payload = "src/auth.rs:42";
        assert!(salvage_findings(payload, "analyzer").is_empty());
    }
}
