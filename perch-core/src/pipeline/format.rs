//! Format stage
//!
//! Turns raw findings into a [`ReviewResult`]: filters findings against
//! the diff context, deduplicates by location, renders comment bodies,
//! and derives the overall disposition. The output is deterministic
//! for a given input, so re-running the stage yields identical bytes.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use tracing::warn;

use crate::diff::DiffBundle;
use crate::review::{Disposition, Finding, InlineComment, ReviewResult, Severity};

/// Build the final review from analyzer findings
///
/// Line-addressable findings whose (path, line) falls inside a diff
/// hunk become inline comments, deduplicated by location with the
/// highest severity winning. Findings referencing lines outside the
/// diff context are dropped with a warning; GitHub rejects such
/// anchors, and a mislocated finding cannot be trusted to describe the
/// change under review. File-level findings (no line number) are kept
/// and rendered in the summary body.
pub fn format_review(
    bundle: &DiffBundle,
    findings: Vec<Finding>,
    max_inline_comments: usize,
) -> ReviewResult {
    // Keyed by (path, line). Dedup leaves one finding per location, so
    // rendering in location order carries the same information as the
    // analyzer's emission order while staying stable across runs.
    let mut anchored: BTreeMap<(String, u64), Finding> = BTreeMap::new();
    let mut file_level: Vec<Finding> = Vec::new();

    for finding in findings {
        let Some(line) = finding.line_number else {
            file_level.push(finding);
            continue;
        };

        if !bundle.contains(&finding.file_path, line) {
            warn!(
                path = %finding.file_path,
                line,
                "Dropping finding outside the diff context"
            );
            continue;
        }

        let key = (finding.file_path.clone(), line);
        match anchored.get(&key) {
            // First finding at a location wins a severity tie
            Some(existing) if existing.severity >= finding.severity => {}
            _ => {
                anchored.insert(key, finding);
            }
        }
    }

    let mut retained: Vec<Finding> = anchored.into_values().collect();
    retained.extend(file_level.iter().cloned());

    let degraded = retained.iter().any(|f| f.degraded);
    let disposition = Disposition::from_findings(&retained);

    let mut inline_comments: Vec<InlineComment> = retained
        .iter()
        .filter(|f| {
            f.line_number
                .is_some_and(|line| bundle.contains(&f.file_path, line))
        })
        .map(|f| InlineComment {
            path: f.file_path.clone(),
            // in-context filter above guarantees the line is present
            line: f.line_number.unwrap_or_default(),
            body: render_comment(f),
        })
        .collect();

    let overflow = inline_comments.len().saturating_sub(max_inline_comments);
    if overflow > 0 {
        warn!(overflow, "Truncating inline comments to the configured cap");
        inline_comments.truncate(max_inline_comments);
    }

    let summary = render_summary(&retained, &file_level, degraded, overflow);

    ReviewResult {
        summary,
        disposition,
        degraded,
        findings: retained,
        inline_comments,
    }
}

/// Render the body of a single inline comment
fn render_comment(finding: &Finding) -> String {
    let mut body = format!(
        "{} **{}** ({}): {}",
        finding.severity.marker(),
        finding.severity,
        finding.category,
        finding.description
    );

    if let Some(excerpt) = &finding.code_excerpt {
        let _ = write!(body, "\n\n```\n{}\n```", excerpt.trim_end());
    }
    if let Some(suggestion) = &finding.suggestion {
        let _ = write!(body, "\n\n**Suggestion:** {suggestion}");
    }

    body
}

/// Render the top-level review summary body
fn render_summary(
    retained: &[Finding],
    file_level: &[Finding],
    degraded: bool,
    overflow: usize,
) -> String {
    let mut summary = String::from("## Automated Review\n\n");

    if retained.is_empty() {
        summary.push_str("No issues found in the changed files.\n");
        return summary;
    }

    let mut counts: BTreeMap<Severity, usize> = BTreeMap::new();
    for finding in retained {
        *counts.entry(finding.severity).or_default() += 1;
    }

    let _ = writeln!(
        summary,
        "{} finding(s) across the changed files:",
        retained.len()
    );
    // Highest severity first
    for (severity, count) in counts.iter().rev() {
        let _ = writeln!(summary, "- {} {}: {}", severity.marker(), severity, count);
    }

    if degraded {
        summary.push_str(
            "\n_Some findings were recovered from malformed analyzer output and may be incomplete._\n",
        );
    }

    if overflow > 0 {
        let _ = writeln!(
            summary,
            "\n{overflow} additional inline comment(s) were omitted to keep the review readable."
        );
    }

    if !file_level.is_empty() {
        summary.push_str("\n### File-level findings\n\n");
        for finding in file_level {
            let _ = writeln!(
                summary,
                "- {} **{}** `{}`: {}",
                finding.severity.marker(),
                finding.severity,
                finding.file_path,
                finding.description
            );
        }
    }

    summary
}
