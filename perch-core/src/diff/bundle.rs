//! Normalized representation of a pull request's changes

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A single changed file within a pull request diff
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    /// Path of the file on the new side of the diff
    pub path: String,

    /// Patch text for this file (hunk headers and content lines)
    pub patch: String,

    /// Number of added lines
    pub added: u32,

    /// Number of removed lines
    pub removed: u32,

    /// New-side line numbers visible in hunks (added and context lines)
    pub(crate) new_lines: BTreeSet<u64>,
}

impl FileChange {
    /// Create an empty change record for a path
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            patch: String::new(),
            added: 0,
            removed: 0,
            new_lines: BTreeSet::new(),
        }
    }

    /// Check whether a new-side line number falls within a hunk
    ///
    /// Inline comments may only reference lines visible in the diff;
    /// anything else is rejected by GitHub as out of context.
    pub fn contains_line(&self, line: u64) -> bool {
        self.new_lines.contains(&line)
    }

    /// Whether the file has any visible hunk content
    pub fn has_hunks(&self) -> bool {
        !self.patch.is_empty()
    }
}

/// Normalized diff for a single pull request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffBundle {
    /// Repository in `owner/repo` form
    pub repository: String,

    /// Pull request number
    pub pr_number: u64,

    /// Head commit the diff was taken at
    pub head_sha: String,

    /// URL of the pull request
    pub pr_url: String,

    /// Concatenated unified diff as fetched from the origin
    pub diff: String,

    /// Ordered per-file change records
    pub files: Vec<FileChange>,
}

impl DiffBundle {
    /// Look up a changed file by path
    pub fn file(&self, path: &str) -> Option<&FileChange> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Check whether (path, line) is visible in the diff context
    pub fn contains(&self, path: &str, line: u64) -> bool {
        self.file(path).is_some_and(|f| f.contains_line(line))
    }
}
