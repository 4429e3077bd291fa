//! Unified diff parser
//!
//! Parses `git diff` output into [`FileChange`] records, tracking which
//! new-side line numbers are visible in hunks. Line tracking is what
//! allows the Format stage and the delivery engine to reject findings
//! that reference lines outside the diff context.

use tracing::debug;

use super::FileChange;

/// File extensions that never carry reviewable source
const BINARY_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "ico", "bmp", "webp", "pdf", "zip", "gz", "tar", "bz2", "xz",
    "7z", "woff", "woff2", "ttf", "eot", "otf", "so", "dylib", "dll", "exe", "bin", "jar",
    "class", "o", "a", "wasm", "pyc",
];

/// Lockfiles and other generated manifests excluded from analysis
const GENERATED_FILES: &[&str] = &[
    "Cargo.lock",
    "package-lock.json",
    "yarn.lock",
    "pnpm-lock.yaml",
    "poetry.lock",
    "Pipfile.lock",
    "Gemfile.lock",
    "composer.lock",
    "go.sum",
];

/// Path segments indicating vendored or build output
const IGNORED_SEGMENTS: &[&str] = &["vendor", "node_modules", "dist", "target", "third_party"];

/// Check whether a changed file is eligible for analysis
///
/// Filters binary assets, lockfiles, vendored trees, and minified
/// sources by extension/path heuristic.
pub fn is_eligible(path: &str) -> bool {
    let file_name = path.rsplit('/').next().unwrap_or(path);

    if GENERATED_FILES.contains(&file_name) {
        return false;
    }

    if path
        .split('/')
        .any(|segment| IGNORED_SEGMENTS.contains(&segment))
    {
        return false;
    }

    if file_name.ends_with(".min.js") || file_name.ends_with(".min.css") {
        return false;
    }

    match file_name.rsplit_once('.') {
        Some((_, ext)) => !BINARY_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()),
        None => true,
    }
}

/// Parse a unified diff into per-file change records
///
/// Binary files and deleted files (no new-side hunks) are dropped.
pub fn parse_unified_diff(diff: &str) -> Vec<FileChange> {
    let mut files: Vec<FileChange> = Vec::new();
    let mut current: Option<FileChange> = None;
    // New-side line number of the next hunk content line, if inside a hunk
    let mut new_line: Option<u64> = None;

    for line in diff.lines() {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            if let Some(file) = current.take().filter(FileChange::has_hunks) {
                files.push(file);
            }
            new_line = None;
            current = parse_file_header(rest).map(FileChange::new);
            continue;
        }

        let Some(file) = current.as_mut() else {
            continue;
        };

        if line.starts_with("Binary files") {
            current = None;
            continue;
        }

        // File metadata lines between the header and the first hunk
        if line.starts_with("index ")
            || line.starts_with("new file")
            || line.starts_with("deleted file")
            || line.starts_with("old mode")
            || line.starts_with("new mode")
            || line.starts_with("similarity index")
            || line.starts_with("rename from")
            || line.starts_with("rename to")
            || line.starts_with("--- ")
            || line.starts_with("+++ ")
        {
            continue;
        }

        if let Some(start) = parse_hunk_header(line) {
            new_line = Some(start);
            file.patch.push_str(line);
            file.patch.push('\n');
            continue;
        }

        let Some(n) = new_line.as_mut() else {
            continue;
        };

        file.patch.push_str(line);
        file.patch.push('\n');

        // "\ No newline at end of file" is a marker, not hunk content;
        // counting it would shift every following new-side line number
        if line.starts_with('\\') {
            continue;
        }

        if line.starts_with('+') {
            file.added += 1;
            file.new_lines.insert(*n);
            *n += 1;
        } else if line.starts_with('-') {
            file.removed += 1;
        } else {
            // Context line, visible on both sides
            file.new_lines.insert(*n);
            *n += 1;
        }
    }

    if let Some(file) = current.take().filter(FileChange::has_hunks) {
        files.push(file);
    }

    debug!(file_count = files.len(), "Parsed unified diff");
    files
}

/// Extract the new-side path from `a/old b/new`
fn parse_file_header(rest: &str) -> Option<String> {
    rest.split_whitespace()
        .last()
        .and_then(|p| p.strip_prefix("b/"))
        .map(str::to_string)
}

/// Parse `@@ -a,b +c,d @@` and return the new-side start line `c`
fn parse_hunk_header(line: &str) -> Option<u64> {
    let rest = line.strip_prefix("@@ ")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let new_range = ranges.split_whitespace().find(|r| r.starts_with('+'))?;
    let new_range = new_range.strip_prefix('+')?;
    let start = match new_range.split_once(',') {
        Some((start, _)) => start,
        None => new_range,
    };
    start.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_DIFF: &str = "\
diff --git a/src/auth.rs b/src/auth.rs
index 1234567..89abcde 100644
--- a/src/auth.rs
+++ b/src/auth.rs
@@ -5,7 +5,9 @@ fn check(token: &str) -> bool {
 let trimmed = token.trim();
-    if trimmed.len() > 0 {
+    if !trimmed.is_empty() {
+        log_attempt(trimmed);
         return validate(trimmed);
     }
     false
 }
diff --git a/assets/logo.png b/assets/logo.png
Binary files a/assets/logo.png and b/assets/logo.png differ
diff --git a/README.md b/README.md
index aaa..bbb 100644
--- a/README.md
+++ b/README.md
@@ -1,3 +1,4 @@
 # Project
+New badge line.

 Intro text.
";

    #[test]
    fn test_parse_files_and_counts() {
        let files = parse_unified_diff(SAMPLE_DIFF);
        assert_eq!(files.len(), 2);

        let auth = &files[0];
        assert_eq!(auth.path, "src/auth.rs");
        assert_eq!(auth.added, 2);
        assert_eq!(auth.removed, 1);

        let readme = &files[1];
        assert_eq!(readme.path, "README.md");
        assert_eq!(readme.added, 1);
        assert_eq!(readme.removed, 0);
    }

    #[test]
    fn test_new_side_line_tracking() {
        let files = parse_unified_diff(SAMPLE_DIFF);
        let auth = &files[0];

        // Hunk covers new-side lines 5..=13: context line 5, added 6-7,
        // then context lines continuing from 8.
        assert!(auth.contains_line(5));
        assert!(auth.contains_line(6));
        assert!(auth.contains_line(7));
        assert!(auth.contains_line(8));
        assert!(!auth.contains_line(4));
        assert!(!auth.contains_line(50));
    }

    #[test]
    fn test_binary_files_dropped() {
        let files = parse_unified_diff(SAMPLE_DIFF);
        assert!(!files.iter().any(|f| f.path.ends_with(".png")));
    }

    #[test]
    fn test_hunk_header_parsing() {
        assert_eq!(parse_hunk_header("@@ -5,7 +5,9 @@ fn check() {"), Some(5));
        assert_eq!(parse_hunk_header("@@ -1 +1 @@"), Some(1));
        assert_eq!(parse_hunk_header("@@ -0,0 +1,20 @@"), Some(1));
        assert_eq!(parse_hunk_header("not a hunk"), None);
    }

    #[test]
    fn test_no_newline_marker_not_counted_as_content() {
        let diff = "\
diff --git a/notes.txt b/notes.txt
index aaa..bbb 100644
--- a/notes.txt
+++ b/notes.txt
@@ -1,1 +1,2 @@
-old line
\\ No newline at end of file
+first line
+second line
\\ No newline at end of file
";
        let files = parse_unified_diff(diff);
        assert_eq!(files.len(), 1);
        let file = &files[0];

        assert_eq!(file.added, 2);
        assert_eq!(file.removed, 1);
        // The new file has exactly two lines
        assert!(file.contains_line(1));
        assert!(file.contains_line(2));
        assert!(!file.contains_line(3));
    }

    #[test]
    fn test_empty_diff() {
        assert!(parse_unified_diff("").is_empty());
        assert!(parse_unified_diff("   \n").is_empty());
    }

    #[test]
    fn test_eligibility_heuristics() {
        assert!(is_eligible("src/main.rs"));
        assert!(is_eligible("docs/guide.md"));
        assert!(is_eligible("Makefile"));

        assert!(!is_eligible("Cargo.lock"));
        assert!(!is_eligible("web/package-lock.json"));
        assert!(!is_eligible("assets/logo.PNG"));
        assert!(!is_eligible("vendor/lib/util.rs"));
        assert!(!is_eligible("node_modules/left-pad/index.js"));
        assert!(!is_eligible("static/app.min.js"));
    }
}
