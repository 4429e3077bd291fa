//! External command analyzer
//!
//! The analysis capability is an external executable: it receives a
//! JSON request on stdin describing the pull request and its eligible
//! files, and writes a findings payload to stdout. Exit status and
//! stdout are the whole contract; anything on stderr is logged.

use std::process::Stdio;

use async_trait::async_trait;
use perch_core::analyzer::{Analyzer, AnalyzerError, AnalyzerOutput};
use perch_core::config::AnalyzerConfig;
use perch_core::diff::{DiffBundle, FileChange};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Analyzer backed by a subprocess
pub struct CommandAnalyzer {
    command: String,
    args: Vec<String>,
    name: String,
}

impl CommandAnalyzer {
    pub fn new(config: &AnalyzerConfig) -> Self {
        let name = config
            .command
            .rsplit('/')
            .next()
            .unwrap_or(&config.command)
            .to_string();
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
            name,
        }
    }

    fn build_request(bundle: &DiffBundle, files: &[FileChange]) -> serde_json::Value {
        json!({
            "repository": bundle.repository,
            "pr_number": bundle.pr_number,
            "head_sha": bundle.head_sha,
            "files": files.iter().map(|f| {
                json!({
                    "path": f.path,
                    "patch": f.patch,
                    "added": f.added,
                    "removed": f.removed,
                })
            }).collect::<Vec<_>>(),
        })
    }
}

#[async_trait]
impl Analyzer for CommandAnalyzer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        bundle: &DiffBundle,
        files: &[FileChange],
    ) -> Result<AnalyzerOutput, AnalyzerError> {
        let request = Self::build_request(bundle, files);
        let request_bytes = serde_json::to_vec(&request)
            .map_err(|e| AnalyzerError::Unavailable(format!("failed to encode request: {e}")))?;

        debug!(
            command = %self.command,
            file_count = files.len(),
            "Spawning analyzer"
        );

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                AnalyzerError::Unavailable(format!("failed to spawn {}: {e}", self.command))
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&request_bytes)
                .await
                .map_err(|e| AnalyzerError::Unavailable(format!("failed to write request: {e}")))?;
            // Close stdin so the analyzer sees EOF
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AnalyzerError::Unavailable(format!("analyzer did not exit: {e}")))?;

        if !output.stderr.is_empty() {
            warn!(
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "Analyzer wrote to stderr"
            );
        }

        if !output.status.success() {
            return Err(AnalyzerError::Unavailable(format!(
                "analyzer exited with {}",
                output.status
            )));
        }

        let payload = String::from_utf8(output.stdout)
            .map_err(|e| AnalyzerError::Malformed(format!("non-UTF-8 output: {e}")))?;

        Ok(AnalyzerOutput {
            payload,
            usage_units: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use perch_core::diff::parse_unified_diff;

    const DIFF: &str = "\
diff --git a/src/lib.rs b/src/lib.rs
index aaa..bbb 100644
--- a/src/lib.rs
+++ b/src/lib.rs
@@ -1,2 +1,3 @@
 fn main() {
+    println!(\"hi\");
 }
";

    fn bundle() -> DiffBundle {
        DiffBundle {
            repository: "owner/repo".to_string(),
            pr_number: 1,
            head_sha: "abc".to_string(),
            pr_url: "https://github.com/owner/repo/pull/1".to_string(),
            diff: DIFF.to_string(),
            files: parse_unified_diff(DIFF),
        }
    }

    #[test]
    fn test_name_is_command_basename() {
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "/usr/local/bin/review-bot".to_string(),
            args: vec![],
        });
        assert_eq!(analyzer.name(), "review-bot");
    }

    #[test]
    fn test_request_shape() {
        let bundle = bundle();
        let request = CommandAnalyzer::build_request(&bundle, &bundle.files);
        assert_eq!(request["repository"], "owner/repo");
        assert_eq!(request["files"][0]["path"], "src/lib.rs");
        assert_eq!(request["files"][0]["added"], 1);
    }

    #[tokio::test]
    async fn test_cat_round_trips_request() {
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "cat".to_string(),
            args: vec![],
        });
        let bundle = bundle();
        let output = analyzer.analyze(&bundle, &bundle.files).await.unwrap();
        let echoed: serde_json::Value = serde_json::from_str(&output.payload).unwrap();
        assert_eq!(echoed["pr_number"], 1);
    }

    #[tokio::test]
    async fn test_missing_command_is_unavailable() {
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "/nonexistent/perch-analyzer".to_string(),
            args: vec![],
        });
        let bundle = bundle();
        let err = analyzer.analyze(&bundle, &bundle.files).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Unavailable(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_unavailable() {
        let analyzer = CommandAnalyzer::new(&AnalyzerConfig {
            command: "false".to_string(),
            args: vec![],
        });
        let bundle = bundle();
        let err = analyzer.analyze(&bundle, &bundle.files).await.unwrap_err();
        assert!(matches!(err, AnalyzerError::Unavailable(_)));
    }
}
