//! Review orchestration
//!
//! The orchestrator owns the life of one review: it claims the
//! idempotency slot by creating a session row, fetches the diff, runs
//! the task graph, persists what happened, and delivers the result.
//! Session creation is the commit point for coalescing, so duplicate
//! triggers for the same pull request collapse to a single run.

use std::time::Instant;

use perch_db::{
    CreateExecution, CreateFinding, Database, SessionOutcome, SessionStatus,
};
use tracing::{error, info, warn};

use crate::analyzer::Analyzer;
use crate::config::ReviewConfig;
use crate::delivery::{DeliveryEngine, DeliveryReport, DeliveryTarget, ReviewSink};
use crate::pipeline::{PipelineOutcome, Stage, TaskGraphEngine};
use crate::provider::{DiffProvider, ProviderError};
use crate::review::{Disposition, Finding, Severity};

/// A request to review one pull request head
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    /// Repository in `owner/repo` form
    pub repository: String,

    /// Pull request number
    pub pr_number: u64,

    /// Head commit the trigger refers to
    pub head_sha: String,

    /// URL of the pull request
    pub pr_url: String,

    /// What caused the review ("initial", "synchronize", "reopened", "manual")
    pub trigger_kind: String,
}

/// How an orchestrated run ended
#[derive(Debug)]
pub enum RunOutcome {
    /// Another in-flight session holds the slot; this trigger was dropped
    Coalesced,

    /// Pipeline completed and the session is recorded as completed
    Completed {
        session_id: i64,
        disposition: Disposition,
        /// False when the review could not be delivered to the forge
        delivered: bool,
    },

    /// Pipeline or fetch failed; the session is recorded as failed
    Failed { session_id: i64, error: String },
}

/// Drives a full review from trigger to delivered result
pub struct Orchestrator<P, A, S> {
    provider: P,
    engine: TaskGraphEngine<A>,
    delivery: DeliveryEngine<S>,
    db: Database,
    config: ReviewConfig,
}

impl<P, A, S> Orchestrator<P, A, S>
where
    P: DiffProvider,
    A: Analyzer,
    S: ReviewSink,
{
    pub fn new(provider: P, analyzer: A, sink: S, db: Database, config: ReviewConfig) -> Self {
        Self {
            provider,
            engine: TaskGraphEngine::new(analyzer, config.clone()),
            delivery: DeliveryEngine::new(sink),
            db,
            config,
        }
    }

    /// Run one review end to end
    pub async fn run(&self, request: ReviewRequest) -> crate::Result<RunOutcome> {
        let started = Instant::now();

        // Commit point: winning this insert claims the pull request slot
        let session = match self
            .db
            .sessions()
            .create(perch_db::CreateSession {
                repository: request.repository.clone(),
                pr_number: request.pr_number as i64,
                head_sha: request.head_sha.clone(),
                pr_url: request.pr_url.clone(),
                trigger_kind: request.trigger_kind.clone(),
            })
            .await
        {
            Ok(session) => session,
            Err(perch_db::Error::ActiveSessionExists { .. }) => {
                info!(
                    repository = %request.repository,
                    pr_number = request.pr_number,
                    "Review already in flight, coalescing trigger"
                );
                return Ok(RunOutcome::Coalesced);
            }
            Err(e) => return Err(e.into()),
        };

        match self.execute(session.id, &request, started).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // A session stranded in an active status would hold the
                // slot and coalesce away every later trigger, so even a
                // store error mid-run gets a terminal status.
                let result = self
                    .db
                    .sessions()
                    .finalize(
                        session.id,
                        SessionStatus::Failed,
                        SessionOutcome {
                            duration_ms: Some(started.elapsed().as_millis() as i64),
                            error: Some(e.to_string()),
                            ..SessionOutcome::default()
                        },
                    )
                    .await;
                if let Err(finalize_err) = result {
                    error!(
                        session_id = session.id,
                        error = %finalize_err,
                        "Could not finalize session after mid-run error"
                    );
                }
                Err(e)
            }
        }
    }

    /// The life of a review after its session row exists
    async fn execute(
        &self,
        session_id: i64,
        request: &ReviewRequest,
        started: Instant,
    ) -> crate::Result<RunOutcome> {
        let bundle = match self.fetch(request).await {
            Ok(bundle) => bundle,
            Err(e) => {
                let message = e.to_string();
                warn!(
                    session_id,
                    error = %message,
                    "Diff fetch failed"
                );
                self.db
                    .sessions()
                    .finalize(
                        session_id,
                        SessionStatus::Failed,
                        SessionOutcome {
                            duration_ms: Some(started.elapsed().as_millis() as i64),
                            error: Some(message.clone()),
                            ..SessionOutcome::default()
                        },
                    )
                    .await?;
                return Ok(RunOutcome::Failed {
                    session_id,
                    error: message,
                });
            }
        };

        // The session runs only once its input is in hand
        self.db
            .sessions()
            .transition(session_id, SessionStatus::Pending, SessionStatus::Running)
            .await?;

        let outcome = self.engine.run(&bundle).await;
        self.persist_executions(session_id, &outcome).await?;

        let usage_units = total_usage(&outcome);
        let duration_ms = Some(started.elapsed().as_millis() as i64);

        match outcome.result {
            Some(result) => {
                self.persist_findings(session_id, &result.findings).await?;
                let (critical, high, medium, low) = severity_counts(&result.findings);
                self.db
                    .sessions()
                    .finalize(
                        session_id,
                        SessionStatus::Completed,
                        SessionOutcome {
                            disposition: Some(result.disposition.as_event().to_lowercase()),
                            summary: Some(result.summary.clone()),
                            finding_count: result.findings.len() as i64,
                            severity_critical: critical,
                            severity_high: high,
                            severity_medium: medium,
                            severity_low: low,
                            degraded: result.degraded,
                            duration_ms,
                            usage_units,
                            error: None,
                        },
                    )
                    .await?;

                // The session stays completed even when delivery fails;
                // the review is recorded locally either way.
                let target = DeliveryTarget {
                    repository: bundle.repository.clone(),
                    pr_number: bundle.pr_number,
                    head_sha: bundle.head_sha.clone(),
                };
                let delivered = match self.deliver(&target, &result).await {
                    Ok(report) => {
                        if let DeliveryReport::DeliveredWithoutInline(_) = report {
                            warn!(
                                session_id,
                                "Review delivered without inline comments"
                            );
                        }
                        true
                    }
                    Err(e) => {
                        error!(
                            session_id,
                            error = %e,
                            "Review delivery failed"
                        );
                        false
                    }
                };

                info!(
                    session_id,
                    disposition = %result.disposition.as_event(),
                    finding_count = result.findings.len(),
                    delivered,
                    "Review completed"
                );
                Ok(RunOutcome::Completed {
                    session_id,
                    disposition: result.disposition,
                    delivered,
                })
            }
            None => {
                let message = outcome
                    .error
                    .unwrap_or_else(|| format!("pipeline ended in stage {}", outcome.final_stage));
                self.db
                    .sessions()
                    .finalize(
                        session_id,
                        SessionStatus::Failed,
                        SessionOutcome {
                            duration_ms,
                            usage_units,
                            error: Some(message.clone()),
                            ..SessionOutcome::default()
                        },
                    )
                    .await?;
                warn!(session_id, error = %message, "Review failed");
                Ok(RunOutcome::Failed {
                    session_id,
                    error: message,
                })
            }
        }
    }

    async fn fetch(&self, request: &ReviewRequest) -> Result<crate::diff::DiffBundle, ProviderError> {
        match tokio::time::timeout(
            self.config.fetch_timeout,
            self.provider.fetch(&request.repository, request.pr_number),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Transient("diff fetch timed out".to_string())),
        }
    }

    async fn deliver(
        &self,
        target: &DeliveryTarget,
        result: &crate::review::ReviewResult,
    ) -> Result<DeliveryReport, crate::delivery::DeliveryError> {
        match tokio::time::timeout(
            self.config.delivery_timeout,
            self.delivery.deliver(target, result),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(crate::delivery::DeliveryError::Transient(
                "delivery timed out".to_string(),
            )),
        }
    }

    async fn persist_executions(
        &self,
        session_id: i64,
        outcome: &PipelineOutcome,
    ) -> crate::Result<()> {
        let records: Vec<CreateExecution> = outcome
            .executions
            .iter()
            .map(|e| CreateExecution {
                stage: e.stage.as_str().to_string(),
                duration_ms: e.duration_ms,
                usage_units: e.usage_units,
                raw_output: e.raw_output.clone(),
                error: e.error.clone(),
            })
            .collect();
        self.db.executions().insert_batch(session_id, &records).await?;
        Ok(())
    }

    async fn persist_findings(&self, session_id: i64, findings: &[Finding]) -> crate::Result<()> {
        if findings.is_empty() {
            return Ok(());
        }
        let records: Vec<CreateFinding> = findings
            .iter()
            .map(|f| CreateFinding {
                agent: f.agent.clone(),
                severity: f.severity.as_str().to_string(),
                file_path: f.file_path.clone(),
                line_number: f.line_number.map(|l| l as i64),
                code_excerpt: f.code_excerpt.clone(),
                description: f.description.clone(),
                suggestion: f.suggestion.clone(),
                category: f.category.clone(),
                degraded: f.degraded,
            })
            .collect();
        self.db.findings().insert_batch(session_id, &records).await?;
        Ok(())
    }
}

/// Count findings per severity, most severe first
fn severity_counts(findings: &[Finding]) -> (i64, i64, i64, i64) {
    let mut counts = (0, 0, 0, 0);
    for finding in findings {
        match finding.severity {
            Severity::Critical => counts.0 += 1,
            Severity::High => counts.1 += 1,
            Severity::Medium => counts.2 += 1,
            Severity::Low => counts.3 += 1,
        }
    }
    counts
}

fn total_usage(outcome: &PipelineOutcome) -> Option<i64> {
    let total: i64 = outcome
        .executions
        .iter()
        .filter(|e| e.stage == Stage::Analyzing)
        .filter_map(|e| e.usage_units)
        .sum();
    (total > 0).then_some(total)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;
    use crate::analyzer::{AnalyzerError, AnalyzerOutput};
    use crate::delivery::{DeliveryError, SubmissionId};
    use crate::diff::{parse_unified_diff, DiffBundle, FileChange};
    use crate::review::InlineComment;

    const DIFF: &str = "\
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
";

    fn bundle_for(repository: &str, pr_number: u64) -> DiffBundle {
        DiffBundle {
            repository: repository.to_string(),
            pr_number,
            head_sha: "abc123".to_string(),
            pr_url: format!("https://github.com/{repository}/pull/{pr_number}"),
            diff: DIFF.to_string(),
            files: parse_unified_diff(DIFF),
        }
    }

    struct StaticProvider {
        fail: bool,
    }

    #[async_trait]
    impl DiffProvider for StaticProvider {
        async fn fetch(
            &self,
            repository: &str,
            pr_number: u64,
        ) -> Result<DiffBundle, ProviderError> {
            if self.fail {
                return Err(ProviderError::NotFound {
                    repository: repository.to_string(),
                    pr_number,
                });
            }
            Ok(bundle_for(repository, pr_number))
        }
    }

    /// Records the session status visible while the diff is fetched
    struct StatusRecordingProvider {
        db: Database,
        seen: Arc<Mutex<Option<String>>>,
    }

    #[async_trait]
    impl DiffProvider for StatusRecordingProvider {
        async fn fetch(
            &self,
            repository: &str,
            pr_number: u64,
        ) -> Result<DiffBundle, ProviderError> {
            let active = self
                .db
                .sessions()
                .get_active(repository, pr_number as i64)
                .await
                .map_err(|e| ProviderError::Transient(e.to_string()))?;
            *self.seen.lock().unwrap() = active.map(|s| s.status);
            Ok(bundle_for(repository, pr_number))
        }
    }

    /// Closes the connection pool mid-run so later store calls fail
    struct PoolClosingProvider {
        db: Database,
    }

    #[async_trait]
    impl DiffProvider for PoolClosingProvider {
        async fn fetch(
            &self,
            repository: &str,
            pr_number: u64,
        ) -> Result<DiffBundle, ProviderError> {
            self.db.pool().close().await;
            Ok(bundle_for(repository, pr_number))
        }
    }

    struct StaticAnalyzer {
        payload: Result<String, String>,
    }

    #[async_trait]
    impl Analyzer for StaticAnalyzer {
        fn name(&self) -> &str {
            "static"
        }

        async fn analyze(
            &self,
            _bundle: &DiffBundle,
            _files: &[FileChange],
        ) -> Result<AnalyzerOutput, AnalyzerError> {
            match &self.payload {
                Ok(payload) => Ok(AnalyzerOutput {
                    payload: payload.clone(),
                    usage_units: Some(5),
                }),
                Err(message) => Err(AnalyzerError::Unavailable(message.clone())),
            }
        }
    }

    #[derive(Clone)]
    struct CountingSink {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl ReviewSink for CountingSink {
        async fn submit(
            &self,
            _target: &DeliveryTarget,
            _summary: &str,
            _disposition: Disposition,
            _comments: &[InlineComment],
        ) -> Result<SubmissionId, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(DeliveryError::Transient("down".to_string()))
            } else {
                Ok(SubmissionId("r1".to_string()))
            }
        }
    }

    const PAYLOAD: &str = r#"{"findings": [
        {"severity": "MEDIUM", "file_path": "src/auth.rs", "line_number": 6,
         "description": "Token logged", "category": "security"}
    ]}"#;

    fn request() -> ReviewRequest {
        ReviewRequest {
            repository: "owner/repo".to_string(),
            pr_number: 7,
            head_sha: "abc123".to_string(),
            pr_url: "https://github.com/owner/repo/pull/7".to_string(),
            trigger_kind: "initial".to_string(),
        }
    }

    async fn orchestrator(
        provider_fail: bool,
        analyzer: Result<String, String>,
        sink_fail: bool,
    ) -> (TempDir, Arc<AtomicUsize>, Orchestrator<StaticProvider, StaticAnalyzer, CountingSink>) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db")).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(
            StaticProvider { fail: provider_fail },
            StaticAnalyzer { payload: analyzer },
            CountingSink {
                calls: calls.clone(),
                fail: sink_fail,
            },
            db,
            ReviewConfig::default(),
        );
        (temp_dir, calls, orchestrator)
    }

    #[tokio::test]
    async fn test_completed_run_persists_and_delivers_once() {
        let (_tmp, calls, orchestrator) =
            orchestrator(false, Ok(PAYLOAD.to_string()), false).await;

        let outcome = orchestrator.run(request()).await.unwrap();
        let RunOutcome::Completed {
            session_id,
            disposition,
            delivered,
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert_eq!(disposition, Disposition::Comment);
        assert!(delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let session = orchestrator.db.sessions().get(session_id).await.unwrap();
        assert_eq!(session.status, "completed");
        assert_eq!(session.finding_count, 1);
        assert_eq!(session.usage_units, Some(5));
        assert!(session
            .summary
            .as_deref()
            .unwrap()
            .contains("Automated Review"));
        assert_eq!(session.severity_medium, 1);
        assert_eq!(session.severity_high, 0);
        assert!(session.completed_at.is_some());

        let findings = orchestrator
            .db
            .findings()
            .list_by_session(session_id)
            .await
            .unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, "MEDIUM");

        let executions = orchestrator
            .db
            .executions()
            .list_by_session(session_id)
            .await
            .unwrap();
        assert_eq!(executions.len(), 3);
    }

    #[tokio::test]
    async fn test_concurrent_trigger_coalesces() {
        let (_tmp, calls, orchestrator) =
            orchestrator(false, Ok(PAYLOAD.to_string()), false).await;

        // Claim the slot out of band, as a concurrent trigger would
        orchestrator
            .db
            .sessions()
            .create(perch_db::CreateSession {
                repository: "owner/repo".to_string(),
                pr_number: 7,
                head_sha: "abc123".to_string(),
                pr_url: "https://github.com/owner/repo/pull/7".to_string(),
                trigger_kind: "initial".to_string(),
            })
            .await
            .unwrap();

        let outcome = orchestrator.run(request()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Coalesced));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetch_failure_fails_session_without_delivery() {
        let (_tmp, calls, orchestrator) =
            orchestrator(true, Ok(PAYLOAD.to_string()), false).await;

        let outcome = orchestrator.run(request()).await.unwrap();
        let RunOutcome::Failed { session_id, error } = outcome else {
            panic!("expected failed outcome");
        };
        assert!(error.contains("not found"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let session = orchestrator.db.sessions().get(session_id).await.unwrap();
        assert_eq!(session.status, "failed");

        // Terminal session frees the slot for a retry
        let retry = orchestrator.run(request()).await.unwrap();
        assert!(matches!(retry, RunOutcome::Failed { .. }));
    }

    #[tokio::test]
    async fn test_pipeline_failure_recorded_with_executions() {
        let (_tmp, calls, orchestrator) =
            orchestrator(false, Err("analyzer offline".to_string()), false).await;

        let outcome = orchestrator.run(request()).await.unwrap();
        let RunOutcome::Failed { session_id, .. } = outcome else {
            panic!("expected failed outcome");
        };
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let executions = orchestrator
            .db
            .executions()
            .list_by_session(session_id)
            .await
            .unwrap();
        // Parsing plus one analyze attempt; unavailability is not retried
        assert_eq!(executions.len(), 2);
        assert!(executions[1].error.is_some());
    }

    #[tokio::test]
    async fn test_delivery_failure_keeps_session_completed() {
        let (_tmp, calls, orchestrator) =
            orchestrator(false, Ok(PAYLOAD.to_string()), true).await;

        let outcome = orchestrator.run(request()).await.unwrap();
        let RunOutcome::Completed {
            session_id,
            delivered,
            ..
        } = outcome
        else {
            panic!("expected completed outcome");
        };
        assert!(!delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let session = orchestrator.db.sessions().get(session_id).await.unwrap();
        assert_eq!(session.status, "completed");
        // The summary survives locally even though delivery failed
        assert!(session.summary.is_some());
    }

    #[tokio::test]
    async fn test_session_pending_until_diff_is_fetched() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db")).await.unwrap();
        let seen = Arc::new(Mutex::new(None));
        let orchestrator = Orchestrator::new(
            StatusRecordingProvider {
                db: db.clone(),
                seen: seen.clone(),
            },
            StaticAnalyzer {
                payload: Ok(PAYLOAD.to_string()),
            },
            CountingSink {
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            },
            db,
            ReviewConfig::default(),
        );

        let outcome = orchestrator.run(request()).await.unwrap();
        assert!(matches!(outcome, RunOutcome::Completed { .. }));
        assert_eq!(seen.lock().unwrap().as_deref(), Some("pending"));
    }

    #[tokio::test]
    async fn test_store_failure_mid_run_surfaces_error() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db")).await.unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let orchestrator = Orchestrator::new(
            PoolClosingProvider { db: db.clone() },
            StaticAnalyzer {
                payload: Ok(PAYLOAD.to_string()),
            },
            CountingSink {
                calls: calls.clone(),
                fail: false,
            },
            db,
            ReviewConfig::default(),
        );

        let result = orchestrator.run(request()).await;
        assert!(result.is_err());
        // Nothing was delivered for the aborted run
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
