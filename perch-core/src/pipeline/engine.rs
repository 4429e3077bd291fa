//! Task graph engine
//!
//! Drives the Parse, Analyze, and Format stages over a diff bundle and
//! records one [`StageExecution`] per attempt. The Analyze stage gets a
//! single retry on transient failures; malformed output falls back to
//! degraded-mode salvage before the stage is declared failed.

use std::time::Instant;

use tracing::{info, warn};

use crate::analyzer::{parse_findings, salvage_findings, Analyzer, AnalyzerError, AnalyzerOutput};
use crate::config::ReviewConfig;
use crate::diff::{is_eligible, DiffBundle, FileChange};
use crate::pipeline::format::format_review;
use crate::pipeline::stage::{Stage, StageExecution, StageTracker};
use crate::review::{Finding, ReviewResult};

/// Result of one pipeline run
#[derive(Debug)]
pub struct PipelineOutcome {
    /// Formatted review, present when the pipeline reached Done
    pub result: Option<ReviewResult>,

    /// Stage the pipeline ended in (always terminal)
    pub final_stage: Stage,

    /// One record per stage attempt, in execution order
    pub executions: Vec<StageExecution>,

    /// Failure description when the pipeline ended in Failed
    pub error: Option<String>,
}

/// Runs the three-stage review task graph
pub struct TaskGraphEngine<A> {
    analyzer: A,
    config: ReviewConfig,
}

impl<A: Analyzer> TaskGraphEngine<A> {
    pub fn new(analyzer: A, config: ReviewConfig) -> Self {
        Self { analyzer, config }
    }

    /// Run the pipeline over a diff bundle
    ///
    /// Never returns an error: failures are captured in the outcome so
    /// the orchestrator can persist them alongside the executions.
    pub async fn run(&self, bundle: &DiffBundle) -> PipelineOutcome {
        let mut tracker = StageTracker::new();
        let mut executions = Vec::new();

        // Parse stage: eligibility filtering over the already-parsed diff
        if let Err(e) = tracker.transition_to(Stage::Parsing) {
            return failed(tracker.current(), executions, e.to_string());
        }
        let started = Instant::now();
        let eligible: Vec<FileChange> = bundle
            .files
            .iter()
            .filter(|f| is_eligible(&f.path) && f.has_hunks())
            .cloned()
            .collect();
        executions.push(StageExecution {
            stage: Stage::Parsing,
            duration_ms: started.elapsed().as_millis() as i64,
            usage_units: None,
            raw_output: None,
            error: None,
        });

        if eligible.is_empty() {
            info!(
                repository = %bundle.repository,
                pr_number = bundle.pr_number,
                "No eligible files in diff, approving without analysis"
            );
            if let Err(e) = tracker.transition_to(Stage::Done) {
                return failed(tracker.current(), executions, e.to_string());
            }
            let result = format_review(bundle, vec![], self.config.max_inline_comments);
            return PipelineOutcome {
                result: Some(result),
                final_stage: Stage::Done,
                executions,
                error: None,
            };
        }

        // Analyze stage
        if let Err(e) = tracker.transition_to(Stage::Analyzing) {
            return failed(tracker.current(), executions, e.to_string());
        }
        let findings = match self.analyze(bundle, &eligible, &mut executions).await {
            Ok(findings) => findings,
            Err(message) => {
                let _ = tracker.transition_to(Stage::Failed);
                return failed(Stage::Failed, executions, message);
            }
        };

        // Format stage
        if let Err(e) = tracker.transition_to(Stage::Formatting) {
            return failed(tracker.current(), executions, e.to_string());
        }
        let started = Instant::now();
        let result = format_review(bundle, findings, self.config.max_inline_comments);
        executions.push(StageExecution {
            stage: Stage::Formatting,
            duration_ms: started.elapsed().as_millis() as i64,
            usage_units: None,
            raw_output: None,
            error: None,
        });

        if let Err(e) = tracker.transition_to(Stage::Done) {
            return failed(tracker.current(), executions, e.to_string());
        }

        PipelineOutcome {
            result: Some(result),
            final_stage: Stage::Done,
            executions,
            error: None,
        }
    }

    /// Run the analyzer with a timeout and one transient retry, then
    /// parse or salvage its payload
    async fn analyze(
        &self,
        bundle: &DiffBundle,
        eligible: &[FileChange],
        executions: &mut Vec<StageExecution>,
    ) -> Result<Vec<Finding>, String> {
        let mut last_error = String::new();

        for attempt in 0..2 {
            let started = Instant::now();
            let outcome = self.invoke_analyzer(bundle, eligible).await;
            let duration_ms = started.elapsed().as_millis() as i64;

            match outcome {
                Ok(output) => {
                    executions.push(StageExecution {
                        stage: Stage::Analyzing,
                        duration_ms,
                        usage_units: output.usage_units,
                        raw_output: Some(output.payload.clone()),
                        error: None,
                    });
                    return self.extract_findings(&output.payload);
                }
                Err(err) => {
                    executions.push(StageExecution {
                        stage: Stage::Analyzing,
                        duration_ms,
                        usage_units: None,
                        raw_output: None,
                        error: Some(err.to_string()),
                    });
                    last_error = err.to_string();

                    if err.is_transient() && attempt == 0 {
                        warn!(
                            error = %err,
                            repository = %bundle.repository,
                            pr_number = bundle.pr_number,
                            "Analyzer failed, retrying once"
                        );
                        continue;
                    }
                    break;
                }
            }
        }

        Err(last_error)
    }

    async fn invoke_analyzer(
        &self,
        bundle: &DiffBundle,
        eligible: &[FileChange],
    ) -> Result<AnalyzerOutput, AnalyzerError> {
        match tokio::time::timeout(
            self.config.stage_timeout,
            self.analyzer.analyze(bundle, eligible),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(AnalyzerError::Timeout),
        }
    }

    /// Strict parse first, salvage on malformed payloads
    fn extract_findings(&self, payload: &str) -> Result<Vec<Finding>, String> {
        match parse_findings(payload, self.analyzer.name()) {
            Ok(findings) => Ok(findings),
            Err(AnalyzerError::Malformed(reason)) => {
                let salvaged = salvage_findings(payload, self.analyzer.name());
                if salvaged.is_empty() {
                    Err(format!("malformed analyzer output: {reason}"))
                } else {
                    warn!(
                        recovered = salvaged.len(),
                        "Strict parse failed, continuing with salvaged findings"
                    );
                    Ok(salvaged)
                }
            }
            Err(other) => Err(other.to_string()),
        }
    }
}

fn failed(stage: Stage, executions: Vec<StageExecution>, error: String) -> PipelineOutcome {
    PipelineOutcome {
        result: None,
        final_stage: stage,
        executions,
        error: Some(error),
    }
}
