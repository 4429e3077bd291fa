//! Pipeline stage state machine

use serde::{Deserialize, Serialize};
use tracing::info;

/// Stages of the review task graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Idle,
    Parsing,
    Analyzing,
    Formatting,
    Done,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &str {
        match self {
            Stage::Idle => "idle",
            Stage::Parsing => "parsing",
            Stage::Analyzing => "analyzing",
            Stage::Formatting => "formatting",
            Stage::Done => "done",
            Stage::Failed => "failed",
        }
    }

    /// Check if a transition to the target stage is allowed
    pub fn can_transition_to(&self, target: Stage) -> bool {
        match (self, target) {
            (Stage::Idle, Stage::Parsing) => true,
            (Stage::Parsing, Stage::Analyzing) => true,
            // A diff with no eligible files short-circuits past analysis
            (Stage::Parsing, Stage::Done) => true,
            (Stage::Analyzing, Stage::Formatting) => true,
            (Stage::Formatting, Stage::Done) => true,
            // Any active stage may fail
            (Stage::Parsing | Stage::Analyzing | Stage::Formatting, Stage::Failed) => true,
            _ => false,
        }
    }

    /// Whether the pipeline has finished, successfully or not
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned on an invalid stage transition
#[derive(Debug, thiserror::Error)]
#[error("invalid stage transition from {from} to {to}")]
pub struct StageError {
    pub from: Stage,
    pub to: Stage,
}

/// Tracks the current stage and validates transitions
#[derive(Debug)]
pub struct StageTracker {
    current: Stage,
}

impl StageTracker {
    pub fn new() -> Self {
        Self {
            current: Stage::Idle,
        }
    }

    pub fn current(&self) -> Stage {
        self.current
    }

    /// Transition to a new stage, validating the edge
    pub fn transition_to(&mut self, target: Stage) -> Result<(), StageError> {
        if !self.current.can_transition_to(target) {
            return Err(StageError {
                from: self.current,
                to: target,
            });
        }
        info!(from = %self.current, to = %target, "Pipeline stage transition");
        self.current = target;
        Ok(())
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Record of one stage attempt, persisted for observability
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageExecution {
    /// Stage that ran
    pub stage: Stage,

    /// Wall-clock duration of the attempt
    pub duration_ms: i64,

    /// Resource usage reported by the analyzer, when applicable
    pub usage_units: Option<i64>,

    /// Raw payload produced by the stage, when applicable
    pub raw_output: Option<String>,

    /// Error message when the attempt failed
    pub error: Option<String>,
}
