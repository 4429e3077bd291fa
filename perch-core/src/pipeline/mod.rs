//! Review pipeline
//!
//! The task graph runs three sequential stages over a diff bundle:
//! Parse (eligibility filtering), Analyze (findings from an
//! [`crate::analyzer::Analyzer`]), and Format (filtering,
//! deduplication, rendering). [`TaskGraphEngine`] drives the stage
//! state machine and records one execution per stage attempt.

mod engine;
mod format;
mod stage;

pub use engine::{PipelineOutcome, TaskGraphEngine};
pub use format::format_review;
pub use stage::{Stage, StageError, StageExecution};
