//! Review domain types
//!
//! Findings, severities, and the structured review result produced by
//! the Format stage and consumed by the delivery engine.

mod finding;
mod result;

pub use finding::{Finding, Severity};
pub use result::{Disposition, InlineComment, ReviewResult};
