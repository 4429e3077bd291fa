//! Diff model and unified-diff parsing
//!
//! A [`DiffBundle`] is the normalized input to the review pipeline:
//! the raw unified diff of a pull request plus per-file change records
//! with the set of new-side lines visible in hunks.

mod bundle;
mod parser;

pub use bundle::{DiffBundle, FileChange};
pub use parser::{is_eligible, parse_unified_diff};
