//! Perch Core - Review pipeline for automated pull request review
//!
//! This crate provides the pipeline that turns a pull request diff into
//! a structured review: diff parsing, the parse/analyze/format task
//! graph, delivery with line-context fallback, and the orchestrator
//! that owns the session lifecycle.

pub mod analyzer;
pub mod config;
pub mod delivery;
pub mod diff;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod provider;
pub mod review;
pub mod secrets;

pub use config::Config;
pub use error::{Error, Result};
pub use secrets::Secrets;
