//! Perch GitHub - GitHub integration for the review pipeline
//!
//! This crate provides webhook signature verification and event
//! classification for inbound deliveries, plus the GitHub-backed
//! implementations of the diff provider and review sink seams.

mod client;
mod deliver;
mod error;
mod event;
mod fetch;
mod signature;

pub use client::{parse_repository, GitHubClient};
pub use deliver::GitHubReviewSink;
pub use error::{Error, Result};
pub use event::{classify, PullRequestPayload, Trigger, TriggerKind, WebhookEnvelope};
pub use fetch::GitHubDiffProvider;
pub use signature::{compute_signature, verify_signature};
