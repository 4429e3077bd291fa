//! Review delivery
//!
//! [`ReviewSink`] is the outbound seam: it submits a formatted review
//! to the forge. [`DeliveryEngine`] wraps a sink with the line-context
//! fallback: if the forge rejects inline comment anchors, the review is
//! resubmitted exactly once with every finding folded into the summary
//! body, so a review is never lost to anchoring disputes.

use async_trait::async_trait;
use tracing::{info, warn};

use crate::review::{Disposition, InlineComment, ReviewResult};

/// Where a review is being delivered
#[derive(Debug, Clone)]
pub struct DeliveryTarget {
    /// Repository in `owner/repo` form
    pub repository: String,

    /// Pull request number
    pub pr_number: u64,

    /// Head commit the review applies to
    pub head_sha: String,
}

/// Identifier of a submitted review, as assigned by the forge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionId(pub String);

/// Failure modes of a review submission
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// The forge rejected one or more inline comment anchors
    #[error("inline comment anchors rejected: {0}")]
    LineContextRejected(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("delivery rate limited")]
    RateLimited,

    #[error("delivery error: {0}")]
    Transient(String),
}

/// Submits a formatted review to the forge
#[async_trait]
pub trait ReviewSink: Send + Sync {
    async fn submit(
        &self,
        target: &DeliveryTarget,
        summary: &str,
        disposition: Disposition,
        comments: &[InlineComment],
    ) -> Result<SubmissionId, DeliveryError>;
}

/// How the review ultimately landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReport {
    /// Submitted with inline comments as formatted
    Delivered(SubmissionId),

    /// Inline anchors were rejected; resubmitted as a summary-only review
    DeliveredWithoutInline(SubmissionId),
}

/// Drives review submission with the single-retry summary fallback
pub struct DeliveryEngine<S> {
    sink: S,
}

impl<S: ReviewSink> DeliveryEngine<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    /// Deliver a formatted review to its target
    ///
    /// On [`DeliveryError::LineContextRejected`] the review is folded
    /// into a summary-only body and submitted exactly once more. Any
    /// other error, including one from the fallback itself, propagates.
    pub async fn deliver(
        &self,
        target: &DeliveryTarget,
        result: &ReviewResult,
    ) -> Result<DeliveryReport, DeliveryError> {
        match self
            .sink
            .submit(
                target,
                &result.summary,
                result.disposition,
                &result.inline_comments,
            )
            .await
        {
            Ok(id) => {
                info!(
                    repository = %target.repository,
                    pr_number = target.pr_number,
                    inline = result.inline_comments.len(),
                    "Review delivered"
                );
                Ok(DeliveryReport::Delivered(id))
            }
            Err(DeliveryError::LineContextRejected(reason)) => {
                warn!(
                    repository = %target.repository,
                    pr_number = target.pr_number,
                    reason = %reason,
                    "Inline anchors rejected, resubmitting as summary only"
                );
                let body = fold_into_summary(result);
                let id = self
                    .sink
                    .submit(target, &body, result.disposition, &[])
                    .await?;
                Ok(DeliveryReport::DeliveredWithoutInline(id))
            }
            Err(other) => Err(other),
        }
    }
}

/// Append the inline comment bodies to the summary for the fallback
fn fold_into_summary(result: &ReviewResult) -> String {
    if result.inline_comments.is_empty() {
        return result.summary.clone();
    }

    let mut body = result.summary.clone();
    body.push_str("\n### Inline comments (could not be anchored)\n\n");
    for comment in &result.inline_comments {
        body.push_str(&format!(
            "**`{}:{}`**\n{}\n\n",
            comment.path, comment.line, comment.body
        ));
    }
    body
}
