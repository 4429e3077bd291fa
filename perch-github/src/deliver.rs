//! GitHub-backed review sink

use async_trait::async_trait;
use perch_core::delivery::{DeliveryError, DeliveryTarget, ReviewSink, SubmissionId};
use perch_core::review::{Disposition, InlineComment};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::client::{parse_repository, GitHubClient};

/// Submits reviews through the pull request reviews endpoint
///
/// Uses the raw HTTP client rather than octocrab so the 422 returned
/// for rejected comment anchors stays distinguishable from other
/// failures; the delivery engine needs that distinction to decide on
/// the summary-only fallback.
#[derive(Clone)]
pub struct GitHubReviewSink {
    client: GitHubClient,
}

impl GitHubReviewSink {
    pub fn new(client: GitHubClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    id: u64,
}

#[async_trait]
impl ReviewSink for GitHubReviewSink {
    async fn submit(
        &self,
        target: &DeliveryTarget,
        summary: &str,
        disposition: Disposition,
        comments: &[InlineComment],
    ) -> Result<SubmissionId, DeliveryError> {
        let (owner, repo) = parse_repository(&target.repository)
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let payload_comments: Vec<serde_json::Value> = comments
            .iter()
            .map(|c| {
                json!({
                    "path": c.path,
                    "line": c.line,
                    "side": "RIGHT",
                    "body": c.body,
                })
            })
            .collect();

        let payload = json!({
            "commit_id": target.head_sha,
            "body": summary,
            "event": disposition.as_event(),
            "comments": payload_comments,
        });

        let url = format!(
            "{}/repos/{}/{}/pulls/{}/reviews",
            self.client.api_base(),
            owner,
            repo,
            target.pr_number
        );

        debug!(
            repository = %target.repository,
            pr_number = target.pr_number,
            inline = comments.len(),
            "Submitting review"
        );

        let response = self
            .client
            .http()
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.client.token()))
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", "perch")
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(map_failure(status, &body));
        }

        let review: ReviewResponse = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("unexpected response body: {e}")))?;

        info!(
            repository = %target.repository,
            pr_number = target.pr_number,
            review_id = review.id,
            "Submitted review"
        );
        Ok(SubmissionId(review.id.to_string()))
    }
}

fn map_failure(status: reqwest::StatusCode, body: &str) -> DeliveryError {
    match status.as_u16() {
        // GitHub rejects unanchorable inline comments with 422
        422 => DeliveryError::LineContextRejected(truncate(body, 500)),
        401 => DeliveryError::Auth(truncate(body, 200)),
        403 => {
            if body.contains("rate limit") {
                DeliveryError::RateLimited
            } else {
                DeliveryError::Auth(truncate(body, 200))
            }
        }
        429 => DeliveryError::RateLimited,
        code => DeliveryError::Transient(format!("GitHub returned status {code}: {}", truncate(body, 200))),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_422_maps_to_line_context_rejection() {
        let err = map_failure(
            reqwest::StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"message":"Unprocessable Entity","errors":["Pull request review thread line must be part of the diff"]}"#,
        );
        assert!(matches!(err, DeliveryError::LineContextRejected(_)));
    }

    #[test]
    fn test_auth_and_rate_limit_mapping() {
        assert!(matches!(
            map_failure(reqwest::StatusCode::UNAUTHORIZED, "Bad credentials"),
            DeliveryError::Auth(_)
        ));
        assert!(matches!(
            map_failure(reqwest::StatusCode::FORBIDDEN, "API rate limit exceeded"),
            DeliveryError::RateLimited
        ));
        assert!(matches!(
            map_failure(reqwest::StatusCode::FORBIDDEN, "Resource not accessible"),
            DeliveryError::Auth(_)
        ));
        assert!(matches!(
            map_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, ""),
            DeliveryError::RateLimited
        ));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "héllo wörld";
        let t = truncate(s, 3);
        assert!(t.ends_with("..."));
    }
}
