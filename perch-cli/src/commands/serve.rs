//! Webhook server
//!
//! Receives GitHub webhook deliveries, verifies their signature over
//! the raw body, classifies them, and hands qualifying triggers to the
//! orchestrator on a background task. The HTTP response only says
//! whether the delivery was accepted; review outcomes are observable
//! through `perch status` and the posted reviews themselves.

use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Args;
use perch_core::analyzer::Analyzer;
use perch_core::delivery::ReviewSink;
use perch_core::orchestrator::{Orchestrator, ReviewRequest};
use perch_core::provider::DiffProvider;
use perch_core::{Config, Secrets};
use perch_github::{classify, verify_signature, Trigger, WebhookEnvelope};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use super::build_orchestrator;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,
}

impl ServeArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let secrets = Secrets::load()?;
        if secrets.webhook_secret().is_none() {
            warn!(
                "No webhook secret configured; all deliveries will be rejected. \
                 Set PERCH_WEBHOOK_SECRET or add it to the secrets file."
            );
        }

        let (db, orchestrator) = build_orchestrator(config, &secrets).await?;
        // Sessions stranded active by a previous process would hold
        // their idempotency slot forever
        db.sessions().recover_interrupted().await?;
        let state = AppState::new(orchestrator, &secrets, config);

        let bind_addr = self
            .bind
            .clone()
            .unwrap_or_else(|| config.server.bind_addr.clone());
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!(bind_addr = %bind_addr, "Webhook server listening");

        axum::serve(listener, router(state)).await?;
        Ok(())
    }
}

/// Remembers recently seen delivery ids so redeliveries are dropped
struct DeliveryCache {
    entries: Mutex<(VecDeque<String>, HashSet<String>)>,
    capacity: usize,
}

impl DeliveryCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new((VecDeque::new(), HashSet::new())),
            capacity,
        }
    }

    /// Record a delivery id; returns false when it was already seen
    fn mark(&self, id: &str) -> bool {
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (order, seen) = &mut *guard;
        if seen.contains(id) {
            return false;
        }
        seen.insert(id.to_string());
        order.push_back(id.to_string());
        while order.len() > self.capacity {
            if let Some(evicted) = order.pop_front() {
                seen.remove(&evicted);
            }
        }
        true
    }
}

/// Shared server state, generic over the orchestrator wiring so the
/// handler can be exercised with in-memory fakes
pub struct AppState<P, A, S> {
    orchestrator: Arc<Orchestrator<P, A, S>>,
    webhook_secret: Option<String>,
    skip_drafts: bool,
    deliveries: Arc<DeliveryCache>,
}

impl<P, A, S> Clone for AppState<P, A, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            webhook_secret: self.webhook_secret.clone(),
            skip_drafts: self.skip_drafts,
            deliveries: self.deliveries.clone(),
        }
    }
}

impl<P, A, S> AppState<P, A, S> {
    pub fn new(orchestrator: Arc<Orchestrator<P, A, S>>, secrets: &Secrets, config: &Config) -> Self {
        Self {
            orchestrator,
            webhook_secret: secrets.webhook_secret(),
            skip_drafts: config.review.skip_drafts,
            deliveries: Arc::new(DeliveryCache::new(1000)),
        }
    }
}

pub fn router<P, A, S>(state: AppState<P, A, S>) -> Router
where
    P: DiffProvider + 'static,
    A: Analyzer + 'static,
    S: ReviewSink + 'static,
{
    Router::new()
        .route("/webhook/github", post(github_webhook::<P, A, S>))
        .route("/healthz", get(healthz))
        .with_state(state)
}

async fn healthz() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn github_webhook<P, A, S>(
    State(state): State<AppState<P, A, S>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<Value>)
where
    P: DiffProvider + 'static,
    A: Analyzer + 'static,
    S: ReviewSink + 'static,
{
    // Signature check runs on the raw bytes, before anything else
    let Some(secret) = &state.webhook_secret else {
        return reject(StatusCode::FORBIDDEN, "webhook secret not configured");
    };
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|v| v.to_str().ok());
    let Some(signature) = signature else {
        return reject(StatusCode::FORBIDDEN, "missing signature");
    };
    if !verify_signature(&body, signature, secret) {
        warn!("Rejected delivery with invalid signature");
        return reject(StatusCode::FORBIDDEN, "invalid signature");
    }

    let Some(event) = headers.get("x-github-event").and_then(|v| v.to_str().ok()) else {
        return reject(StatusCode::BAD_REQUEST, "missing event header");
    };
    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            return reject(StatusCode::BAD_REQUEST, &format!("malformed payload: {e}"));
        }
    };

    if let Some(delivery_id) = headers.get("x-github-delivery").and_then(|v| v.to_str().ok()) {
        if !state.deliveries.mark(delivery_id) {
            info!(delivery_id, "Dropping duplicate delivery");
            return (
                StatusCode::OK,
                Json(json!({"status": "ignored", "reason": "duplicate delivery"})),
            );
        }
    }

    match classify(event, &envelope, state.skip_drafts) {
        Trigger::Ignore { reason } => {
            info!(event, reason = %reason, "Ignoring delivery");
            (
                StatusCode::OK,
                Json(json!({"status": "ignored", "reason": reason})),
            )
        }
        Trigger::Review {
            repository,
            pr_number,
            head_sha,
            pr_url,
            kind,
        } => {
            let request = ReviewRequest {
                repository: repository.clone(),
                pr_number,
                head_sha,
                pr_url,
                trigger_kind: kind.as_str().to_string(),
            };
            let orchestrator = state.orchestrator.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.run(request).await {
                    error!(
                        repository = %repository,
                        pr_number,
                        error = %e,
                        "Review run failed"
                    );
                }
            });
            (
                StatusCode::ACCEPTED,
                Json(json!({"status": "accepted"})),
            )
        }
    }
}

fn reject(status: StatusCode, reason: &str) -> (StatusCode, Json<Value>) {
    (status, Json(json!({"status": "rejected", "reason": reason})))
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use perch_core::analyzer::{AnalyzerError, AnalyzerOutput};
    use perch_core::delivery::{DeliveryError, DeliveryTarget, SubmissionId};
    use perch_core::diff::{DiffBundle, FileChange};
    use perch_core::provider::ProviderError;
    use perch_core::review::{Disposition, InlineComment};
    use perch_db::Database;
    use perch_github::compute_signature;
    use tempfile::TempDir;

    use super::*;

    struct EmptyProvider;

    #[async_trait]
    impl DiffProvider for EmptyProvider {
        async fn fetch(
            &self,
            repository: &str,
            pr_number: u64,
        ) -> Result<DiffBundle, ProviderError> {
            Ok(DiffBundle {
                repository: repository.to_string(),
                pr_number,
                head_sha: "abc".to_string(),
                pr_url: format!("https://github.com/{repository}/pull/{pr_number}"),
                diff: String::new(),
                files: vec![],
            })
        }
    }

    struct NullAnalyzer;

    #[async_trait]
    impl Analyzer for NullAnalyzer {
        fn name(&self) -> &str {
            "null"
        }

        async fn analyze(
            &self,
            _bundle: &DiffBundle,
            _files: &[FileChange],
        ) -> Result<AnalyzerOutput, AnalyzerError> {
            Ok(AnalyzerOutput {
                payload: r#"{"findings": []}"#.to_string(),
                usage_units: None,
            })
        }
    }

    struct NullSink;

    #[async_trait]
    impl ReviewSink for NullSink {
        async fn submit(
            &self,
            _target: &DeliveryTarget,
            _summary: &str,
            _disposition: Disposition,
            _comments: &[InlineComment],
        ) -> Result<SubmissionId, DeliveryError> {
            Ok(SubmissionId("1".to_string()))
        }
    }

    async fn test_state(secret: Option<&str>) -> (TempDir, AppState<EmptyProvider, NullAnalyzer, NullSink>) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(temp_dir.path().join("test.db")).await.unwrap();
        let orchestrator = Arc::new(Orchestrator::new(
            EmptyProvider,
            NullAnalyzer,
            NullSink,
            db,
            perch_core::config::ReviewConfig::default(),
        ));
        let state = AppState {
            orchestrator,
            webhook_secret: secret.map(str::to_string),
            skip_drafts: true,
            deliveries: Arc::new(DeliveryCache::new(1000)),
        };
        (temp_dir, state)
    }

    fn pr_body() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "action": "opened",
            "pull_request": {
                "number": 5,
                "html_url": "https://github.com/o/r/pull/5",
                "head": {"sha": "abc"}
            },
            "repository": {"full_name": "o/r"}
        }))
        .unwrap()
    }

    fn signed_headers(body: &[u8], secret: &str, event: &str, delivery: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-hub-signature-256",
            compute_signature(body, secret).parse().unwrap(),
        );
        headers.insert("x-github-event", event.parse().unwrap());
        headers.insert("x-github-delivery", delivery.parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn test_valid_delivery_accepted() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = pr_body();
        let headers = signed_headers(&body, "s3cret", "pull_request", "d1");

        let (status, _) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_bad_signature_rejected() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = pr_body();
        let headers = signed_headers(&body, "wrong", "pull_request", "d1");

        let (status, _) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_missing_signature_rejected() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = pr_body();
        let mut headers = HeaderMap::new();
        headers.insert("x-github-event", "pull_request".parse().unwrap());

        let (status, _) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_no_secret_configured_rejects_all() {
        let (_tmp, state) = test_state(None).await;
        let body = pr_body();
        let headers = signed_headers(&body, "s3cret", "pull_request", "d1");

        let (status, _) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_malformed_body_bad_request() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = b"{not json".to_vec();
        let headers = signed_headers(&body, "s3cret", "pull_request", "d1");

        let (status, _) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unsupported_event_acknowledged() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = pr_body();
        let headers = signed_headers(&body, "s3cret", "push", "d1");

        let (status, Json(value)) = github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(value["status"], "ignored");
    }

    #[tokio::test]
    async fn test_duplicate_delivery_dropped() {
        let (_tmp, state) = test_state(Some("s3cret")).await;
        let body = pr_body();
        let headers = signed_headers(&body, "s3cret", "pull_request", "d1");

        let (first, _) =
            github_webhook(State(state.clone()), headers.clone(), Bytes::from(body.clone())).await;
        assert_eq!(first, StatusCode::ACCEPTED);

        let (second, Json(value)) =
            github_webhook(State(state), headers, Bytes::from(body)).await;
        assert_eq!(second, StatusCode::OK);
        assert_eq!(value["reason"], "duplicate delivery");
    }

    #[test]
    fn test_delivery_cache_eviction() {
        let cache = DeliveryCache::new(3);
        assert!(cache.mark("a"));
        assert!(cache.mark("b"));
        assert!(cache.mark("c"));
        assert!(!cache.mark("a"));

        // Pushing past capacity evicts the oldest
        assert!(cache.mark("d"));
        assert!(cache.mark("a"));
    }
}
