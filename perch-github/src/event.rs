//! Webhook event classification
//!
//! Decides whether an inbound delivery should start a review. Only
//! `pull_request` events with an action of opened, synchronize, or
//! reopened qualify; everything else is acknowledged and dropped.

use serde::Deserialize;
use tracing::debug;

/// Minimal shape of a pull_request webhook payload
#[derive(Debug, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub action: Option<String>,
    pub pull_request: Option<PullRequestPayload>,
    pub repository: Option<RepositoryPayload>,
}

#[derive(Debug, Deserialize)]
pub struct PullRequestPayload {
    pub number: u64,
    #[serde(default)]
    pub draft: bool,
    pub html_url: String,
    pub head: HeadPayload,
}

#[derive(Debug, Deserialize)]
pub struct HeadPayload {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub struct RepositoryPayload {
    pub full_name: String,
}

/// What kind of trigger a qualifying event represents
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Initial,
    Synchronize,
    Reopened,
}

impl TriggerKind {
    pub fn as_str(&self) -> &str {
        match self {
            TriggerKind::Initial => "initial",
            TriggerKind::Synchronize => "synchronize",
            TriggerKind::Reopened => "reopened",
        }
    }
}

/// Classification of one webhook delivery
#[derive(Debug)]
pub enum Trigger {
    /// Start a review
    Review {
        repository: String,
        pr_number: u64,
        head_sha: String,
        pr_url: String,
        kind: TriggerKind,
    },

    /// Acknowledge and drop
    Ignore { reason: String },
}

/// Classify a delivery from its event name and parsed payload
pub fn classify(event: &str, envelope: &WebhookEnvelope, skip_drafts: bool) -> Trigger {
    if event != "pull_request" {
        return Trigger::Ignore {
            reason: format!("unsupported event: {event}"),
        };
    }

    let kind = match envelope.action.as_deref() {
        Some("opened") => TriggerKind::Initial,
        Some("synchronize") => TriggerKind::Synchronize,
        Some("reopened") => TriggerKind::Reopened,
        Some(other) => {
            return Trigger::Ignore {
                reason: format!("unsupported action: {other}"),
            }
        }
        None => {
            return Trigger::Ignore {
                reason: "missing action".to_string(),
            }
        }
    };

    let Some(pr) = &envelope.pull_request else {
        return Trigger::Ignore {
            reason: "missing pull_request payload".to_string(),
        };
    };
    let Some(repo) = &envelope.repository else {
        return Trigger::Ignore {
            reason: "missing repository payload".to_string(),
        };
    };

    if skip_drafts && pr.draft {
        return Trigger::Ignore {
            reason: format!("draft pull request {}#{}", repo.full_name, pr.number),
        };
    }

    debug!(
        repository = %repo.full_name,
        pr_number = pr.number,
        kind = kind.as_str(),
        "Classified review trigger"
    );
    Trigger::Review {
        repository: repo.full_name.clone(),
        pr_number: pr.number,
        head_sha: pr.head.sha.clone(),
        pr_url: pr.html_url.clone(),
        kind,
    }
}
