//! Redaction policy around a [`Moderator`].

use crate::defaults;
use crate::moderation::moderator::Moderator;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What to do when the moderation capability cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Treat the text as flagged.
    #[default]
    Closed,
    /// Let the text through unmodified.
    Open,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModerationVerdict {
    pub flagged: bool,
    /// The input when unflagged, otherwise the redaction marker.
    pub safe_text: String,
    pub reason: Option<String>,
}

impl ModerationVerdict {
    fn pass(text: &str) -> Self {
        Self {
            flagged: false,
            safe_text: text.to_string(),
            reason: None,
        }
    }
}

#[derive(Clone)]
pub struct ContentFilter {
    moderator: Arc<dyn Moderator>,
    policy: FailurePolicy,
    marker: String,
}

impl ContentFilter {
    pub fn new(moderator: Arc<dyn Moderator>) -> Self {
        Self {
            moderator,
            policy: FailurePolicy::default(),
            marker: defaults::REDACTION_MARKER.to_string(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Replacement for flagged text. May be empty.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.marker = marker.into();
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub async fn moderate(&self, text: &str) -> ModerationVerdict {
        if text.trim().is_empty() {
            return ModerationVerdict::pass(text);
        }

        match self.moderator.check(text).await {
            Ok(check) if check.flagged => {
                tracing::info!(reason = ?check.reason, "text flagged by moderation");
                ModerationVerdict {
                    flagged: true,
                    safe_text: self.marker.clone(),
                    reason: check.reason,
                }
            }
            Ok(_) => ModerationVerdict::pass(text),
            Err(e) => match self.policy {
                FailurePolicy::Closed => {
                    tracing::warn!(error = %e, "moderation unavailable, redacting");
                    ModerationVerdict {
                        flagged: true,
                        safe_text: self.marker.clone(),
                        reason: Some(format!("moderation unavailable: {e}")),
                    }
                }
                FailurePolicy::Open => {
                    tracing::warn!(error = %e, "moderation unavailable, passing text through");
                    ModerationVerdict::pass(text)
                }
            },
        }
    }
}

impl std::fmt::Debug for ContentFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentFilter")
            .field("policy", &self.policy)
            .field("marker", &self.marker)
            .finish()
    }
}
