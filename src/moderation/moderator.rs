use crate::error::{Result, VoxgateError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Raw answer of the moderation capability.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationCheck {
    pub flagged: bool,
    /// Comma-separated names of the categories that triggered the flag.
    pub reason: Option<String>,
}

/// Remote moderation capability.
#[async_trait]
pub trait Moderator: Send + Sync {
    async fn check(&self, text: &str) -> Result<ModerationCheck>;
}

#[async_trait]
impl<T: Moderator + ?Sized> Moderator for Arc<T> {
    async fn check(&self, text: &str) -> Result<ModerationCheck> {
        (**self).check(text).await
    }
}

/// Mock moderator for testing
#[derive(Debug, Clone, Default)]
pub struct MockModerator {
    flag_words: Vec<String>,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockModerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flag any text containing `word` (case-insensitive).
    pub fn flagging(mut self, word: &str) -> Self {
        self.flag_words.push(word.to_lowercase());
        self
    }

    /// Configure the mock to fail every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Moderator for MockModerator {
    async fn check(&self, text: &str) -> Result<ModerationCheck> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(VoxgateError::ModerationService {
                message: "mock moderation failure".to_string(),
            });
        }
        let lower = text.to_lowercase();
        let hit = self.flag_words.iter().find(|w| lower.contains(w.as_str()));
        Ok(ModerationCheck {
            flagged: hit.is_some(),
            reason: hit.map(|w| format!("contains '{w}'")),
        })
    }
}
