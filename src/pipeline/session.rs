//! Per-connection state shared between a session's reader and its turn worker.

use crate::defaults;
use crate::platform::Platform;
use crate::reply::{ConversationContext, ConversationTurn};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    epoch: AtomicU64,
}

/// Cooperative cancellation for the reply that is currently streaming.
///
/// Setting it is idempotent. Clones share the same flag. Every transition to
/// cancelled advances the epoch, so frames queued before a cancellation can
/// be told apart from frames of later turns even after [`reset`](Self::reset).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<CancelState>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        // Flag first: a reader that sees the new epoch also sees the flag.
        if !self.0.cancelled.swap(true, Ordering::SeqCst) {
            self.0.epoch.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.cancelled.store(false, Ordering::SeqCst);
    }

    /// Number of cancellations so far.
    pub fn epoch(&self) -> u64 {
        self.0.epoch.load(Ordering::SeqCst)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One client connection.
///
/// Holds no audio between turns; only the cancellation flag, the hints set by
/// the client and a bounded text history survive from one turn to the next.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    platform: Platform,
    language: String,
    prompt: Mutex<Option<String>>,
    stream_id: Mutex<Option<String>>,
    cancel: CancelFlag,
    replying: AtomicBool,
    turn_lock: tokio::sync::Mutex<()>,
    history: Mutex<VecDeque<ConversationTurn>>,
    history_limit: usize,
}

impl Session {
    pub fn new(platform: Platform, language: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            platform,
            language: language.to_string(),
            prompt: Mutex::new(None),
            stream_id: Mutex::new(None),
            cancel: CancelFlag::new(),
            replying: AtomicBool::new(false),
            turn_lock: tokio::sync::Mutex::new(()),
            history: Mutex::new(VecDeque::new()),
            history_limit: defaults::HISTORY_TURNS,
        }
    }

    pub fn with_prompt(self, prompt: Option<String>) -> Self {
        self.set_prompt(prompt);
        self
    }

    pub fn with_stream_id(self, stream_id: &str) -> Self {
        self.set_stream_id(stream_id);
        self
    }

    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn platform(&self) -> Platform {
        self.platform
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn prompt(&self) -> Option<String> {
        lock(&self.prompt).clone()
    }

    pub fn set_prompt(&self, prompt: Option<String>) {
        *lock(&self.prompt) = prompt.filter(|p| !p.trim().is_empty());
    }

    pub fn stream_id(&self) -> Option<String> {
        lock(&self.stream_id).clone()
    }

    pub fn set_stream_id(&self, stream_id: &str) {
        *lock(&self.stream_id) = Some(stream_id.to_string());
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    /// Requests that the reply in flight stop before its next frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True while synthesized audio is being streamed to the client.
    pub fn is_replying(&self) -> bool {
        self.replying.load(Ordering::SeqCst)
    }

    pub(crate) fn set_replying(&self, replying: bool) {
        self.replying.store(replying, Ordering::SeqCst);
    }

    /// Serializes turns: the guard is handed out in request order.
    pub(crate) async fn begin_turn(&self) -> tokio::sync::MutexGuard<'_, ()> {
        let guard = self.turn_lock.lock().await;
        self.cancel.reset();
        guard
    }

    pub fn context(&self) -> ConversationContext {
        ConversationContext {
            session_id: self.id,
            language: self.language.clone(),
            history: lock(&self.history).iter().cloned().collect(),
        }
    }

    pub fn push_history(&self, user: &str, assistant: &str) {
        if self.history_limit == 0 {
            return;
        }
        let mut history = lock(&self.history);
        history.push_back(ConversationTurn {
            user: user.to_string(),
            assistant: assistant.to_string(),
        });
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn cancel_flag_is_shared_and_idempotent() {
        let flag = CancelFlag::new();
        let clone = flag.clone();
        clone.cancel();
        clone.cancel();
        assert!(flag.is_cancelled());
        flag.reset();
        assert!(!clone.is_cancelled());
    }

    #[test]
    fn epoch_advances_once_per_cancellation() {
        let flag = CancelFlag::new();
        assert_eq!(flag.epoch(), 0);
        flag.cancel();
        flag.cancel();
        assert_eq!(flag.epoch(), 1);
        flag.reset();
        assert_eq!(flag.epoch(), 1);
        flag.cancel();
        assert_eq!(flag.clone().epoch(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let session = Session::new(Platform::Web, "en").with_history_limit(2);
        session.push_history("a", "1");
        session.push_history("b", "2");
        session.push_history("c", "3");
        let context = session.context();
        assert_eq!(context.history.len(), 2);
        assert_eq!(context.history[0].user, "b");
        assert_eq!(context.session_id, session.id());
    }

    #[test]
    fn blank_prompt_is_cleared() {
        let session = Session::new(Platform::Raw, "en").with_prompt(Some("names".to_string()));
        assert_eq!(session.prompt().as_deref(), Some("names"));
        session.set_prompt(Some("   ".to_string()));
        assert_eq!(session.prompt(), None);
    }

    #[test]
    fn stream_id_is_settable() {
        let session = Session::new(Platform::Telephony, "en");
        assert_eq!(session.stream_id(), None);
        session.set_stream_id("CA123");
        assert_eq!(session.stream_id().as_deref(), Some("CA123"));
    }

    #[tokio::test]
    async fn begin_turn_resets_cancellation() {
        let session = Session::new(Platform::Web, "en");
        session.cancel();
        let _turn = session.begin_turn().await;
        assert!(!session.cancel_flag().is_cancelled());
    }

    #[tokio::test]
    async fn turns_are_serialized() {
        let session = Arc::new(Session::new(Platform::Web, "en"));
        let first = session.begin_turn().await;

        let waiter = {
            let session = Arc::clone(&session);
            tokio::spawn(async move {
                let _turn = session.begin_turn().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }
}
