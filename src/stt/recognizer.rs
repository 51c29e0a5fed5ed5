use crate::audio::AudioBuffer;
use crate::error::{Result, VoxgateError};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// One recognition call.
#[derive(Debug, Clone)]
pub struct TranscriptionRequest {
    pub audio: AudioBuffer,
    pub language: String,
    /// Context hint passed through to the recognizer, if any.
    pub prompt: Option<String>,
}

/// Outcome of a transcription. Empty text is a valid result, not an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranscriptionResult {
    pub text: String,
}

impl TranscriptionResult {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
}

/// Remote speech-to-text capability.
///
/// Implementations perform exactly one request per call and never retry.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn recognize(&self, request: &TranscriptionRequest) -> Result<String>;

    /// Name of the model behind this recognizer.
    fn model_name(&self) -> &str;
}

/// Implement SpeechRecognizer for Arc<T> to allow sharing across sessions.
#[async_trait]
impl<T: SpeechRecognizer + ?Sized> SpeechRecognizer for Arc<T> {
    async fn recognize(&self, request: &TranscriptionRequest) -> Result<String> {
        (**self).recognize(request).await
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }
}

/// Mock recognizer for testing
#[derive(Debug, Clone)]
pub struct MockRecognizer {
    response: String,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockRecognizer {
    pub fn new() -> Self {
        Self {
            response: "mock transcription".to_string(),
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Configure the mock to return a specific transcript
    pub fn with_response(mut self, response: &str) -> Self {
        self.response = response.to_string();
        self
    }

    /// Configure the mock to fail every call
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    /// Number of calls made so far, shared between clones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechRecognizer for MockRecognizer {
    async fn recognize(&self, _request: &TranscriptionRequest) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            Err(VoxgateError::TranscriptionService {
                message: "mock transcription failure".to_string(),
            })
        } else {
            Ok(self.response.clone())
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> TranscriptionRequest {
        TranscriptionRequest {
            audio: AudioBuffer::canonical(&[0; 160]),
            language: "en".to_string(),
            prompt: None,
        }
    }

    #[tokio::test]
    async fn test_mock_recognizer_returns_response() {
        let recognizer = MockRecognizer::new().with_response("hello there");
        assert_eq!(recognizer.recognize(&request()).await.unwrap(), "hello there");
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_recognizer_failure() {
        let recognizer = MockRecognizer::new().with_failure();
        let result = recognizer.recognize(&request()).await;
        assert!(matches!(
            result,
            Err(VoxgateError::TranscriptionService { .. })
        ));
    }

    #[tokio::test]
    async fn test_call_count_is_shared_between_clones() {
        let recognizer = MockRecognizer::new();
        let shared: Arc<dyn SpeechRecognizer> = Arc::new(recognizer.clone());
        shared.recognize(&request()).await.unwrap();
        shared.recognize(&request()).await.unwrap();
        assert_eq!(recognizer.calls(), 2);
        assert_eq!(shared.model_name(), "mock");
    }

    #[test]
    fn test_result_trims_and_reports_empty() {
        assert!(TranscriptionResult::new("   ").is_empty());
        assert_eq!(TranscriptionResult::new(" hi \n").text, "hi");
        assert!(TranscriptionResult::empty().is_empty());
    }
}
