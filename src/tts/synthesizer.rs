use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::platform::Platform;
use async_trait::async_trait;
use futures_util::{Stream, StreamExt, stream};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Synthesized audio, chunk by chunk, as the remote produces it.
pub type AudioChunkStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>>> + Send>>;

/// Audio encoding requested from the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Compressed audio for browsers and raw clients.
    Mp3,
    /// G.711 u-law at 8 kHz for telephony.
    Mulaw8k,
}

impl AudioEncoding {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Telephony => AudioEncoding::Mulaw8k,
            Platform::Web | Platform::Raw => AudioEncoding::Mp3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice_id: String,
    pub language: String,
    pub model: String,
    pub encoding: AudioEncoding,
}

impl SynthesisRequest {
    /// A request with the default voice, language, model and mp3 output.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice_id: defaults::VOICE_ID.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            model: defaults::TTS_MODEL.to_string(),
            encoding: AudioEncoding::Mp3,
        }
    }

    pub fn with_voice(mut self, voice_id: &str) -> Self {
        if !voice_id.is_empty() {
            self.voice_id = voice_id.to_string();
        }
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        if !language.is_empty() {
            self.language = language.to_string();
        }
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        if !model.is_empty() {
            self.model = model.to_string();
        }
        self
    }

    pub fn with_encoding(mut self, encoding: AudioEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

/// Remote text-to-speech capability.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Starts synthesis. Errors before the first chunk are returned here;
    /// errors while streaming arrive as stream items.
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunkStream>;
}

#[async_trait]
impl<T: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Arc<T> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<AudioChunkStream> {
        (**self).synthesize(request).await
    }
}

/// Mock synthesizer for testing
#[derive(Debug, Clone)]
pub struct MockSynthesizer {
    chunks: Vec<Vec<u8>>,
    chunk_delay: Duration,
    should_fail: bool,
    calls: Arc<AtomicUsize>,
}

impl MockSynthesizer {
    /// Yields `count` chunks of `size` bytes each.
    pub fn new(count: usize, size: usize) -> Self {
        Self::with_chunks((0..count).map(|i| vec![i as u8; size]).collect())
    }

    pub fn with_chunks(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            chunk_delay: Duration::ZERO,
            should_fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Sleep before each chunk, to leave room for cancellation.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
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
impl SpeechSynthesizer for MockSynthesizer {
    async fn synthesize(&self, _request: &SynthesisRequest) -> Result<AudioChunkStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.should_fail {
            return Err(VoxgateError::SynthesisService {
                message: "mock synthesis failure".to_string(),
            });
        }
        let delay = self.chunk_delay;
        let chunks = stream::iter(self.chunks.clone()).then(move |chunk| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok::<_, VoxgateError>(chunk)
        });
        Ok(Box::pin(chunks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults() {
        let request = SynthesisRequest::new("hi");
        assert_eq!(request.voice_id, "shimmer");
        assert_eq!(request.language, "en");
        assert_eq!(request.model, "tts-1");
        assert_eq!(request.encoding, AudioEncoding::Mp3);
    }

    #[test]
    fn empty_overrides_keep_defaults() {
        let request = SynthesisRequest::new("hi")
            .with_voice("")
            .with_model("tts-1-hd")
            .with_language("");
        assert_eq!(request.voice_id, "shimmer");
        assert_eq!(request.model, "tts-1-hd");
        assert_eq!(request.language, "en");
    }

    #[test]
    fn encoding_follows_platform() {
        assert_eq!(
            AudioEncoding::for_platform(Platform::Telephony),
            AudioEncoding::Mulaw8k
        );
        assert_eq!(AudioEncoding::for_platform(Platform::Web), AudioEncoding::Mp3);
        assert_eq!(AudioEncoding::for_platform(Platform::Raw), AudioEncoding::Mp3);
    }

    #[tokio::test]
    async fn mock_streams_configured_chunks() {
        let mock = MockSynthesizer::new(3, 4);
        let stream = mock.synthesize(&SynthesisRequest::new("x")).await.unwrap();
        let chunks: Vec<Vec<u8>> = stream.map(|c| c.unwrap()).collect().await;
        assert_eq!(chunks, vec![vec![0; 4], vec![1; 4], vec![2; 4]]);
        assert_eq!(mock.calls(), 1);
    }
}
