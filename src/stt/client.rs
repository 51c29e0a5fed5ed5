//! Language policy and failure absorption in front of a [`SpeechRecognizer`].

use crate::audio::AudioBuffer;
use crate::stt::recognizer::{SpeechRecognizer, TranscriptionRequest, TranscriptionResult};
use std::sync::Arc;

/// Serves exactly one language; everything else is answered with an empty
/// transcript without touching the network.
#[derive(Clone)]
pub struct TranscriptionClient {
    recognizer: Arc<dyn SpeechRecognizer>,
    language: String,
}

/// Primary subtag, lowercased: `en-US` and `EN_gb` both become `en`.
fn primary_subtag(language: &str) -> String {
    language
        .trim()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

impl TranscriptionClient {
    pub fn new(recognizer: Arc<dyn SpeechRecognizer>, language: &str) -> Self {
        Self {
            recognizer,
            language: primary_subtag(language),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    pub fn supports_language(&self, language: &str) -> bool {
        primary_subtag(language) == self.language
    }

    /// Transcribes `audio`, returning an empty result for unsupported
    /// languages, empty audio and remote failures.
    pub async fn transcribe(
        &self,
        audio: &AudioBuffer,
        language: &str,
        prompt: Option<&str>,
    ) -> TranscriptionResult {
        if !self.supports_language(language) {
            tracing::info!(
                requested = language,
                supported = %self.language,
                "unsupported language, skipping transcription"
            );
            return TranscriptionResult::empty();
        }
        if audio.is_empty() {
            return TranscriptionResult::empty();
        }

        let request = TranscriptionRequest {
            audio: audio.clone(),
            language: self.language.clone(),
            prompt: prompt.map(str::to_string),
        };
        match self.recognizer.recognize(&request).await {
            Ok(text) => {
                let result = TranscriptionResult::new(text);
                tracing::debug!(
                    chars = result.text.len(),
                    model = self.recognizer.model_name(),
                    "transcribed"
                );
                result
            }
            Err(e) => {
                tracing::warn!(error = %e, "transcription failed, treating as empty");
                TranscriptionResult::empty()
            }
        }
    }
}

impl std::fmt::Debug for TranscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TranscriptionClient")
            .field("model", &self.recognizer.model_name())
            .field("language", &self.language)
            .finish()
    }
}
