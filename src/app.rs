//! Composition root.
//!
//! Builds the remote capability clients from configuration exactly once and
//! injects them into the pipeline. Everything downstream only sees traits.

use crate::audio::SpeechSegmenter;
use crate::config::Config;
use crate::error::Result;
use crate::http::ApiEndpoint;
use crate::moderation::{ContentFilter, OpenAiModerator};
use crate::pipeline::{PipelineCoordinator, Session};
use crate::platform::Platform;
use crate::reply::OpenAiChat;
use crate::store::{InteractionStore, JsonlStore, NullStore};
use crate::stt::{OpenAiRecognizer, TranscriptionClient, TranscriptionResult};
use crate::tts::{OpenAiSynthesizer, SpeechSynthesisStreamer};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Wires the OpenAI-compatible clients named in `config` into a coordinator.
pub fn build_coordinator(config: &Config) -> Result<PipelineCoordinator> {
    let keys = &config.credentials;

    let recognizer = OpenAiRecognizer::new(
        ApiEndpoint::new(&config.stt.api_base, keys.stt.clone()),
        &config.stt.model,
        Duration::from_secs(config.stt.timeout_secs),
    )?;
    let transcriber = TranscriptionClient::new(Arc::new(recognizer), &config.stt.language);

    let moderator = OpenAiModerator::new(
        ApiEndpoint::new(&config.moderation.api_base, keys.moderation.clone()),
        &config.moderation.model,
        Duration::from_secs(config.moderation.timeout_secs),
    )?;
    let filter = ContentFilter::new(Arc::new(moderator))
        .with_policy(config.moderation.on_failure)
        .with_marker(&config.moderation.redaction_marker);

    let mut chat = OpenAiChat::new(
        ApiEndpoint::new(&config.reply.api_base, keys.llm.clone()),
        &config.reply.model,
        Duration::from_secs(config.reply.timeout_secs),
    )?;
    if let Some(prompt) = &config.reply.system_prompt {
        chat = chat.with_system_prompt(prompt);
    }

    let synthesizer = OpenAiSynthesizer::new(
        ApiEndpoint::new(&config.tts.api_base, keys.tts.clone()),
        Duration::from_secs(config.tts.timeout_secs),
    )?;
    let streamer = SpeechSynthesisStreamer::new(Arc::new(synthesizer))
        .with_voice(&config.tts.voice)
        .with_model(&config.tts.model)
        .with_language(&config.stt.language)
        .with_max_frame_bytes(config.server.max_frame_bytes);

    let store: Arc<dyn InteractionStore> = match &config.persistence.path {
        Some(path) => {
            tracing::info!(path = %path.display(), "recording interactions");
            Arc::new(JsonlStore::new(path))
        }
        None => Arc::new(NullStore),
    };

    Ok(
        PipelineCoordinator::new(transcriber, filter, Arc::new(chat), streamer)
            .with_segmenter(SpeechSegmenter::new(config.segmenter_config()))
            .with_store(store),
    )
}

/// Opens a session with the configured defaults and optional client hints.
pub fn open_session(
    config: &Config,
    platform: Platform,
    language: Option<&str>,
    prompt: Option<&str>,
) -> Session {
    let language = language
        .filter(|l| !l.trim().is_empty())
        .unwrap_or(&config.stt.language);
    Session::new(platform, language)
        .with_prompt(prompt.map(str::to_string))
        .with_history_limit(config.reply.history_turns)
}

/// Decode, segment and transcribe one audio file.
pub async fn transcribe_file(
    coordinator: &PipelineCoordinator,
    path: &Path,
    platform: Platform,
    language: &str,
    prompt: Option<&str>,
) -> Result<TranscriptionResult> {
    let bytes = tokio::fs::read(path).await?;
    tracing::debug!(path = %path.display(), bytes = bytes.len(), %platform, "transcribing file");
    let speech = coordinator.prepare_audio(bytes, platform).await?;
    Ok(coordinator
        .transcriber()
        .transcribe(&speech, language, prompt)
        .await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::AudioBuffer;
    use crate::audio::codec::encode_wav;
    use crate::moderation::MockModerator;
    use crate::reply::MockReplyGenerator;
    use crate::stt::MockRecognizer;
    use crate::tts::MockSynthesizer;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn mock_coordinator(recognizer: &MockRecognizer) -> PipelineCoordinator {
        PipelineCoordinator::new(
            TranscriptionClient::new(Arc::new(recognizer.clone()), "en"),
            ContentFilter::new(Arc::new(MockModerator::new())),
            Arc::new(MockReplyGenerator::new("ok")),
            SpeechSynthesisStreamer::new(Arc::new(MockSynthesizer::new(1, 4))),
        )
    }

    fn speech_wav() -> Vec<u8> {
        let samples: Vec<i16> = (0..16_000)
            .map(|i| {
                let t = i as f32 / 16_000.0;
                ((2.0 * std::f32::consts::PI * 220.0 * t).sin() * 12_000.0) as i16
            })
            .collect();
        encode_wav(&AudioBuffer::from_samples(&samples, 16_000, 1)).unwrap()
    }

    #[test]
    fn build_coordinator_from_default_config() {
        let coordinator = build_coordinator(&Config::default()).unwrap();
        assert_eq!(coordinator.transcriber().language(), "en");
    }

    #[test]
    fn zero_request_timeout_fails_to_build() {
        let mut config = Config::default();
        config.reply.timeout_secs = 0;
        assert!(matches!(
            build_coordinator(&config),
            Err(crate::error::VoxgateError::HttpClient { .. })
        ));
    }

    #[test]
    fn open_session_prefers_client_language() {
        let config = Config::default();
        let session = open_session(&config, Platform::Web, Some("de"), Some("names"));
        assert_eq!(session.language(), "de");
        assert_eq!(session.prompt().as_deref(), Some("names"));

        let session = open_session(&config, Platform::Raw, Some(" "), None);
        assert_eq!(session.language(), "en");
        assert_eq!(session.prompt(), None);
    }

    #[tokio::test]
    async fn transcribe_file_runs_the_audio_chain() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(&speech_wav()).unwrap();

        let recognizer = MockRecognizer::new().with_response("hello there");
        let coordinator = mock_coordinator(&recognizer);
        let result = transcribe_file(&coordinator, file.path(), Platform::Raw, "en", None)
            .await
            .unwrap();
        assert_eq!(result.text, "hello there");
        assert_eq!(recognizer.calls(), 1);
    }

    #[tokio::test]
    async fn transcribe_missing_file_is_io_error() {
        let recognizer = MockRecognizer::new();
        let coordinator = mock_coordinator(&recognizer);
        let result = transcribe_file(
            &coordinator,
            Path::new("/nonexistent/clip.wav"),
            Platform::Raw,
            "en",
            None,
        )
        .await;
        assert!(matches!(result, Err(crate::error::VoxgateError::Io(_))));
    }
}
