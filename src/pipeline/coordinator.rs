//! Drives one conversational turn from inbound bytes to outbound frames.

use crate::audio::codec;
use crate::audio::{AudioBuffer, SpeechSegmenter};
use crate::error::{Result, VoxgateError};
use crate::moderation::ContentFilter;
use crate::pipeline::session::Session;
use crate::platform::Platform;
use crate::reply::ReplyGenerator;
use crate::store::{InteractionRecord, InteractionStore, NullStore};
use crate::stt::TranscriptionClient;
use crate::transport::FrameSink;
use crate::tts::SpeechSynthesisStreamer;
use std::sync::Arc;
use std::time::Instant;

/// One chunk of client audio that makes up a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundAudio {
    pub bytes: Vec<u8>,
    pub platform: Platform,
    /// Falls back to the session language when unset.
    pub language: Option<String>,
    /// Falls back to the session prompt when unset.
    pub prompt: Option<String>,
}

impl InboundAudio {
    pub fn new(bytes: Vec<u8>, platform: Platform) -> Self {
        Self {
            bytes,
            platform,
            language: None,
            prompt: None,
        }
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = Some(language.to_string());
        self
    }

    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }
}

/// How a turn ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The bytes could not be decoded, or there were none.
    NoAudio,
    /// Decoded audio held no speech above the silence threshold.
    NoSpeech,
    UnsupportedLanguage,
    EmptyTranscript,
    /// The transcript was flagged; nothing was generated.
    InputRedacted { reason: Option<String> },
    /// The generated reply was flagged; nothing was synthesized.
    ReplyRedacted {
        transcript: String,
        reason: Option<String>,
    },
    Completed {
        transcript: String,
        reply: String,
        frames: usize,
    },
    /// The client interrupted the reply.
    Cancelled {
        transcript: String,
        reply: String,
        frames: usize,
    },
}

impl TurnOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TurnOutcome::NoAudio => "no_audio",
            TurnOutcome::NoSpeech => "no_speech",
            TurnOutcome::UnsupportedLanguage => "unsupported_language",
            TurnOutcome::EmptyTranscript => "empty_transcript",
            TurnOutcome::InputRedacted { .. } => "input_redacted",
            TurnOutcome::ReplyRedacted { .. } => "reply_redacted",
            TurnOutcome::Completed { .. } => "completed",
            TurnOutcome::Cancelled { .. } => "cancelled",
        }
    }

    /// Whether any reply audio reached the client.
    pub fn replied(&self) -> bool {
        matches!(
            self,
            TurnOutcome::Completed { .. } | TurnOutcome::Cancelled { .. }
        )
    }
}

/// Clears the session's replying flag however the stream ends.
struct ReplyingGuard<'a>(&'a Session);

impl<'a> ReplyingGuard<'a> {
    fn enter(session: &'a Session) -> Self {
        session.set_replying(true);
        Self(session)
    }
}

impl Drop for ReplyingGuard<'_> {
    fn drop(&mut self) {
        self.0.set_replying(false);
    }
}

/// Capability clients are injected once at startup and shared by every session.
#[derive(Clone)]
pub struct PipelineCoordinator {
    segmenter: Arc<SpeechSegmenter>,
    transcriber: TranscriptionClient,
    filter: ContentFilter,
    replies: Arc<dyn ReplyGenerator>,
    streamer: SpeechSynthesisStreamer,
    store: Arc<dyn InteractionStore>,
}

impl PipelineCoordinator {
    pub fn new(
        transcriber: TranscriptionClient,
        filter: ContentFilter,
        replies: Arc<dyn ReplyGenerator>,
        streamer: SpeechSynthesisStreamer,
    ) -> Self {
        Self {
            segmenter: Arc::new(SpeechSegmenter::default()),
            transcriber,
            filter,
            replies,
            streamer,
            store: Arc::new(NullStore),
        }
    }

    pub fn with_segmenter(mut self, segmenter: SpeechSegmenter) -> Self {
        self.segmenter = Arc::new(segmenter);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn InteractionStore>) -> Self {
        self.store = store;
        self
    }

    pub fn transcriber(&self) -> &TranscriptionClient {
        &self.transcriber
    }

    /// Decode, normalize, suppress noise, segment and recombine on the
    /// blocking pool.
    pub async fn prepare_audio(&self, bytes: Vec<u8>, platform: Platform) -> Result<AudioBuffer> {
        let segmenter = Arc::clone(&self.segmenter);
        tokio::task::spawn_blocking(move || {
            let decoded = codec::decode(&bytes, platform)?;
            tracing::debug!(
                %platform,
                duration_ms = decoded.duration_ms(),
                "decoded inbound audio"
            );
            segmenter.process(&decoded)
        })
        .await
        .map_err(|e| VoxgateError::Other(format!("audio worker failed: {e}")))?
    }

    /// Runs one turn for `session`, writing any reply to `sink`.
    ///
    /// Turns of one session run one at a time in arrival order. Ingestion
    /// problems end the turn with an outcome; egress failures are errors.
    pub async fn handle_turn(
        &self,
        session: &Session,
        audio: InboundAudio,
        sink: &dyn FrameSink,
    ) -> Result<TurnOutcome> {
        let _turn = session.begin_turn().await;
        let started = Instant::now();
        let outcome = self.run_turn(session, audio, sink).await;
        match &outcome {
            Ok(outcome) => tracing::info!(
                session = %session.id(),
                outcome = outcome.label(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "turn finished"
            ),
            Err(e) => tracing::error!(
                session = %session.id(),
                error = %e,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "turn failed"
            ),
        }
        outcome
    }

    async fn run_turn(
        &self,
        session: &Session,
        audio: InboundAudio,
        sink: &dyn FrameSink,
    ) -> Result<TurnOutcome> {
        if audio.bytes.is_empty() {
            return Ok(TurnOutcome::NoAudio);
        }
        // Decode and framing must agree on one platform.
        let platform = session.platform();
        if audio.platform != platform {
            return Err(VoxgateError::ProtocolFraming {
                message: format!(
                    "{} audio sent to a {platform} session",
                    audio.platform
                ),
            });
        }
        let language = audio
            .language
            .clone()
            .unwrap_or_else(|| session.language().to_string());
        if !self.transcriber.supports_language(&language) {
            tracing::info!(session = %session.id(), %language, "language not served");
            return Ok(TurnOutcome::UnsupportedLanguage);
        }
        // Refuse turns that could never be framed before any remote call.
        let stream_id = session.stream_id();
        SpeechSynthesisStreamer::destination(platform, stream_id.as_deref())?;
        let prompt = audio.prompt.clone().or_else(|| session.prompt());

        let speech = match self.prepare_audio(audio.bytes, platform).await {
            Ok(speech) => speech,
            Err(VoxgateError::Decode { message }) => {
                tracing::warn!(session = %session.id(), %message, "could not decode inbound audio");
                return Ok(TurnOutcome::NoAudio);
            }
            Err(VoxgateError::NoSpeechDetected) => return Ok(TurnOutcome::NoSpeech),
            Err(e) => return Err(e),
        };

        let transcript = self
            .transcriber
            .transcribe(&speech, &language, prompt.as_deref())
            .await;
        if transcript.is_empty() {
            return Ok(TurnOutcome::EmptyTranscript);
        }

        let input = self.filter.moderate(&transcript.text).await;
        if input.flagged {
            return Ok(TurnOutcome::InputRedacted {
                reason: input.reason,
            });
        }

        let reply = self
            .replies
            .generate_reply(&session.context(), &input.safe_text)
            .await?;
        let verdict = self.filter.moderate(&reply).await;
        if verdict.flagged {
            return Ok(TurnOutcome::ReplyRedacted {
                transcript: input.safe_text,
                reason: verdict.reason,
            });
        }

        let streamed = {
            let _replying = ReplyingGuard::enter(session);
            self.streamer
                .stream(
                    &verdict.safe_text,
                    sink,
                    platform,
                    stream_id.as_deref(),
                    session.cancel_flag(),
                )
                .await?
        };

        session.push_history(&input.safe_text, &verdict.safe_text);
        let record = InteractionRecord::new(session.id(), &input.safe_text, &verdict.safe_text);
        if let Err(e) = self.store.record(&record).await {
            tracing::warn!(session = %session.id(), error = %e, "failed to record interaction");
        }

        if streamed.is_cancelled() {
            Ok(TurnOutcome::Cancelled {
                transcript: input.safe_text,
                reply: verdict.safe_text,
                frames: streamed.frames,
            })
        } else {
            Ok(TurnOutcome::Completed {
                transcript: input.safe_text,
                reply: verdict.safe_text,
                frames: streamed.frames,
            })
        }
    }
}

impl std::fmt::Debug for PipelineCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineCoordinator")
            .field("segmenter", &self.segmenter)
            .field("transcriber", &self.transcriber)
            .field("filter", &self.filter)
            .field("streamer", &self.streamer)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::MockModerator;
    use crate::reply::MockReplyGenerator;
    use crate::store::MemoryStore;
    use crate::stt::MockRecognizer;
    use crate::transport::{CollectorSink, OutboundFrame};
    use crate::tts::MockSynthesizer;

    struct Fixture {
        recognizer: MockRecognizer,
        moderator: MockModerator,
        replies: MockReplyGenerator,
        synthesizer: MockSynthesizer,
        store: MemoryStore,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                recognizer: MockRecognizer::new().with_response("what time is it"),
                moderator: MockModerator::new(),
                replies: MockReplyGenerator::new("it is noon"),
                synthesizer: MockSynthesizer::new(2, 64),
                store: MemoryStore::new(),
            }
        }

        fn coordinator(&self) -> PipelineCoordinator {
            PipelineCoordinator::new(
                TranscriptionClient::new(Arc::new(self.recognizer.clone()), "en"),
                ContentFilter::new(Arc::new(self.moderator.clone())),
                Arc::new(self.replies.clone()),
                SpeechSynthesisStreamer::new(Arc::new(self.synthesizer.clone())),
            )
            .with_store(Arc::new(self.store.clone()))
        }
    }

    fn speech_pcm(ms: u32) -> Vec<u8> {
        let n = (16 * ms) as usize;
        (0..n)
            .map(|i| {
                let t = i as f64 / 16000.0;
                (6000.0 * (2.0 * std::f64::consts::PI * 300.0 * t).sin()) as i16
            })
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }

    #[tokio::test]
    async fn completed_turn_streams_and_records() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        let sink = CollectorSink::new();
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(speech_pcm(1000), Platform::Raw), &sink)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            TurnOutcome::Completed {
                transcript: "what time is it".to_string(),
                reply: "it is noon".to_string(),
                frames: 2,
            }
        );
        assert!(sink
            .frames()
            .iter()
            .all(|f| matches!(f, OutboundFrame::RawBinary(_))));
        assert_eq!(fixture.store.records().len(), 1);
        assert_eq!(session.context().history.len(), 1);
        assert!(!session.is_replying());
    }

    #[tokio::test]
    async fn empty_bytes_are_no_audio() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(Vec::new(), Platform::Raw), &CollectorSink::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::NoAudio);
        assert_eq!(fixture.recognizer.calls(), 0);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_no_audio() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(vec![1, 2, 3], Platform::Raw), &CollectorSink::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::NoAudio);
    }

    #[tokio::test]
    async fn silence_is_no_speech() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(vec![0; 32000], Platform::Raw), &CollectorSink::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::NoSpeech);
        assert_eq!(fixture.recognizer.calls(), 0);
    }

    #[tokio::test]
    async fn unsupported_language_skips_recognition() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        let audio = InboundAudio::new(speech_pcm(1000), Platform::Raw).with_language("de");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, audio, &CollectorSink::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::UnsupportedLanguage);
        assert_eq!(fixture.recognizer.calls(), 0);
    }

    #[tokio::test]
    async fn flagged_input_stops_before_reply() {
        let mut fixture = Fixture::new();
        fixture.moderator = MockModerator::new().flagging("time");
        let session = Session::new(Platform::Raw, "en");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(speech_pcm(1000), Platform::Raw), &CollectorSink::new())
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::InputRedacted { .. }));
        assert_eq!(fixture.replies.calls(), 0);
        assert_eq!(fixture.synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn flagged_reply_is_not_synthesized() {
        let mut fixture = Fixture::new();
        fixture.moderator = MockModerator::new().flagging("noon");
        let session = Session::new(Platform::Raw, "en");
        let sink = CollectorSink::new();
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(speech_pcm(1000), Platform::Raw), &sink)
            .await
            .unwrap();
        assert!(matches!(outcome, TurnOutcome::ReplyRedacted { .. }));
        assert_eq!(fixture.synthesizer.calls(), 0);
        assert!(sink.frames().is_empty());
        assert!(fixture.store.records().is_empty());
    }

    #[tokio::test]
    async fn reply_failure_surfaces() {
        let mut fixture = Fixture::new();
        fixture.replies = MockReplyGenerator::new("").with_failure();
        let session = Session::new(Platform::Raw, "en");
        let result = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(speech_pcm(1000), Platform::Raw), &CollectorSink::new())
            .await;
        assert!(matches!(result, Err(VoxgateError::ReplyGeneration { .. })));
    }

    #[tokio::test]
    async fn telephony_without_stream_id_is_framing_error() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Telephony, "en");
        let loud: Vec<u8> = (0..8000)
            .map(|i| if i % 2 == 0 { 0x90 } else { 0x10 })
            .collect();
        let result = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(loud, Platform::Telephony), &CollectorSink::new())
            .await;
        assert!(matches!(result, Err(VoxgateError::ProtocolFraming { .. })));
        assert_eq!(fixture.recognizer.calls(), 0);
        assert_eq!(fixture.moderator.calls(), 0);
        assert_eq!(fixture.replies.calls(), 0);
        assert_eq!(fixture.synthesizer.calls(), 0);
    }

    #[tokio::test]
    async fn language_is_checked_before_decoding() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Raw, "en");
        // Undecodable, but the language check comes first.
        let audio = InboundAudio::new(vec![1, 2, 3], Platform::Raw).with_language("fr");
        let outcome = fixture
            .coordinator()
            .handle_turn(&session, audio, &CollectorSink::new())
            .await
            .unwrap();
        assert_eq!(outcome, TurnOutcome::UnsupportedLanguage);
    }

    #[tokio::test]
    async fn audio_for_another_platform_is_refused() {
        let fixture = Fixture::new();
        let session = Session::new(Platform::Web, "en");
        let result = fixture
            .coordinator()
            .handle_turn(&session, InboundAudio::new(speech_pcm(1000), Platform::Raw), &CollectorSink::new())
            .await;
        assert!(matches!(result, Err(VoxgateError::ProtocolFraming { .. })));
        assert_eq!(fixture.recognizer.calls(), 0);
        assert_eq!(fixture.replies.calls(), 0);
    }

    #[test]
    fn outcome_labels_are_distinct() {
        assert_eq!(TurnOutcome::NoSpeech.label(), "no_speech");
        assert!(!TurnOutcome::EmptyTranscript.replied());
        assert!(
            TurnOutcome::Cancelled {
                transcript: String::new(),
                reply: String::new(),
                frames: 0
            }
            .replied()
        );
    }
}
