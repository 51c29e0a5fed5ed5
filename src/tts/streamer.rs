//! Synthesizes reply text and streams it to a session as platform frames.
//!
//! State per call: `Idle -> Requesting -> Streaming -> Done`, or `Cancelled`
//! from `Idle` or `Streaming` when the session's cancellation flag is seen.
//! The flag is polled before every outbound frame, so once cancellation is
//! observed nothing more reaches the sink.

use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::pipeline::session::CancelFlag;
use crate::platform::Platform;
use crate::transport::{FrameSink, OutboundFrame};
use crate::tts::synthesizer::{AudioEncoding, SpeechSynthesizer, SynthesisRequest};
use futures_util::StreamExt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Requesting,
    Streaming,
    Done,
    Cancelled,
}

/// Terminal state of one `stream` call plus what was sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOutcome {
    pub state: StreamState,
    /// Synthesized chunks forwarded.
    pub chunks: usize,
    /// Frames written to the sink, including the closing mark.
    pub frames: usize,
    /// Audio bytes forwarded.
    pub bytes: usize,
}

impl StreamOutcome {
    fn new() -> Self {
        Self {
            state: StreamState::Idle,
            chunks: 0,
            frames: 0,
            bytes: 0,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.state == StreamState::Cancelled
    }
}

#[derive(Clone)]
pub struct SpeechSynthesisStreamer {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    voice_id: String,
    model: String,
    language: String,
    max_frame_bytes: usize,
    mark_name: String,
}

impl SpeechSynthesisStreamer {
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        Self {
            synthesizer,
            voice_id: defaults::VOICE_ID.to_string(),
            model: defaults::TTS_MODEL.to_string(),
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            max_frame_bytes: defaults::MAX_FRAME_BYTES,
            mark_name: defaults::TELEPHONY_MARK_NAME.to_string(),
        }
    }

    pub fn with_voice(mut self, voice_id: &str) -> Self {
        self.voice_id = voice_id.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }

    pub fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes.max(1);
        self
    }

    pub fn with_mark_name(mut self, name: &str) -> Self {
        self.mark_name = name.to_string();
        self
    }

    async fn emit(
        &self,
        sink: &dyn FrameSink,
        frame: OutboundFrame,
        outcome: &mut StreamOutcome,
    ) -> Result<()> {
        if let Err(e) = sink.send(frame).await {
            tracing::error!(sink = sink.name(), error = %e, "failed to write outbound frame");
            return Err(e);
        }
        outcome.frames += 1;
        Ok(())
    }

    /// The stream id frames will carry, or a framing error when `platform`
    /// cannot be framed without one.
    pub fn destination(platform: Platform, stream_id: Option<&str>) -> Result<Option<&str>> {
        match (platform, stream_id) {
            (Platform::Telephony, Some(id)) if !id.is_empty() => Ok(Some(id)),
            (Platform::Telephony, _) => Err(VoxgateError::ProtocolFraming {
                message: "telephony destination requires a stream id".to_string(),
            }),
            _ => Ok(None),
        }
    }

    /// Synthesizes `text` and writes it to `sink` framed for `platform`.
    ///
    /// Telephony requires `stream_id`; without it this fails with
    /// [`VoxgateError::ProtocolFraming`] before any remote call.
    pub async fn stream(
        &self,
        text: &str,
        sink: &dyn FrameSink,
        platform: Platform,
        stream_id: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<StreamOutcome> {
        let mut outcome = StreamOutcome::new();

        let stream_id = Self::destination(platform, stream_id)?;

        if cancel.is_cancelled() {
            outcome.state = StreamState::Cancelled;
            return Ok(outcome);
        }
        if text.trim().is_empty() {
            outcome.state = StreamState::Done;
            return Ok(outcome);
        }

        outcome.state = StreamState::Requesting;
        let request = SynthesisRequest::new(text)
            .with_voice(&self.voice_id)
            .with_model(&self.model)
            .with_language(&self.language)
            .with_encoding(AudioEncoding::for_platform(platform));
        let mut chunks = self.synthesizer.synthesize(&request).await?;

        outcome.state = StreamState::Streaming;
        tracing::debug!(%platform, chars = text.len(), "streaming synthesized reply");
        while let Some(chunk) = chunks.next().await {
            let chunk = chunk?;
            if chunk.is_empty() {
                continue;
            }
            outcome.chunks += 1;
            outcome.bytes += chunk.len();

            match stream_id {
                Some(id) => {
                    if cancel.is_cancelled() {
                        outcome.state = StreamState::Cancelled;
                        break;
                    }
                    self.emit(sink, OutboundFrame::media(id, &chunk), &mut outcome)
                        .await?;
                }
                None => {
                    for piece in chunk.chunks(self.max_frame_bytes) {
                        if cancel.is_cancelled() {
                            outcome.state = StreamState::Cancelled;
                            break;
                        }
                        self.emit(sink, OutboundFrame::RawBinary(piece.to_vec()), &mut outcome)
                            .await?;
                    }
                    if outcome.is_cancelled() {
                        break;
                    }
                }
            }
        }

        if outcome.is_cancelled() {
            tracing::info!(frames = outcome.frames, "reply cancelled");
            return Ok(outcome);
        }

        if let Some(id) = stream_id {
            if cancel.is_cancelled() {
                outcome.state = StreamState::Cancelled;
                tracing::info!(frames = outcome.frames, "reply cancelled before mark");
                return Ok(outcome);
            }
            self.emit(sink, OutboundFrame::mark(id, &self.mark_name), &mut outcome)
                .await?;
        }

        outcome.state = StreamState::Done;
        tracing::debug!(
            chunks = outcome.chunks,
            frames = outcome.frames,
            bytes = outcome.bytes,
            "reply streamed"
        );
        Ok(outcome)
    }
}

impl std::fmt::Debug for SpeechSynthesisStreamer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechSynthesisStreamer")
            .field("voice_id", &self.voice_id)
            .field("model", &self.model)
            .field("max_frame_bytes", &self.max_frame_bytes)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::CollectorSink;
    use crate::tts::MockSynthesizer;
    use async_trait::async_trait;

    fn streamer(mock: &MockSynthesizer) -> SpeechSynthesisStreamer {
        SpeechSynthesisStreamer::new(Arc::new(mock.clone()))
    }

    /// Cancels the session after a fixed number of frames.
    struct CancellingSink {
        inner: CollectorSink,
        after: usize,
        cancel: CancelFlag,
    }

    #[async_trait]
    impl FrameSink for CancellingSink {
        async fn send(&self, frame: OutboundFrame) -> Result<()> {
            self.inner.send(frame).await?;
            if self.inner.frames().len() >= self.after {
                self.cancel.cancel();
            }
            Ok(())
        }

        fn name(&self) -> &'static str {
            "cancelling"
        }
    }

    #[tokio::test]
    async fn telephony_sends_one_media_per_chunk_then_one_mark() {
        let mock = MockSynthesizer::new(4, 160);
        let sink = CollectorSink::new();
        let outcome = streamer(&mock)
            .stream("hello", &sink, Platform::Telephony, Some("CA123"), &CancelFlag::new())
            .await
            .unwrap();

        let frames = sink.frames();
        assert_eq!(outcome.state, StreamState::Done);
        assert_eq!(frames.len(), 5);
        for frame in &frames[..4] {
            assert!(matches!(frame, OutboundFrame::TelephonyMedia { stream_id, .. } if stream_id == "CA123"));
        }
        assert_eq!(frames[4], OutboundFrame::mark("CA123", "done"));
    }

    #[tokio::test]
    async fn telephony_without_stream_id_fails_before_synthesis() {
        let mock = MockSynthesizer::new(1, 10);
        let sink = CollectorSink::new();
        let result = streamer(&mock)
            .stream("hello", &sink, Platform::Telephony, None, &CancelFlag::new())
            .await;
        assert!(matches!(result, Err(VoxgateError::ProtocolFraming { .. })));
        assert_eq!(mock.calls(), 0);
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn destination_needs_stream_id_only_for_telephony() {
        assert_eq!(
            SpeechSynthesisStreamer::destination(Platform::Telephony, Some("CA1")).unwrap(),
            Some("CA1")
        );
        assert!(SpeechSynthesisStreamer::destination(Platform::Telephony, Some("")).is_err());
        assert!(SpeechSynthesisStreamer::destination(Platform::Telephony, None).is_err());
        assert_eq!(
            SpeechSynthesisStreamer::destination(Platform::Web, Some("ignored")).unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn web_chunks_are_split_at_frame_limit() {
        let mock = MockSynthesizer::new(2, 100);
        let sink = CollectorSink::new();
        let outcome = streamer(&mock)
            .with_max_frame_bytes(40)
            .stream("hello", &sink, Platform::Web, None, &CancelFlag::new())
            .await
            .unwrap();

        let sizes: Vec<usize> = sink.frames().iter().map(|f| f.len()).collect();
        assert_eq!(sizes, vec![40, 40, 20, 40, 40, 20]);
        assert_eq!(outcome.chunks, 2);
        assert_eq!(outcome.bytes, 200);
        assert!(sink
            .frames()
            .iter()
            .all(|f| matches!(f, OutboundFrame::RawBinary(_))));
    }

    #[tokio::test]
    async fn cancelled_before_start_makes_no_request() {
        let mock = MockSynthesizer::new(3, 10);
        let sink = CollectorSink::new();
        let cancel = CancelFlag::new();
        cancel.cancel();
        let outcome = streamer(&mock)
            .stream("hello", &sink, Platform::Raw, None, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome.state, StreamState::Cancelled);
        assert_eq!(mock.calls(), 0);
        assert!(sink.frames().is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_stream_stops_frames_and_mark() {
        let mock = MockSynthesizer::new(10, 160);
        let cancel = CancelFlag::new();
        let sink = CancellingSink {
            inner: CollectorSink::new(),
            after: 3,
            cancel: cancel.clone(),
        };
        let outcome = streamer(&mock)
            .stream("hello", &sink, Platform::Telephony, Some("CA9"), &cancel)
            .await
            .unwrap();

        assert_eq!(outcome.state, StreamState::Cancelled);
        let frames = sink.inner.frames();
        assert_eq!(frames.len(), 3);
        assert!(!frames
            .iter()
            .any(|f| matches!(f, OutboundFrame::TelephonyMark { .. })));
    }

    #[tokio::test]
    async fn synthesis_failure_surfaces() {
        let mock = MockSynthesizer::new(1, 1).with_failure();
        let sink = CollectorSink::new();
        let result = streamer(&mock)
            .stream("hello", &sink, Platform::Web, None, &CancelFlag::new())
            .await;
        assert!(matches!(result, Err(VoxgateError::SynthesisService { .. })));
    }

    #[tokio::test]
    async fn empty_text_sends_nothing() {
        let mock = MockSynthesizer::new(2, 2);
        let sink = CollectorSink::new();
        let outcome = streamer(&mock)
            .stream("  ", &sink, Platform::Telephony, Some("CA1"), &CancelFlag::new())
            .await
            .unwrap();
        assert_eq!(outcome.state, StreamState::Done);
        assert_eq!(mock.calls(), 0);
        assert!(sink.frames().is_empty());
    }
}
