//! Default configuration constants for voxgate.
//!
//! Shared between the config file types, the pipeline components and their
//! builders so every entry point agrees on the same values.

/// Canonical sample rate in Hz for everything between the codec and the
/// recognition capability.
pub const SAMPLE_RATE: u32 = 16000;

/// Canonical channel count.
pub const CHANNELS: u16 = 1;

/// Canonical sample width in bytes (signed 16-bit little-endian).
pub const SAMPLE_WIDTH: u16 = 2;

/// Telephony (G.711 u-law) sample rate in Hz.
pub const TELEPHONY_SAMPLE_RATE: u32 = 8000;

/// Sample rate Opus always decodes at.
pub const OPUS_SAMPLE_RATE: u32 = 48000;

/// Sample rate of `pcm` responses from the synthesis capability.
pub const SYNTHESIS_PCM_RATE: u32 = 24000;

/// The single language served by the transcription client.
pub const DEFAULT_LANGUAGE: &str = "en";

/// Silence threshold in dBFS below which audio counts as silence.
pub const SILENCE_THRESHOLD_DBFS: f32 = -40.0;

/// Minimum run of silence (ms) that splits two voiced segments.
pub const MIN_SILENCE_MS: u32 = 500;

/// Silence kept on each side of a voiced segment (ms).
///
/// Avoids clipping word onsets and offsets at segment boundaries.
pub const KEEP_SILENCE_MS: u32 = 200;

/// Analysis window for loudness measurements during segmentation (ms).
pub const ANALYSIS_FRAME_MS: u32 = 10;

/// Low-pass cutoff used as the coarse noise-suppression step (Hz).
pub const LOW_PASS_CUTOFF_HZ: f32 = 3000.0;

/// Headroom left below full scale when normalizing (dB).
pub const NORMALIZE_HEADROOM_DB: f32 = 0.1;

/// Longest telephony utterance collected before a forced flush (ms).
pub const MAX_UTTERANCE_MS: u32 = 15_000;

/// Recognition model name.
pub const STT_MODEL: &str = "whisper-1";

/// Moderation model name.
pub const MODERATION_MODEL: &str = "omni-moderation-latest";

/// Marker returned in place of flagged text.
pub const REDACTION_MARKER: &str = "***";

/// Default synthesis voice.
pub const VOICE_ID: &str = "shimmer";

/// Default synthesis model.
pub const TTS_MODEL: &str = "tts-1";

/// Default chat model for the reply generator.
pub const LLM_MODEL: &str = "gpt-4o";

/// Base URL of the OpenAI-compatible capability APIs.
pub const API_BASE: &str = "https://api.openai.com/v1";

/// Largest binary frame sent to Web/Raw destinations.
pub const MAX_FRAME_BYTES: usize = 32 * 1024;

/// Name of the mark event that closes a telephony reply.
pub const TELEPHONY_MARK_NAME: &str = "done";

/// Per-call timeout for recognition, moderation and reply requests (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Per-call timeout for synthesis requests, including the streamed body (seconds).
pub const SYNTHESIS_TIMEOUT_SECS: u64 = 60;

/// TCP connect timeout for every capability client (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Text turns kept per session as reply context.
pub const HISTORY_TURNS: usize = 8;

/// Listen address for the gateway.
pub const BIND_ADDR: &str = "127.0.0.1:8765";

/// Capacity of per-session inbound and outbound channels.
pub const SESSION_CHANNEL_CAPACITY: usize = 64;
