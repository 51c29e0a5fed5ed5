//! voxgate - Real-time voice gateway
//!
//! Transcodes inbound browser, telephony and raw audio, strips silence,
//! transcribes it, moderates text in both directions and streams a
//! synthesized reply back in the client's own framing.

// Enforce error handling discipline
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
pub mod http;
pub mod moderation;
pub mod pipeline;
pub mod platform;
pub mod reply;
#[cfg(feature = "server")]
pub mod server;
pub mod store;
pub mod stt;
pub mod transport;
pub mod tts;

// Composition root - needs everything
pub mod app;

// Collaborator traits (recognize → moderate → reply → synthesize → sink)
pub use moderation::Moderator;
pub use reply::ReplyGenerator;
pub use store::InteractionStore;
pub use stt::SpeechRecognizer;
pub use transport::FrameSink;
pub use tts::SpeechSynthesizer;

// Pipeline components
pub use audio::{AudioBuffer, SpeechSegmenter, UtteranceAssembler};
pub use moderation::ContentFilter;
pub use pipeline::{CancelFlag, InboundAudio, PipelineCoordinator, Session, TurnOutcome};
pub use stt::TranscriptionClient;
pub use tts::SpeechSynthesisStreamer;

// Error handling
pub use error::{Result, VoxgateError};

// Config
pub use config::Config;
pub use platform::Platform;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
