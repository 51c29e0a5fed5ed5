//! Error types for voxgate.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoxgateError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Ingestion errors
    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    #[error("No speech detected")]
    NoSpeechDetected,

    #[error("Transcription service error: {message}")]
    TranscriptionService { message: String },

    #[error("Moderation service error: {message}")]
    ModerationService { message: String },

    // Egress errors
    #[error("Synthesis service error: {message}")]
    SynthesisService { message: String },

    #[error("Protocol framing error: {message}")]
    ProtocolFraming { message: String },

    #[error("Reply generation failed: {message}")]
    ReplyGeneration { message: String },

    #[error("Outbound channel closed: {message}")]
    SinkClosed { message: String },

    #[error("Failed to build HTTP client: {message}")]
    HttpClient { message: String },

    // Collaborators
    #[error("Persistence error: {message}")]
    Persistence { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl VoxgateError {
    /// Returns true for failures of the ingestion half (decode, segment,
    /// transcribe), which degrade to "no response this turn".
    pub fn is_ingestion(&self) -> bool {
        matches!(
            self,
            VoxgateError::Decode { .. }
                | VoxgateError::NoSpeechDetected
                | VoxgateError::TranscriptionService { .. }
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, VoxgateError>;
