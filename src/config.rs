use crate::audio::{AssemblerConfig, SegmenterConfig};
use crate::defaults;
use crate::error::{Result, VoxgateError};
use crate::moderation::FailurePolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub stt: SttConfig,
    pub moderation: ModerationConfig,
    pub tts: TtsConfig,
    pub reply: ReplyConfig,
    pub persistence: PersistenceConfig,
    /// API keys, only ever read from the environment.
    #[serde(skip)]
    pub credentials: Credentials,
}

/// Gateway listener configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Largest binary frame sent to web and raw clients.
    pub max_frame_bytes: usize,
    /// Capacity of each session's inbound and outbound queues.
    pub channel_capacity: usize,
}

/// Segmentation and endpointing configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioConfig {
    pub silence_threshold_dbfs: f32,
    pub min_silence_ms: u32,
    pub keep_silence_ms: u32,
    pub low_pass_cutoff_hz: f32,
    pub normalize_headroom_db: f32,
    pub frame_ms: u32,
    /// Telephony utterances are cut at this length.
    pub max_utterance_ms: u32,
}

/// Speech-to-text configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SttConfig {
    /// The one language served; others get an empty transcript.
    pub language: String,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

/// Content moderation configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModerationConfig {
    pub model: String,
    /// `closed` redacts when the service is unreachable, `open` lets text through.
    pub on_failure: FailurePolicy,
    pub redaction_marker: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

/// Speech synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TtsConfig {
    pub voice: String,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

/// Reply generator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReplyConfig {
    pub model: String,
    pub system_prompt: Option<String>,
    pub history_turns: usize,
    pub api_base: String,
    pub timeout_secs: u64,
}

/// Interaction log configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON-lines file to append interactions to. Unset disables recording.
    pub path: Option<PathBuf>,
}

/// Per-capability API keys.
#[derive(Clone, PartialEq, Default)]
pub struct Credentials {
    pub stt: Option<String>,
    pub moderation: Option<String>,
    pub tts: Option<String>,
    pub llm: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("Credentials")
            .field("stt", &redact(&self.stt))
            .field("moderation", &redact(&self.moderation))
            .field("tts", &redact(&self.tts))
            .field("llm", &redact(&self.llm))
            .finish()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: defaults::BIND_ADDR.to_string(),
            max_frame_bytes: defaults::MAX_FRAME_BYTES,
            channel_capacity: defaults::SESSION_CHANNEL_CAPACITY,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            silence_threshold_dbfs: defaults::SILENCE_THRESHOLD_DBFS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            keep_silence_ms: defaults::KEEP_SILENCE_MS,
            low_pass_cutoff_hz: defaults::LOW_PASS_CUTOFF_HZ,
            normalize_headroom_db: defaults::NORMALIZE_HEADROOM_DB,
            frame_ms: defaults::ANALYSIS_FRAME_MS,
            max_utterance_ms: defaults::MAX_UTTERANCE_MS,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            language: defaults::DEFAULT_LANGUAGE.to_string(),
            model: defaults::STT_MODEL.to_string(),
            api_base: defaults::API_BASE.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            model: defaults::MODERATION_MODEL.to_string(),
            on_failure: FailurePolicy::Closed,
            redaction_marker: defaults::REDACTION_MARKER.to_string(),
            api_base: defaults::API_BASE.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            voice: defaults::VOICE_ID.to_string(),
            model: defaults::TTS_MODEL.to_string(),
            api_base: defaults::API_BASE.to_string(),
            timeout_secs: defaults::SYNTHESIS_TIMEOUT_SECS,
        }
    }
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            model: defaults::LLM_MODEL.to_string(),
            system_prompt: None,
            history_turns: defaults::HISTORY_TURNS,
            api_base: defaults::API_BASE.to_string(),
            timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
        }
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn invalid(key: &str, message: &str) -> VoxgateError {
    VoxgateError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.to_string(),
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VoxgateError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - VOXGATE_LANGUAGE → stt.language
    /// - VOXGATE_BIND → server.bind
    /// - VOXGATE_VOICE → tts.voice
    /// - VOXGATE_TTS_MODEL → tts.model
    /// - VOXGATE_LLM_MODEL → reply.model
    /// - VOXGATE_API_BASE → api_base of every capability
    /// - VOXGATE_{STT,MODERATION,TTS,LLM}_API_KEY, each falling back to OPENAI_API_KEY
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(language) = env_value("VOXGATE_LANGUAGE") {
            self.stt.language = language;
        }
        if let Some(bind) = env_value("VOXGATE_BIND") {
            self.server.bind = bind;
        }
        if let Some(voice) = env_value("VOXGATE_VOICE") {
            self.tts.voice = voice;
        }
        if let Some(model) = env_value("VOXGATE_TTS_MODEL") {
            self.tts.model = model;
        }
        if let Some(model) = env_value("VOXGATE_LLM_MODEL") {
            self.reply.model = model;
        }
        if let Some(base) = env_value("VOXGATE_API_BASE") {
            self.stt.api_base = base.clone();
            self.moderation.api_base = base.clone();
            self.tts.api_base = base.clone();
            self.reply.api_base = base;
        }

        let fallback = env_value("OPENAI_API_KEY");
        let key = |name: &str| env_value(name).or_else(|| fallback.clone());
        self.credentials = Credentials {
            stt: key("VOXGATE_STT_API_KEY"),
            moderation: key("VOXGATE_MODERATION_API_KEY"),
            tts: key("VOXGATE_TTS_API_KEY"),
            llm: key("VOXGATE_LLM_API_KEY"),
        };

        self
    }

    /// Sets every capability's request timeout, keeping synthesis at least as long.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        let secs = timeout.as_secs().max(1);
        self.stt.timeout_secs = secs;
        self.moderation.timeout_secs = secs;
        self.reply.timeout_secs = secs;
        self.tts.timeout_secs = self.tts.timeout_secs.max(secs);
        self
    }

    /// Rejects values no component can work with.
    pub fn validate(&self) -> Result<()> {
        self.server
            .bind
            .parse::<SocketAddr>()
            .map_err(|e| invalid("server.bind", &e.to_string()))?;
        if self.server.max_frame_bytes == 0 {
            return Err(invalid("server.max_frame_bytes", "must be positive"));
        }
        if self.server.channel_capacity == 0 {
            return Err(invalid("server.channel_capacity", "must be positive"));
        }

        let audio = &self.audio;
        if !audio.silence_threshold_dbfs.is_finite() || audio.silence_threshold_dbfs >= 0.0 {
            return Err(invalid(
                "audio.silence_threshold_dbfs",
                "must be a negative dBFS value",
            ));
        }
        if audio.frame_ms == 0 {
            return Err(invalid("audio.frame_ms", "must be positive"));
        }
        if audio.min_silence_ms == 0 {
            return Err(invalid("audio.min_silence_ms", "must be positive"));
        }
        if !audio.low_pass_cutoff_hz.is_finite() || audio.low_pass_cutoff_hz <= 0.0 {
            return Err(invalid("audio.low_pass_cutoff_hz", "must be positive"));
        }
        if !audio.normalize_headroom_db.is_finite() || audio.normalize_headroom_db < 0.0 {
            return Err(invalid("audio.normalize_headroom_db", "must not be negative"));
        }
        if audio.max_utterance_ms < audio.min_silence_ms {
            return Err(invalid(
                "audio.max_utterance_ms",
                "must be at least audio.min_silence_ms",
            ));
        }

        if self.stt.language.trim().is_empty() {
            return Err(invalid("stt.language", "must not be empty"));
        }
        for (key, secs) in [
            ("stt.timeout_secs", self.stt.timeout_secs),
            ("moderation.timeout_secs", self.moderation.timeout_secs),
            ("tts.timeout_secs", self.tts.timeout_secs),
            ("reply.timeout_secs", self.reply.timeout_secs),
        ] {
            if secs == 0 {
                return Err(invalid(key, "must be positive"));
            }
        }
        Ok(())
    }

    pub fn segmenter_config(&self) -> SegmenterConfig {
        SegmenterConfig {
            silence_threshold_dbfs: self.audio.silence_threshold_dbfs,
            min_silence_ms: self.audio.min_silence_ms,
            keep_silence_ms: self.audio.keep_silence_ms,
            low_pass_cutoff_hz: self.audio.low_pass_cutoff_hz,
            normalize_headroom_db: self.audio.normalize_headroom_db,
            frame_ms: self.audio.frame_ms,
        }
    }

    pub fn assembler_config(&self) -> AssemblerConfig {
        AssemblerConfig {
            speech_threshold_dbfs: self.audio.silence_threshold_dbfs,
            min_silence_ms: self.audio.min_silence_ms,
            max_utterance_ms: self.audio.max_utterance_ms,
            pre_roll_ms: self.audio.keep_silence_ms,
        }
    }

    /// TOML rendering without credentials.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VoxgateError::ConfigParse {
            message: e.to_string(),
        })
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/voxgate/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("voxgate")
            .join("config.toml")
    }
}
