//! Transport platform a session talks to.

use crate::error::VoxgateError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Decides the decode path on ingress and the framing on egress.
///
/// Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    /// Browser clients uploading WebM/Opus blobs.
    #[default]
    Web,
    /// Telephony media streams carrying 8 kHz u-law.
    #[serde(alias = "twilio")]
    Telephony,
    /// Clients sending canonical PCM (or WAV).
    Raw,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Web => "web",
            Platform::Telephony => "telephony",
            Platform::Raw => "raw",
        }
    }

    /// Whether egress uses the telephony JSON envelope instead of bare binary frames.
    pub fn uses_media_events(&self) -> bool {
        matches!(self, Platform::Telephony)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = VoxgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Platform::Web),
            "telephony" | "twilio" => Ok(Platform::Telephony),
            "raw" | "pcm" => Ok(Platform::Raw),
            other => Err(VoxgateError::ConfigInvalidValue {
                key: "platform".to_string(),
                message: format!("unknown platform '{other}' (expected web, telephony or raw)"),
            }),
        }
    }
}
