//! Wire messages exchanged with clients.
//!
//! Telephony uses the media-stream JSON envelope (`connected`, `start`,
//! `media`, `mark`, `stop`, `clear`). Web and raw clients get bare binary
//! audio and may send small JSON control messages.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

/// One unit of egress for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    /// Synthesized audio for Web and Raw clients.
    RawBinary(Vec<u8>),
    /// One synthesized chunk, base64-encoded for the telephony envelope.
    TelephonyMedia { stream_id: String, payload: String },
    /// End-of-reply marker.
    TelephonyMark { stream_id: String, name: String },
}

impl OutboundFrame {
    pub fn media(stream_id: &str, audio: &[u8]) -> Self {
        OutboundFrame::TelephonyMedia {
            stream_id: stream_id.to_string(),
            payload: STANDARD.encode(audio),
        }
    }

    pub fn mark(stream_id: &str, name: &str) -> Self {
        OutboundFrame::TelephonyMark {
            stream_id: stream_id.to_string(),
            name: name.to_string(),
        }
    }

    /// Payload size on the wire.
    pub fn len(&self) -> usize {
        match self {
            OutboundFrame::RawBinary(data) => data.len(),
            OutboundFrame::TelephonyMedia { payload, .. } => payload.len(),
            OutboundFrame::TelephonyMark { name, .. } => name.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Telephony envelope for this frame, `None` for binary frames.
    pub fn to_telephony_message(&self) -> Option<TelephonyMessage> {
        match self {
            OutboundFrame::RawBinary(_) => None,
            OutboundFrame::TelephonyMedia { stream_id, payload } => Some(TelephonyMessage::Media {
                stream_sid: Some(stream_id.clone()),
                media: MediaPayload {
                    payload: payload.clone(),
                },
            }),
            OutboundFrame::TelephonyMark { stream_id, name } => Some(TelephonyMessage::Mark {
                stream_sid: Some(stream_id.clone()),
                mark: MarkPayload { name: name.clone() },
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaPayload {
    /// Base64 u-law audio.
    pub payload: String,
}

impl MediaPayload {
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.payload)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkPayload {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartPayload {
    #[serde(rename = "streamSid", default)]
    pub stream_sid: Option<String>,
    #[serde(rename = "callSid", default)]
    pub call_sid: Option<String>,
}

/// Telephony media-stream event, in either direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TelephonyMessage {
    Connected {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol: Option<String>,
    },
    Start {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        start: Option<StartPayload>,
    },
    Media {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        media: MediaPayload,
    },
    Mark {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
        mark: MarkPayload,
    },
    Stop {
        #[serde(rename = "streamSid", default, skip_serializing_if = "Option::is_none")]
        stream_sid: Option<String>,
    },
    /// Asks the far end to drop audio it has buffered but not yet played.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

impl TelephonyMessage {
    /// Stream id from a `start` event, top-level or nested.
    pub fn start_stream_sid(&self) -> Option<&str> {
        match self {
            TelephonyMessage::Start { stream_sid, start } => stream_sid
                .as_deref()
                .or_else(|| start.as_ref().and_then(|s| s.stream_sid.as_deref())),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// Text control messages from Web and Raw clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientControl {
    /// Stop the reply that is currently streaming.
    Interrupt,
    /// Replace the recognition prompt hint for following turns.
    Prompt { text: String },
}

impl ClientControl {
    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn media_frame_serializes_to_envelope() {
        let frame = OutboundFrame::media("CA123", &[1, 2, 3]);
        let json = frame.to_telephony_message().unwrap().to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({"event": "media", "streamSid": "CA123", "media": {"payload": "AQID"}})
        );
    }

    #[test]
    fn mark_frame_serializes_to_envelope() {
        let frame = OutboundFrame::mark("CA123", "done");
        let json = frame.to_telephony_message().unwrap().to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(
            value,
            json!({"event": "mark", "streamSid": "CA123", "mark": {"name": "done"}})
        );
    }

    #[test]
    fn binary_frame_has_no_envelope() {
        assert!(OutboundFrame::RawBinary(vec![0; 4]).to_telephony_message().is_none());
        assert_eq!(OutboundFrame::RawBinary(vec![0; 4]).len(), 4);
    }

    #[test]
    fn parses_inbound_start_with_nested_sid() {
        let msg = TelephonyMessage::from_json(
            r#"{"event":"start","sequenceNumber":"1","start":{"streamSid":"MZ1","callSid":"CA9","tracks":["inbound"]}}"#,
        )
        .unwrap();
        assert_eq!(msg.start_stream_sid(), Some("MZ1"));
    }

    #[test]
    fn parses_inbound_media_and_decodes_payload() {
        let msg = TelephonyMessage::from_json(
            r#"{"event":"media","sequenceNumber":"3","media":{"track":"inbound","chunk":"1","timestamp":"5","payload":"//8="},"streamSid":"MZ1"}"#,
        )
        .unwrap();
        match msg {
            TelephonyMessage::Media { stream_sid, media } => {
                assert_eq!(stream_sid.as_deref(), Some("MZ1"));
                assert_eq!(media.decode().unwrap(), vec![0xFF, 0xFF]);
            }
            other => panic!("expected media, got {other:?}"),
        }
    }

    #[test]
    fn parses_connected_and_stop() {
        assert!(matches!(
            TelephonyMessage::from_json(r#"{"event":"connected","protocol":"Call","version":"1.0.0"}"#),
            Ok(TelephonyMessage::Connected { .. })
        ));
        assert!(matches!(
            TelephonyMessage::from_json(r#"{"event":"stop","streamSid":"MZ1"}"#),
            Ok(TelephonyMessage::Stop { .. })
        ));
    }

    #[test]
    fn clear_serializes_with_stream_sid() {
        let json = TelephonyMessage::Clear {
            stream_sid: "MZ1".to_string(),
        }
        .to_json()
        .unwrap();
        assert_eq!(json, r#"{"event":"clear","streamSid":"MZ1"}"#);
    }

    #[test]
    fn client_controls_parse() {
        assert_eq!(
            ClientControl::from_json(r#"{"type":"interrupt"}"#).unwrap(),
            ClientControl::Interrupt
        );
        assert_eq!(
            ClientControl::from_json(r#"{"type":"prompt","text":"names: Ada"}"#).unwrap(),
            ClientControl::Prompt {
                text: "names: Ada".to_string()
            }
        );
        assert!(ClientControl::from_json(r#"{"type":"dance"}"#).is_err());
    }
}
