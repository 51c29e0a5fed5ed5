//! Endpointing for continuous telephony media streams.
//!
//! Telephony clients send a steady flow of small u-law packets rather than
//! one blob per utterance. The assembler tracks a loudness state machine over
//! those packets and cuts the stream into utterances for the coordinator.

use crate::audio::codec::decode_mulaw;
use crate::audio::segmenter::dbfs;
use crate::defaults;

/// Bytes of 8 kHz u-law per millisecond.
const MULAW_BYTES_PER_MS: usize = (defaults::TELEPHONY_SAMPLE_RATE / 1000) as usize;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AssemblerConfig {
    /// Packets louder than this count as speech (dBFS).
    pub speech_threshold_dbfs: f32,
    /// Trailing silence that ends an utterance (milliseconds).
    pub min_silence_ms: u32,
    /// Utterances are cut at this length even without a pause (milliseconds).
    pub max_utterance_ms: u32,
    /// Audio kept from before the speech onset (milliseconds).
    pub pre_roll_ms: u32,
}

impl Default for AssemblerConfig {
    fn default() -> Self {
        Self {
            speech_threshold_dbfs: defaults::SILENCE_THRESHOLD_DBFS,
            min_silence_ms: defaults::MIN_SILENCE_MS,
            max_utterance_ms: defaults::MAX_UTTERANCE_MS,
            pre_roll_ms: defaults::KEEP_SILENCE_MS,
        }
    }
}

/// Speech state of the current stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechState {
    /// No speech since the last utterance.
    Idle,
    /// Speech is being received.
    Speaking,
    /// Silence after speech, waiting to confirm the end of the utterance.
    MaybeSilence,
}

/// Result of feeding one packet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblerEvent {
    /// Set on the packet that moved the stream from idle to speaking.
    pub speech_started: bool,
    /// A complete utterance of u-law bytes, ready for a turn.
    pub utterance: Option<Vec<u8>>,
}

#[derive(Debug)]
pub struct UtteranceAssembler {
    config: AssemblerConfig,
    state: SpeechState,
    pre_roll: Vec<u8>,
    utterance: Vec<u8>,
    silence_bytes: usize,
}

impl UtteranceAssembler {
    pub fn new(config: AssemblerConfig) -> Self {
        Self {
            config,
            state: SpeechState::Idle,
            pre_roll: Vec::new(),
            utterance: Vec::new(),
            silence_bytes: 0,
        }
    }

    pub fn state(&self) -> SpeechState {
        self.state
    }

    /// Feeds one u-law packet.
    pub fn push(&mut self, packet: &[u8]) -> AssemblerEvent {
        let mut event = AssemblerEvent::default();
        if packet.is_empty() {
            return event;
        }
        let is_speech = dbfs(&decode_mulaw(packet)) > self.config.speech_threshold_dbfs;

        match self.state {
            SpeechState::Idle => {
                if is_speech {
                    self.state = SpeechState::Speaking;
                    self.utterance = std::mem::take(&mut self.pre_roll);
                    self.utterance.extend_from_slice(packet);
                    self.silence_bytes = 0;
                    event.speech_started = true;
                } else {
                    self.pre_roll.extend_from_slice(packet);
                    let keep = self.config.pre_roll_ms as usize * MULAW_BYTES_PER_MS;
                    if self.pre_roll.len() > keep {
                        let excess = self.pre_roll.len() - keep;
                        self.pre_roll.drain(..excess);
                    }
                }
            }
            SpeechState::Speaking => {
                self.utterance.extend_from_slice(packet);
                if !is_speech {
                    self.state = SpeechState::MaybeSilence;
                    self.silence_bytes = packet.len();
                }
            }
            SpeechState::MaybeSilence => {
                self.utterance.extend_from_slice(packet);
                if is_speech {
                    self.state = SpeechState::Speaking;
                    self.silence_bytes = 0;
                } else {
                    self.silence_bytes += packet.len();
                }
            }
        }

        let silence_limit = self.config.min_silence_ms as usize * MULAW_BYTES_PER_MS;
        let length_limit = self.config.max_utterance_ms as usize * MULAW_BYTES_PER_MS;
        let ended = self.state == SpeechState::MaybeSilence && self.silence_bytes >= silence_limit;
        let too_long = self.state != SpeechState::Idle && self.utterance.len() >= length_limit;
        if ended || too_long {
            tracing::debug!(
                bytes = self.utterance.len(),
                forced = too_long && !ended,
                "utterance complete"
            );
            event.utterance = self.take_utterance();
        }
        event
    }

    /// Emits any utterance in progress, e.g. when the stream stops.
    pub fn flush(&mut self) -> Option<Vec<u8>> {
        if self.state == SpeechState::Idle {
            self.pre_roll.clear();
            return None;
        }
        self.take_utterance()
    }

    fn take_utterance(&mut self) -> Option<Vec<u8>> {
        self.state = SpeechState::Idle;
        self.silence_bytes = 0;
        self.pre_roll.clear();
        let utterance = std::mem::take(&mut self.utterance);
        (!utterance.is_empty()).then_some(utterance)
    }
}

impl Default for UtteranceAssembler {
    fn default() -> Self {
        Self::new(AssemblerConfig::default())
    }
}
