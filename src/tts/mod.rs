//! Speech synthesis and streaming of synthesized audio to clients.

pub mod openai;
pub mod streamer;
pub mod synthesizer;

pub use openai::OpenAiSynthesizer;
pub use streamer::{SpeechSynthesisStreamer, StreamOutcome, StreamState};
pub use synthesizer::{
    AudioChunkStream, AudioEncoding, MockSynthesizer, SpeechSynthesizer, SynthesisRequest,
};
