//! Speech recognition: the remote capability and the policy-enforcing client.

pub mod client;
pub mod openai;
pub mod recognizer;

pub use client::TranscriptionClient;
pub use openai::OpenAiRecognizer;
pub use recognizer::{MockRecognizer, SpeechRecognizer, TranscriptionRequest, TranscriptionResult};
