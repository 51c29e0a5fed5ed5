//! Audio formats, codecs and speech segmentation.

pub mod assembler;
pub mod buffer;
pub mod codec;
pub mod segmenter;
#[cfg(feature = "webm")]
pub mod webm;

pub use assembler::{AssemblerConfig, AssemblerEvent, SpeechState, UtteranceAssembler};
pub use buffer::AudioBuffer;
pub use segmenter::{SegmenterConfig, SpeechSegmenter};
