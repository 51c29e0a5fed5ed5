//! Content moderation of transcripts and generated replies.

pub mod filter;
pub mod moderator;
pub mod openai;

pub use filter::{ContentFilter, FailurePolicy, ModerationVerdict};
pub use moderator::{MockModerator, ModerationCheck, Moderator};
pub use openai::OpenAiModerator;
