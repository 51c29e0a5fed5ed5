//! Turn orchestration: sessions and the coordinator that drives them.

pub mod coordinator;
pub mod session;

pub use coordinator::{InboundAudio, PipelineCoordinator, TurnOutcome};
pub use session::{CancelFlag, Session};
