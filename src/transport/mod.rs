//! Outbound framing and the sinks frames are written to.

pub mod frame;
pub mod sink;

pub use frame::{ClientControl, OutboundFrame, TelephonyMessage};
pub use sink::{ChannelSink, CollectorSink, FrameSink, QueuedFrame};
