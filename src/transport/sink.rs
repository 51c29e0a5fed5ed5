//! Destinations for outbound frames.

use crate::error::{Result, VoxgateError};
use crate::pipeline::CancelFlag;
use crate::transport::frame::OutboundFrame;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Where a session's outbound frames go.
///
/// Frames must be delivered in the order `send` is called.
#[async_trait]
pub trait FrameSink: Send + Sync {
    async fn send(&self, frame: OutboundFrame) -> Result<()>;

    /// Sink name for logging.
    fn name(&self) -> &'static str;
}

/// A frame waiting for the socket writer, stamped with the cancellation
/// epoch it was produced in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedFrame {
    pub epoch: u64,
    pub frame: OutboundFrame,
}

impl QueuedFrame {
    /// False once the session has been cancelled after this frame was queued.
    pub fn is_current(&self, cancel: &CancelFlag) -> bool {
        self.epoch == cancel.epoch()
    }
}

/// Forwards frames to the session's socket writer task.
///
/// Frames sent while the session is cancelled are dropped; frames already
/// queued are dropped by the writer once it sees a newer epoch.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<QueuedFrame>,
    cancel: CancelFlag,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<QueuedFrame>, cancel: CancelFlag) -> Self {
        Self { tx, cancel }
    }
}

#[async_trait]
impl FrameSink for ChannelSink {
    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        // Epoch before flag: a frame stamped with a post-cancel epoch is
        // always seen as cancelled here.
        let epoch = self.cancel.epoch();
        if self.cancel.is_cancelled() {
            tracing::trace!("dropping frame from cancelled reply");
            return Ok(());
        }
        self.tx
            .send(QueuedFrame { epoch, frame })
            .await
            .map_err(|_| VoxgateError::SinkClosed {
                message: "session writer has shut down".to_string(),
            })
    }

    fn name(&self) -> &'static str {
        "channel"
    }
}

/// Keeps every frame in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct CollectorSink {
    frames: Arc<Mutex<Vec<OutboundFrame>>>,
}

impl CollectorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<OutboundFrame> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl FrameSink for CollectorSink {
    async fn send(&self, frame: OutboundFrame) -> Result<()> {
        self.frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(frame);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "collector"
    }
}
