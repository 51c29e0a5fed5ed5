//! Drains a session's outbound frames to its socket in order.

use crate::pipeline::CancelFlag;
use crate::transport::{OutboundFrame, QueuedFrame, TelephonyMessage};
use axum::extract::ws::Message;
use futures_util::{Sink, SinkExt};
use std::fmt::Display;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

fn encode(frame: OutboundFrame) -> Option<Message> {
    match frame {
        OutboundFrame::RawBinary(data) => Some(Message::Binary(data.into())),
        other => encode_event(other.to_telephony_message()?),
    }
}

fn encode_event(event: TelephonyMessage) -> Option<Message> {
    match event.to_json() {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize telephony event");
            None
        }
    }
}

async fn next_control(
    control: &mut Option<mpsc::Receiver<TelephonyMessage>>,
) -> Option<TelephonyMessage> {
    match control {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Spawns the writer. Control events (telephony `clear`) overtake queued
/// frames; frames keep the order they were sent in. Frames queued before the
/// session was last cancelled are dropped unsent.
pub(super) fn spawn_writer<S>(
    mut socket: S,
    mut frames: mpsc::Receiver<QueuedFrame>,
    mut control: Option<mpsc::Receiver<TelephonyMessage>>,
    cancel: CancelFlag,
) -> JoinHandle<()>
where
    S: Sink<Message> + Unpin + Send + 'static,
    S::Error: Display + Send,
{
    tokio::spawn(async move {
        let mut dropped = 0usize;
        loop {
            let message = tokio::select! {
                biased;
                Some(event) = next_control(&mut control) => encode_event(event),
                queued = frames.recv() => match queued {
                    Some(queued) if queued.is_current(&cancel) => encode(queued.frame),
                    Some(_) => {
                        dropped += 1;
                        continue;
                    }
                    None => break,
                },
            };
            let Some(message) = message else {
                continue;
            };
            if let Err(e) = socket.send(message).await {
                tracing::debug!(error = %e, "socket closed, stopping writer");
                break;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, "discarded frames of cancelled replies");
        }
        if let Err(e) = socket.close().await {
            tracing::trace!(error = %e, "socket close failed");
        }
    })
}
