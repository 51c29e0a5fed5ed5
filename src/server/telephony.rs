//! Telephony media streams.
//!
//! Inbound `media` packets feed an [`UtteranceAssembler`]; each completed
//! utterance becomes a turn. Speech that starts while a reply is playing
//! cancels the reply and asks the far end to drop buffered audio.

use super::writer::spawn_writer;
use super::{AppState, spawn_turn_worker};
use crate::app;
use crate::audio::UtteranceAssembler;
use crate::pipeline::{InboundAudio, Session};
use crate::platform::Platform;
use crate::transport::{ChannelSink, TelephonyMessage};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures_util::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

pub(super) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn barge_in(session: &Session, control: &mpsc::Sender<TelephonyMessage>) {
    tracing::info!(session = %session.id(), "caller spoke over reply, cancelling");
    session.cancel();
    let Some(stream_sid) = session.stream_id() else {
        return;
    };
    if let Err(e) = control.try_send(TelephonyMessage::Clear { stream_sid }) {
        tracing::warn!(session = %session.id(), error = %e, "failed to queue clear event");
    }
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session = Arc::new(app::open_session(
        &state.config,
        Platform::Telephony,
        None,
        None,
    ));
    let mut assembler = UtteranceAssembler::new(state.config.assembler_config());
    let capacity = state.config.server.channel_capacity;
    let (sender, mut receiver) = socket.split();
    let (frame_tx, frame_rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::channel(capacity);
    let (turn_tx, turn_rx) = mpsc::channel(capacity);

    let cancel = session.cancel_flag().clone();
    let writer = spawn_writer(sender, frame_rx, Some(control_rx), cancel.clone());
    let worker = spawn_turn_worker(
        state.coordinator.clone(),
        Arc::clone(&session),
        ChannelSink::new(frame_tx, cancel),
        turn_rx,
    );
    tracing::info!(session = %session.id(), "telephony session opened");

    let mut stopped = false;
    while let Some(Ok(message)) = receiver.next().await {
        let text = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };
        let event = match TelephonyMessage::from_json(text.as_str()) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(session = %session.id(), error = %e, "ignoring malformed event");
                continue;
            }
        };

        let utterance = match event {
            TelephonyMessage::Connected { protocol } => {
                tracing::debug!(session = %session.id(), ?protocol, "stream connected");
                None
            }
            start @ TelephonyMessage::Start { .. } => {
                match start.start_stream_sid() {
                    Some(sid) => {
                        tracing::info!(session = %session.id(), stream_sid = sid, "stream started");
                        session.set_stream_id(sid);
                    }
                    None => {
                        tracing::warn!(session = %session.id(), "start event without streamSid");
                    }
                }
                None
            }
            TelephonyMessage::Media { media, .. } => match media.decode() {
                Ok(packet) => {
                    let pushed = assembler.push(&packet);
                    if pushed.speech_started && session.is_replying() {
                        barge_in(&session, &control_tx);
                    }
                    pushed.utterance
                }
                Err(e) => {
                    tracing::warn!(session = %session.id(), error = %e, "undecodable media payload");
                    None
                }
            },
            TelephonyMessage::Mark { mark, .. } => {
                tracing::debug!(session = %session.id(), name = %mark.name, "playback mark acknowledged");
                None
            }
            TelephonyMessage::Stop { .. } => {
                tracing::info!(session = %session.id(), "stream stopped");
                stopped = true;
                assembler.flush()
            }
            TelephonyMessage::Clear { .. } => None,
        };

        if let Some(utterance) = utterance
            && turn_tx
                .send(InboundAudio::new(utterance, Platform::Telephony))
                .await
                .is_err()
        {
            break;
        }
        if stopped {
            break;
        }
    }

    drop(turn_tx);
    drop(control_tx);
    if stopped {
        // Let queued turns finish; they end early if the writer is gone.
        if let Err(e) = worker.await {
            tracing::debug!(error = %e, "turn worker ended abnormally");
        }
    } else {
        session.cancel();
        worker.abort();
    }
    if let Err(e) = writer.await {
        tracing::debug!(error = %e, "writer task ended abnormally");
    }
    tracing::info!(session = %session.id(), "telephony session closed");
}
