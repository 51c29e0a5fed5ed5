//! Browser and raw-PCM sessions: one binary message is one turn.

use super::writer::spawn_writer;
use super::{AppState, spawn_turn_worker};
use crate::app;
use crate::pipeline::InboundAudio;
use crate::platform::Platform;
use crate::transport::{ChannelSink, ClientControl};
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Query parameters for `/ws`.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    #[serde(default)]
    pub platform: Option<Platform>,
    pub language: Option<String>,
    /// Recognition hint, e.g. names likely to be spoken.
    pub prompt: Option<String>,
}

pub(super) async fn ws_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Response {
    let platform = params.platform.unwrap_or_default();
    if platform.uses_media_events() {
        return (
            StatusCode::BAD_REQUEST,
            "telephony streams connect to /telephony/ws",
        )
            .into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, platform, params))
}

async fn handle_socket(
    socket: WebSocket,
    state: Arc<AppState>,
    platform: Platform,
    params: WsParams,
) {
    let session = Arc::new(app::open_session(
        &state.config,
        platform,
        params.language.as_deref(),
        params.prompt.as_deref(),
    ));
    let capacity = state.config.server.channel_capacity;
    let (sender, mut receiver) = socket.split();
    let (frame_tx, frame_rx) = mpsc::channel(capacity);
    let (turn_tx, turn_rx) = mpsc::channel(capacity);

    let cancel = session.cancel_flag().clone();
    let writer = spawn_writer(sender, frame_rx, None, cancel.clone());
    let worker = spawn_turn_worker(
        state.coordinator.clone(),
        Arc::clone(&session),
        ChannelSink::new(frame_tx, cancel),
        turn_rx,
    );
    tracing::info!(
        session = %session.id(),
        %platform,
        language = session.language(),
        "session opened"
    );

    while let Some(Ok(message)) = receiver.next().await {
        match message {
            Message::Binary(data) => {
                tracing::debug!(session = %session.id(), bytes = data.len(), "audio received");
                let audio = InboundAudio::new(data.to_vec(), platform);
                if turn_tx.send(audio).await.is_err() {
                    break;
                }
            }
            Message::Text(text) => match ClientControl::from_json(text.as_str()) {
                Ok(ClientControl::Interrupt) => {
                    tracing::info!(session = %session.id(), "client interrupt");
                    session.cancel();
                }
                Ok(ClientControl::Prompt { text }) => session.set_prompt(Some(text)),
                Err(e) => {
                    tracing::warn!(session = %session.id(), error = %e, "ignoring unknown control message");
                }
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    // The client is gone, so nothing in flight can be delivered.
    session.cancel();
    drop(turn_tx);
    worker.abort();
    if let Err(e) = writer.await {
        tracing::debug!(error = %e, "writer task ended abnormally");
    }
    tracing::info!(session = %session.id(), "session closed");
}
