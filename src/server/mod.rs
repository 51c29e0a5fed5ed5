//! WebSocket gateway.
//!
//! `GET /ws` serves browser and raw-PCM clients, `GET /telephony/ws` speaks
//! the telephony media-stream protocol. Each connection gets one [`Session`],
//! a turn worker and an outbound writer.

mod telephony;
mod web;
mod writer;

use crate::app;
use crate::config::Config;
use crate::error::{Result, VoxgateError};
use crate::pipeline::{InboundAudio, PipelineCoordinator, Session};
use crate::transport::ChannelSink;
use axum::Json;
use axum::Router;
use axum::routing::get;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Shared by every connection.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: PipelineCoordinator,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(coordinator: PipelineCoordinator, config: Config) -> Self {
        Self {
            coordinator,
            config: Arc::new(config),
        }
    }
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": crate::version_string(),
    }))
}

/// Builds the gateway router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(web::ws_handler))
        .route("/telephony/ws", get(telephony::ws_handler))
        .with_state(Arc::new(state))
}

/// Binds `config.server.bind` and serves until Ctrl-C.
pub async fn serve(config: Config) -> Result<()> {
    let coordinator = app::build_coordinator(&config)?;
    let listener = TcpListener::bind(&config.server.bind).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, language = %config.stt.language, "gateway listening");

    axum::serve(listener, router(AppState::new(coordinator, config)))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;
    Ok(())
}

/// Runs a session's turns one after another until the turn queue closes or
/// the socket writer goes away.
fn spawn_turn_worker(
    coordinator: PipelineCoordinator,
    session: Arc<Session>,
    sink: ChannelSink,
    mut turns: mpsc::Receiver<InboundAudio>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(audio) = turns.recv().await {
            // Other failures are logged by the coordinator; the session stays usable.
            if let Err(VoxgateError::SinkClosed { .. }) =
                coordinator.handle_turn(&session, audio, &sink).await
            {
                tracing::debug!(session = %session.id(), "writer closed, stopping turn worker");
                break;
            }
        }
    })
}
