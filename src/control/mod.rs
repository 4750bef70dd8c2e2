//! HTTP control surface
//!
//! This module provides the REST API for poking the running stream:
//! - `GET /info` - frame counter, pacing and session health
//! - `GET /setText?text=` - replace the scene title
//! - `GET /bang` - trigger the flash effect
//! - `GET /setChatId?id=` - point the chat poller at a live chat

use crate::events::Command;
use crate::pipeline::FrameClock;
use crate::streamer::StreamerSession;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use log::info;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub commands: mpsc::Sender<Command>,
    pub chat_ids: mpsc::Sender<String>,
    pub session: Arc<StreamerSession>,
    pub clock: FrameClock,
    pub title: Arc<std::sync::Mutex<String>>,
}

/// Build the control router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/info", get(info_handler))
        .route("/setText", get(set_text))
        .route("/bang", get(bang))
        .route("/setChatId", get(set_chat_id))
        .with_state(state)
}

/// Bind and serve the control surface until the token cancels.
pub async fn serve(state: AppState, port: u16, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!("control surface listening on port {port}");
    serve_with(listener, state, cancel).await
}

pub async fn serve_with(
    listener: TcpListener,
    state: AppState,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    Ok(())
}

async fn info_handler(State(state): State<AppState>) -> Json<Value> {
    // mirror the stats into the service log as well
    let _ = state.commands.try_send(Command::Info);

    let session_state = state.session.state();
    Json(json!({
        "ok": !session_state.is_aborted(),
        "frame": state.clock.frame_count(),
        "uptime_secs": state.clock.uptime().as_secs(),
        "avg_frame_duration": format!("{:?}", state.clock.average_frame_time()),
        "title": state.title.lock().unwrap().clone(),
        "state": session_state.description(),
        "health": state.session.health().summary(),
    }))
}

#[derive(Deserialize)]
struct TextParams {
    text: String,
}

async fn set_text(State(state): State<AppState>, Query(params): Query<TextParams>) -> Json<Value> {
    let delivered = state
        .commands
        .try_send(Command::SetText(params.text))
        .is_ok();
    Json(json!({ "ok": delivered }))
}

async fn bang(State(state): State<AppState>) -> Json<Value> {
    let delivered = state.commands.try_send(Command::Bang).is_ok();
    Json(json!({ "ok": delivered }))
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

async fn set_chat_id(State(state): State<AppState>, Query(params): Query<IdParams>) -> Json<Value> {
    let delivered = state.chat_ids.try_send(params.id).is_ok();
    Json(json!({ "ok": delivered }))
}
