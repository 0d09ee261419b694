//! HTTP control surface: agent start/stop/status and frame polling.
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

use crate::agent_engine::AgentLoop;
use crate::errors::{PilotError, PilotResult};
use crate::supervisor::ConnectionSupervisor;

pub const TIMESTAMP_HEADER: &str = "x-screenshot-timestamp";
pub const SEQUENCE_HEADER: &str = "x-screenshot-sequence";

/// Shared state for HTTP handlers.
pub struct AppState {
    pub agent: Arc<AgentLoop>,
    pub supervisor: Arc<ConnectionSupervisor>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/api/agent",
            get(agent_status).post(agent_start).delete(agent_stop),
        )
        .route("/api/init", get(init).post(init))
        .route("/api/screenshot", get(screenshot))
        .route("/api/ping", get(|| async { "pong" }))
        .route("/api/version", get(|| async { env!("CARGO_PKG_VERSION") }))
        .with_state(state)
}

/// Bind and serve until `shutdown` resolves.
pub async fn serve(
    listen_addr: &str,
    state: Arc<AppState>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> PilotResult<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .map_err(|e| PilotError::Config(format!("invalid listen address {listen_addr:?}: {e}")))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn agent_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.agent.status())
}

async fn agent_start(State(state): State<Arc<AppState>>) -> Response {
    start_response(&state.agent).await
}

async fn agent_stop(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.agent.stop();
    Json(json!({ "success": true, "running": false }))
}

async fn init(State(state): State<Arc<AppState>>) -> Response {
    if state.agent.is_running() {
        return Json(json!({ "success": true, "running": true, "message": "already running" }))
            .into_response();
    }
    start_response(&state.agent).await
}

async fn start_response(agent: &Arc<AgentLoop>) -> Response {
    match agent.start().await {
        Ok(()) => Json(json!({ "success": true, "running": true })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e })),
        )
            .into_response(),
    }
}

async fn screenshot(State(state): State<Arc<AppState>>) -> Response {
    let Some(frame) = state.supervisor.latest_frame() else {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "No screenshot available yet" })),
        )
            .into_response();
    };
    (
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (
                header::HeaderName::from_static(TIMESTAMP_HEADER),
                frame.timestamp_ms.to_string(),
            ),
            (
                header::HeaderName::from_static(SEQUENCE_HEADER),
                frame.sequence.to_string(),
            ),
        ],
        frame.png.clone(),
    )
        .into_response()
}
