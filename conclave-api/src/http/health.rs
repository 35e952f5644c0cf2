//! Health check endpoint
//!
//! Reports the live resource counts the operator cares about: rooms,
//! participants, tracked transports, and open sockets.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use crate::http::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_seconds: u64,
    pub rooms: usize,
    pub participants: usize,
    pub tracked_transports: usize,
    pub connections: usize,
}

/// Health check router
pub fn create_health_router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        uptime_seconds: state.started_at.elapsed().as_secs(),
        rooms: state.session.registry().room_count(),
        participants: state.session.registry().participant_count(),
        tracked_transports: state.session.tracker().tracked_total(),
        connections: state.hub.connection_count(),
    })
}
