// Module: http
// HTTP surface: health, room inspection, metrics, and the WebSocket upgrade

pub mod error;
pub mod health;
pub mod rooms;

use crate::observability;
use crate::ws;
use crate::ws::hub::RoomHub;
use axum::{routing::get, Router};
use conclave_core::SessionController;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionController>,
    pub hub: Arc<RoomHub>,
    pub event_router: Arc<ws::router::EventRouter>,
    pub started_at: Instant,
}

impl AppState {
    #[must_use]
    pub fn new(session: Arc<SessionController>) -> Self {
        Self {
            session,
            hub: Arc::new(RoomHub::new()),
            // The handler table is built once here and shared by every
            // connection.
            event_router: Arc::new(ws::router::EventRouter::new()),
            started_at: Instant::now(),
        }
    }
}

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let router = Router::new()
        // Health check endpoints (for monitoring probes)
        .merge(health::create_health_router())
        // Room inspection
        .route("/api/rooms", get(rooms::list_rooms))
        .route("/api/rooms/{room_id}", get(rooms::get_room))
        // Prometheus metrics
        .route("/metrics", get(observability::metrics::metrics_handler))
        // WebSocket signaling endpoint
        .route("/ws", get(ws::websocket_handler));

    // Apply layers before state
    let router = router
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    // Apply state to all routes (must be last)
    router.with_state(state)
}
