//! Prometheus metrics for Conclave
//!
//! Gauges for the live resource counts (rooms, participants, tracked
//! transports, sockets) and a counter over signaling events. Gauges are
//! refreshed from the registry at scrape time.

use axum::{extract::State, response::IntoResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::http::{AppError, AppResult, AppState};

/// Global metrics registry
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Number of active rooms.
pub static ROOMS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("conclave_rooms_active", "Number of active rooms")
        .expect("failed to create conclave_rooms_active")
});

/// Number of registered participants.
pub static PARTICIPANTS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "conclave_participants_active",
        "Number of registered participants",
    )
    .expect("failed to create conclave_participants_active")
});

/// Number of SFU transports currently tracked for cleanup.
pub static TRANSPORTS_TRACKED: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "conclave_transports_tracked",
        "Number of SFU transports tracked for cleanup",
    )
    .expect("failed to create conclave_transports_tracked")
});

/// Number of open WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "conclave_websocket_connections_active",
        "Number of open WebSocket connections",
    )
    .expect("failed to create conclave_websocket_connections_active")
});

/// Total signaling events received, labeled by event name.
pub static WS_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "conclave_signaling_events_total",
            "Total signaling events received",
        ),
        &["event"],
    )
    .expect("failed to create conclave_signaling_events_total")
});

fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ROOMS_ACTIVE.clone()),
        Box::new(PARTICIPANTS_ACTIVE.clone()),
        Box::new(TRANSPORTS_TRACKED.clone()),
        Box::new(WS_CONNECTIONS_ACTIVE.clone()),
        Box::new(WS_EVENTS_TOTAL.clone()),
    ];
    for collector in collectors {
        if let Err(err) = registry.register(collector) {
            tracing::warn!(error = %err, "failed to register metric");
        }
    }
}

/// Render the registry in Prometheus text format.
pub fn gather() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer)
        .map_err(|err| prometheus::Error::Msg(format!("metrics not utf-8: {err}")))
}

/// Prometheus scrape endpoint.
///
/// Path: `GET /metrics`
pub async fn metrics_handler(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    ROOMS_ACTIVE.set(state.session.registry().room_count() as i64);
    PARTICIPANTS_ACTIVE.set(state.session.registry().participant_count() as i64);
    TRANSPORTS_TRACKED.set(state.session.tracker().tracked_total() as i64);

    let body = gather().map_err(|err| AppError::internal_server_error(err.to_string()))?;
    Ok((
        [(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        body,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_renders_registered_metrics() {
        ROOMS_ACTIVE.set(3);
        WS_EVENTS_TOTAL.with_label_values(&["join-room"]).inc();

        let body = gather().expect("metrics should render");
        assert!(body.contains("conclave_rooms_active 3"));
        assert!(body.contains("conclave_signaling_events_total"));
    }
}
