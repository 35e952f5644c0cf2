//! Room listing endpoints for operational inspection

use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use conclave_core::models::{RoomId, RosterEntry};
use serde::Serialize;

use crate::http::{AppResult, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: RoomId,
    pub participant_count: usize,
    pub created_at: chrono::DateTime<Utc>,
    pub uptime_seconds: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomListResponse {
    pub total_rooms: usize,
    pub rooms: Vec<RoomInfo>,
}

/// List all active rooms.
///
/// Path: `GET /api/rooms`
pub async fn list_rooms(State(state): State<AppState>) -> impl IntoResponse {
    let now = Utc::now();
    let rooms: Vec<RoomInfo> = state
        .session
        .registry()
        .list_rooms()
        .into_iter()
        .map(|summary| RoomInfo {
            uptime_seconds: (now - summary.created_at).num_seconds().max(0),
            room_id: summary.room_id,
            participant_count: summary.participant_count,
            created_at: summary.created_at,
        })
        .collect();

    Json(RoomListResponse {
        total_rooms: rooms.len(),
        rooms,
    })
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomDetailResponse {
    pub room_id: RoomId,
    pub roster: Vec<RosterEntry>,
}

/// Inspect one room's roster.
///
/// Path: `GET /api/rooms/{room_id}`
pub async fn get_room(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let room_id = RoomId::from_string(room_id);
    let roster = state.session.registry().roster(&room_id)?;
    Ok(Json(RoomDetailResponse { room_id, roster }))
}
