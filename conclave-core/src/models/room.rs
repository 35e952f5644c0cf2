//! Room and participant records

use crate::models::id::{ConnectionId, ParticipantId, ProducerId, RoomId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-participant session phase.
///
/// `Connecting → Joined → Negotiating → Active → Leaving → Gone`.
/// Failed negotiation returns to the phase it was entered from; it does not
/// invalidate the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Connecting,
    Joined,
    Negotiating,
    Active,
    Leaving,
    Gone,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Connecting => "connecting",
            Self::Joined => "joined",
            Self::Negotiating => "negotiating",
            Self::Active => "active",
            Self::Leaving => "leaving",
            Self::Gone => "gone",
        };
        write!(f, "{name}")
    }
}

/// A registered participant.
#[derive(Debug, Clone)]
pub struct Participant {
    pub id: ParticipantId,
    pub connection_id: ConnectionId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub producers: Vec<ProducerId>,
    pub phase: SessionPhase,
}

impl Participant {
    #[must_use]
    pub fn new(id: ParticipantId, connection_id: ConnectionId, display_name: String) -> Self {
        Self {
            id,
            connection_id,
            display_name,
            joined_at: Utc::now(),
            producers: Vec::new(),
            phase: SessionPhase::Joined,
        }
    }
}

/// Roster entry handed to clients for UI bootstrap.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterEntry {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub producers: Vec<ProducerId>,
}

impl From<&Participant> for RosterEntry {
    fn from(participant: &Participant) -> Self {
        Self {
            participant_id: participant.id.clone(),
            display_name: participant.display_name.clone(),
            joined_at: participant.joined_at,
            producers: participant.producers.clone(),
        }
    }
}

/// Result of a successful registry join: the roster as it looked at the
/// moment of registration, excluding the joining participant.
#[derive(Debug, Clone)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub joined_at: DateTime<Utc>,
    pub roster: Vec<RosterEntry>,
}

/// Result of removing a participant from the registry.
#[derive(Debug, Clone)]
pub struct Departure {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    /// True exactly once per emptying: the room transitioned to `Deleting`
    /// in the same critical section that removed the participant.
    pub room_emptied: bool,
}

/// Per-room operational summary for the listing endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: RoomId,
    pub participant_count: usize,
    pub created_at: DateTime<Utc>,
}
