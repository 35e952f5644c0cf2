pub mod id;
pub mod room;

pub use id::{generate_id, ConnectionId, ParticipantId, ProducerId, RoomId, TransportId};
pub use room::{
    Departure, Participant, RoomSnapshot, RoomSummary, RosterEntry, SessionPhase,
};
