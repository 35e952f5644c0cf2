//! Room registry
//!
//! Owns the room → participants and connection → participant mappings and
//! enforces room lifecycle: create-on-first-join, delete-on-last-leave.
//! All mutations run inside one short synchronous critical section; nothing
//! is awaited under the lock. No caller ever holds a reference into the
//! internal containers — every accessor returns an owned snapshot.
//!
//! An emptied room transitions to `Deleting` atomically with the removal of
//! its last participant. While `Deleting`, joins for the room id are
//! rejected with `RoomBusy`; once the SFU teardown attempt completes the
//! session controller calls [`RoomRegistry::finish_delete`] and the id
//! becomes joinable again (as a fresh room).

use crate::config::LimitsConfig;
use crate::error::{Error, Result};
use crate::models::{
    ConnectionId, Departure, Participant, ParticipantId, ProducerId, RoomId, RoomSnapshot,
    RoomSummary, RosterEntry, SessionPhase,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RoomState {
    Active,
    Deleting,
}

struct Room {
    state: RoomState,
    created_at: DateTime<Utc>,
    participants: HashMap<ParticipantId, Participant>,
}

impl Room {
    fn new() -> Self {
        Self {
            state: RoomState::Active,
            created_at: Utc::now(),
            participants: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct RegistryInner {
    rooms: HashMap<RoomId, Room>,
    connections: HashMap<ConnectionId, (RoomId, ParticipantId)>,
}

/// Registry of rooms and their participants.
pub struct RoomRegistry {
    inner: Mutex<RegistryInner>,
    max_rooms: usize,
    max_participants_per_room: usize,
}

impl RoomRegistry {
    #[must_use]
    pub fn new(limits: &LimitsConfig) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            max_rooms: limits.max_rooms,
            max_participants_per_room: limits.max_participants_per_room,
        }
    }

    /// Register a participant, creating the room if absent.
    ///
    /// Fails with `AlreadyJoined` if the connection already owns a
    /// participant, and with `RoomBusy` if the room is mid-deletion.
    /// Returns the roster as of registration, excluding the joiner.
    pub fn join(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
        connection_id: ConnectionId,
        display_name: String,
    ) -> Result<RoomSnapshot> {
        let mut inner = self.inner.lock();

        if let Some((owning_room, _)) = inner.connections.get(&connection_id) {
            return Err(Error::AlreadyJoined(owning_room.clone()));
        }

        if !inner.rooms.contains_key(&room_id)
            && self.max_rooms > 0
            && inner.rooms.len() >= self.max_rooms
        {
            warn!(
                current_rooms = inner.rooms.len(),
                max_rooms = self.max_rooms,
                "room limit reached"
            );
            return Err(Error::Capacity("maximum number of rooms reached".to_string()));
        }

        let created;
        let snapshot = {
            let room = match inner.rooms.entry(room_id.clone()) {
                std::collections::hash_map::Entry::Occupied(entry) => {
                    created = false;
                    let room = entry.into_mut();
                    if room.state == RoomState::Deleting {
                        return Err(Error::RoomBusy(room_id));
                    }
                    room
                }
                std::collections::hash_map::Entry::Vacant(entry) => {
                    created = true;
                    entry.insert(Room::new())
                }
            };

            if self.max_participants_per_room > 0
                && room.participants.len() >= self.max_participants_per_room
            {
                warn!(
                    room_id = %room_id,
                    current = room.participants.len(),
                    max = self.max_participants_per_room,
                    "participant limit reached for room"
                );
                return Err(Error::Capacity(format!(
                    "room {room_id} is at participant capacity"
                )));
            }

            let participant =
                Participant::new(participant_id.clone(), connection_id.clone(), display_name);
            let joined_at = participant.joined_at;

            let mut roster: Vec<RosterEntry> =
                room.participants.values().map(RosterEntry::from).collect();
            roster.sort_by(|a, b| {
                a.joined_at
                    .cmp(&b.joined_at)
                    .then_with(|| a.participant_id.as_str().cmp(b.participant_id.as_str()))
            });

            room.participants.insert(participant_id.clone(), participant);

            RoomSnapshot {
                room_id: room_id.clone(),
                participant_id: participant_id.clone(),
                joined_at,
                roster,
            }
        };

        inner
            .connections
            .insert(connection_id.clone(), (room_id.clone(), participant_id.clone()));

        info!(
            room_id = %room_id,
            participant_id = %participant_id,
            connection_id = %connection_id,
            room_created = created,
            "participant joined room"
        );

        Ok(snapshot)
    }

    /// Remove the participant owned by a connection.
    ///
    /// Idempotent: an unknown connection yields `NotFound` rather than a
    /// destructive error. When the removal empties the room, the room
    /// transitions to `Deleting` in the same critical section, so no
    /// concurrent join can observe it as joinable.
    pub fn leave(&self, connection_id: &ConnectionId) -> Result<Departure> {
        let mut inner = self.inner.lock();

        let Some((room_id, participant_id)) = inner.connections.remove(connection_id) else {
            return Err(Error::NotFound(format!(
                "connection {connection_id} owns no participant"
            )));
        };

        let Some(room) = inner.rooms.get_mut(&room_id) else {
            return Err(Error::Internal(format!(
                "connection mapped to missing room {room_id}"
            )));
        };

        let Some(participant) = room.participants.remove(&participant_id) else {
            return Err(Error::Internal(format!(
                "participant {participant_id} missing from room {room_id}"
            )));
        };

        let room_emptied = room.participants.is_empty();
        if room_emptied {
            room.state = RoomState::Deleting;
        }

        info!(
            room_id = %room_id,
            participant_id = %participant_id,
            remaining = room.participants.len(),
            room_emptied,
            "participant left room"
        );

        Ok(Departure {
            room_id,
            participant_id,
            display_name: participant.display_name,
            room_emptied,
        })
    }

    /// Remove a `Deleting` room after its SFU teardown attempt finished.
    pub fn finish_delete(&self, room_id: &RoomId) {
        let mut inner = self.inner.lock();
        let deletable = inner
            .rooms
            .get(room_id)
            .is_some_and(|room| room.state == RoomState::Deleting && room.participants.is_empty());
        if deletable {
            inner.rooms.remove(room_id);
            debug!(room_id = %room_id, "room removed from registry");
        }
    }

    /// Current roster of a room, ordered by join time.
    pub fn roster(&self, room_id: &RoomId) -> Result<Vec<RosterEntry>> {
        let inner = self.inner.lock();
        let room = inner
            .rooms
            .get(room_id)
            .ok_or_else(|| Error::NotFound(format!("room {room_id}")))?;

        let mut roster: Vec<RosterEntry> =
            room.participants.values().map(RosterEntry::from).collect();
        roster.sort_by(|a, b| {
            a.joined_at
                .cmp(&b.joined_at)
                .then_with(|| a.participant_id.as_str().cmp(b.participant_id.as_str()))
        });
        Ok(roster)
    }

    /// Resolve the room and participant owned by a connection.
    pub fn lookup(&self, connection_id: &ConnectionId) -> Result<(RoomId, ParticipantId)> {
        self.inner
            .lock()
            .connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("connection {connection_id} owns no participant"))
            })
    }

    /// Enter the `Negotiating` phase, returning the phase to restore on
    /// failure.
    pub fn begin_negotiation(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<(RoomId, ParticipantId, SessionPhase)> {
        let mut inner = self.inner.lock();
        let (room_id, participant_id) = inner
            .connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("connection {connection_id} owns no participant"))
            })?;

        let participant = inner
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.participants.get_mut(&participant_id))
            .ok_or_else(|| {
                Error::Internal(format!("participant {participant_id} missing from registry"))
            })?;

        let previous = participant.phase;
        participant.phase = SessionPhase::Negotiating;
        Ok((room_id, participant_id, previous))
    }

    /// Leave the `Negotiating` phase: `Active` on success, the previous
    /// phase on failure. A participant that left mid-call is ignored.
    pub fn finish_negotiation(
        &self,
        connection_id: &ConnectionId,
        success: bool,
        previous: SessionPhase,
    ) {
        let mut inner = self.inner.lock();
        let Some((room_id, participant_id)) = inner.connections.get(connection_id).cloned() else {
            return;
        };
        if let Some(participant) = inner
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.participants.get_mut(&participant_id))
        {
            participant.phase = if success {
                SessionPhase::Active
            } else {
                previous
            };
        }
    }

    /// Record a producer id on the connection's participant (idempotent).
    pub fn record_producer(
        &self,
        connection_id: &ConnectionId,
        producer_id: ProducerId,
    ) -> Result<(RoomId, ParticipantId)> {
        let mut inner = self.inner.lock();
        let (room_id, participant_id) = inner
            .connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("connection {connection_id} owns no participant"))
            })?;

        if let Some(participant) = inner
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.participants.get_mut(&participant_id))
        {
            if !participant.producers.contains(&producer_id) {
                participant.producers.push(producer_id);
            }
        }

        Ok((room_id, participant_id))
    }

    /// Drop a producer id from the connection's participant.
    pub fn remove_producer(
        &self,
        connection_id: &ConnectionId,
        producer_id: &ProducerId,
    ) -> Result<(RoomId, ParticipantId)> {
        let mut inner = self.inner.lock();
        let (room_id, participant_id) = inner
            .connections
            .get(connection_id)
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!("connection {connection_id} owns no participant"))
            })?;

        let participant = inner
            .rooms
            .get_mut(&room_id)
            .and_then(|room| room.participants.get_mut(&participant_id))
            .ok_or_else(|| {
                Error::Internal(format!("participant {participant_id} missing from registry"))
            })?;

        let before = participant.producers.len();
        participant.producers.retain(|id| id != producer_id);
        if participant.producers.len() == before {
            return Err(Error::NotFound(format!("producer {producer_id}")));
        }

        Ok((room_id, participant_id))
    }

    /// True if any participant in the room currently owns the producer.
    pub fn producer_exists(&self, room_id: &RoomId, producer_id: &ProducerId) -> bool {
        let inner = self.inner.lock();
        inner.rooms.get(room_id).is_some_and(|room| {
            room.participants
                .values()
                .any(|p| p.producers.contains(producer_id))
        })
    }

    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Operational summary of every room, for the listing endpoint.
    #[must_use]
    pub fn list_rooms(&self) -> Vec<RoomSummary> {
        let inner = self.inner.lock();
        let mut rooms: Vec<RoomSummary> = inner
            .rooms
            .iter()
            .map(|(room_id, room)| RoomSummary {
                room_id: room_id.clone(),
                participant_count: room.participants.len(),
                created_at: room.created_at,
            })
            .collect();
        rooms.sort_by(|a, b| a.room_id.as_str().cmp(b.room_id.as_str()));
        rooms
    }

    /// Clear every room and connection, returning the room ids that still
    /// need SFU teardown. Used for graceful shutdown.
    pub fn drain(&self) -> Vec<RoomId> {
        let mut inner = self.inner.lock();
        let room_ids: Vec<RoomId> = inner.rooms.keys().cloned().collect();
        inner.rooms.clear();
        inner.connections.clear();
        room_ids
    }
}
