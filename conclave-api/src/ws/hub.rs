//! In-memory hub routing outbound events to connected sockets
//!
//! Holds one subscriber entry per connection, grouped by room. Broadcasts
//! walk the room's subscriber list; a send failure marks the connection for
//! cleanup so dead sockets cannot accumulate.

use crate::ws::protocol::ServerEnvelope;
use conclave_core::models::{ConnectionId, ParticipantId, RoomId};
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Message sender for a client connection
pub type EnvelopeSender = mpsc::UnboundedSender<ServerEnvelope>;

/// Subscriber information
#[derive(Debug, Clone)]
struct Subscriber {
    connection_id: ConnectionId,
    participant_id: ParticipantId,
    sender: EnvelopeSender,
}

/// Routes events to connected clients by room.
#[derive(Default)]
pub struct RoomHub {
    /// Map of room -> subscribers
    rooms: DashMap<RoomId, Vec<Subscriber>>,

    /// Map of connection -> room, for cleanup
    connections: DashMap<ConnectionId, RoomId>,
}

impl RoomHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a room's events.
    pub fn subscribe(
        &self,
        room_id: RoomId,
        participant_id: ParticipantId,
        connection_id: ConnectionId,
        sender: EnvelopeSender,
    ) {
        let subscriber = Subscriber {
            connection_id: connection_id.clone(),
            participant_id,
            sender,
        };

        self.rooms
            .entry(room_id.clone())
            .or_default()
            .push(subscriber);
        self.connections.insert(connection_id.clone(), room_id.clone());

        debug!(
            room_id = %room_id,
            connection_id = %connection_id,
            "connection subscribed to room"
        );
    }

    /// Unsubscribe a connection. No-op for unknown connections.
    pub fn unsubscribe(&self, connection_id: &ConnectionId) {
        if let Some((_, room_id)) = self.connections.remove(connection_id) {
            if let Some(mut subscribers) = self.rooms.get_mut(&room_id) {
                subscribers.retain(|sub| &sub.connection_id != connection_id);

                if subscribers.is_empty() {
                    drop(subscribers); // Drop the RefMut before removing
                    self.rooms.remove(&room_id);
                }
            }

            debug!(
                room_id = %room_id,
                connection_id = %connection_id,
                "connection unsubscribed from room"
            );
        }
    }

    /// Broadcast an event to every subscriber in a room.
    pub fn broadcast(&self, room_id: &RoomId, envelope: &ServerEnvelope) -> usize {
        self.send_where(room_id, envelope, |_| true)
    }

    /// Broadcast to every subscriber in a room except the sender.
    pub fn broadcast_except(
        &self,
        room_id: &RoomId,
        excluded: &ConnectionId,
        envelope: &ServerEnvelope,
    ) -> usize {
        self.send_where(room_id, envelope, |sub| &sub.connection_id != excluded)
    }

    /// Deliver an event to one participant in a room. Returns the number of
    /// connections reached (0 when the participant is unknown).
    pub fn send_to_participant(
        &self,
        room_id: &RoomId,
        participant_id: &ParticipantId,
        envelope: &ServerEnvelope,
    ) -> usize {
        self.send_where(room_id, envelope, |sub| {
            &sub.participant_id == participant_id
        })
    }

    fn send_where(
        &self,
        room_id: &RoomId,
        envelope: &ServerEnvelope,
        filter: impl Fn(&Subscriber) -> bool,
    ) -> usize {
        let mut sent_count = 0;
        let mut failed_connections = Vec::new();

        if let Some(subscribers) = self.rooms.get(room_id) {
            for subscriber in subscribers.iter().filter(|sub| filter(sub)) {
                match subscriber.sender.send(envelope.clone()) {
                    Ok(()) => sent_count += 1,
                    Err(err) => {
                        warn!(
                            room_id = %room_id,
                            connection_id = %subscriber.connection_id,
                            error = %err,
                            "failed to send event, marking connection for cleanup"
                        );
                        failed_connections.push(subscriber.connection_id.clone());
                    }
                }
            }
        }

        for connection_id in failed_connections {
            self.unsubscribe(&connection_id);
        }

        sent_count
    }

    /// Number of subscribers in a room.
    #[must_use]
    pub fn subscriber_count(&self, room_id: &RoomId) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |subscribers| subscribers.len())
    }

    /// Total number of subscribed connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}
