//! Session lifecycle controller
//!
//! Orchestrates the per-participant flow end to end: join, transport
//! negotiation, produce/consume, disconnect, cleanup. The controller is the
//! only caller of the SFU adapter, and it follows one locking discipline
//! throughout: registry and tracker mutations are short synchronous
//! sections, and no lock is ever held across an SFU round trip. Where an
//! operation needs both, it either commits local state only after the SFU
//! call succeeded ("SFU first, then commit") or stages minimal local state
//! and rolls it back on failure.
//!
//! The one deliberate exception is room deletion: an emptied room stays in
//! the registry in `Deleting` state while `delete_room` is in flight, so a
//! concurrent join for the same id is rejected with `RoomBusy` instead of
//! racing the teardown.

use crate::error::{Error, Result};
use crate::models::{
    ConnectionId, ParticipantId, ProducerId, RoomId, RosterEntry, TransportId,
};
use crate::registry::RoomRegistry;
use crate::tracker::ResourceTracker;
use chrono::{DateTime, Utc};
use conclave_sfu::{
    ConsumerDescriptor, MediaKind, RouterCapabilities, SfuControl, TransportDescriptor,
    TransportDirection,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Everything a client needs to bootstrap after a successful join.
#[derive(Debug, Clone)]
pub struct JoinedSession {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub joined_at: DateTime<Utc>,
    pub capabilities: RouterCapabilities,
    pub roster: Vec<RosterEntry>,
}

/// Result of a successful produce, including the addressing the router
/// needs for the `new-producer` fanout.
#[derive(Debug, Clone)]
pub struct ProduceOutcome {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
}

/// Result of closing a producer.
#[derive(Debug, Clone)]
pub struct ProducerClosed {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub producer_id: ProducerId,
}

/// Result of tearing down a connection's session.
#[derive(Debug, Clone)]
pub struct Disconnected {
    pub room_id: RoomId,
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub released_transports: usize,
    pub room_deleted: bool,
    /// True when `delete_room` failed and SFU-side resources may dangle.
    pub leaked: bool,
}

/// Orchestrates room registry, resource tracker, and SFU adapter.
pub struct SessionController {
    registry: Arc<RoomRegistry>,
    tracker: Arc<ResourceTracker>,
    sfu: Arc<dyn SfuControl>,
}

impl SessionController {
    #[must_use]
    pub fn new(
        registry: Arc<RoomRegistry>,
        tracker: Arc<ResourceTracker>,
        sfu: Arc<dyn SfuControl>,
    ) -> Self {
        Self {
            registry,
            tracker,
            sfu,
        }
    }

    /// Join (or create) a room and fetch the router capabilities.
    ///
    /// The registry registration is staged first and rolled back if the
    /// capabilities call fails, so a failed join leaves no half-joined
    /// participant behind.
    pub async fn join(
        &self,
        connection_id: &ConnectionId,
        room_id: RoomId,
        display_name: String,
    ) -> Result<JoinedSession> {
        let participant_id = ParticipantId::new();
        let snapshot = self.registry.join(
            room_id.clone(),
            participant_id,
            connection_id.clone(),
            display_name.clone(),
        )?;

        match self.sfu.get_router_capabilities(room_id.as_str()).await {
            Ok(capabilities) => Ok(JoinedSession {
                room_id: snapshot.room_id,
                participant_id: snapshot.participant_id,
                display_name,
                joined_at: snapshot.joined_at,
                capabilities,
                roster: snapshot.roster,
            }),
            Err(err) => {
                warn!(
                    room_id = %room_id,
                    error = %err,
                    "capabilities fetch failed, rolling back join"
                );
                if let Ok(departure) = self.registry.leave(connection_id) {
                    self.tracker.forget(&departure.participant_id);
                    if departure.room_emptied {
                        // The room may have been lazily created on the SFU
                        // before the call failed; best-effort teardown.
                        if let Err(delete_err) =
                            self.sfu.delete_room(departure.room_id.as_str()).await
                        {
                            warn!(
                                room_id = %departure.room_id,
                                error = %delete_err,
                                "cleanup after failed join also failed"
                            );
                        }
                        self.registry.finish_delete(&departure.room_id);
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Fetch router capabilities for the room this connection joined.
    pub async fn router_capabilities(
        &self,
        connection_id: &ConnectionId,
    ) -> Result<RouterCapabilities> {
        let (room_id, _) = self.registry.lookup(connection_id)?;
        Ok(self.sfu.get_router_capabilities(room_id.as_str()).await?)
    }

    /// Allocate a transport on the SFU, tracking it only after the SFU call
    /// returned success — a failed or timed-out call tracks nothing.
    pub async fn create_transport(
        &self,
        connection_id: &ConnectionId,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor> {
        let (room_id, participant_id, previous) =
            self.registry.begin_negotiation(connection_id)?;

        match self
            .sfu
            .create_transport(room_id.as_str(), direction)
            .await
        {
            Ok(descriptor) => {
                self.tracker
                    .track(&participant_id, TransportId::from(descriptor.id.clone()));
                self.registry.finish_negotiation(connection_id, true, previous);
                Ok(descriptor)
            }
            Err(err) => {
                self.registry
                    .finish_negotiation(connection_id, false, previous);
                Err(err.into())
            }
        }
    }

    /// Finalize DTLS for a transport owned by this connection's participant.
    pub async fn connect_transport(
        &self,
        connection_id: &ConnectionId,
        transport_id: &TransportId,
        dtls_parameters: serde_json::Value,
    ) -> Result<()> {
        let (room_id, participant_id, previous) =
            self.registry.begin_negotiation(connection_id)?;

        if !self.tracker.owns(&participant_id, transport_id) {
            self.registry
                .finish_negotiation(connection_id, false, previous);
            return Err(Error::NotFound(format!("transport {transport_id}")));
        }

        let result = self
            .sfu
            .connect_transport(room_id.as_str(), transport_id.as_str(), dtls_parameters)
            .await;
        self.registry
            .finish_negotiation(connection_id, result.is_ok(), previous);
        Ok(result?)
    }

    /// Start publishing media over a send transport.
    pub async fn produce(
        &self,
        connection_id: &ConnectionId,
        transport_id: &TransportId,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<ProduceOutcome> {
        let (room_id, participant_id, previous) =
            self.registry.begin_negotiation(connection_id)?;

        if !self.tracker.owns(&participant_id, transport_id) {
            self.registry
                .finish_negotiation(connection_id, false, previous);
            return Err(Error::NotFound(format!("transport {transport_id}")));
        }

        match self
            .sfu
            .create_producer(
                room_id.as_str(),
                transport_id.as_str(),
                kind,
                rtp_parameters,
            )
            .await
        {
            Ok(descriptor) => {
                let producer_id = ProducerId::from(descriptor.id);
                self.registry
                    .record_producer(connection_id, producer_id.clone())?;
                self.registry.finish_negotiation(connection_id, true, previous);

                info!(
                    room_id = %room_id,
                    participant_id = %participant_id,
                    producer_id = %producer_id,
                    kind = %kind,
                    "producer created"
                );

                Ok(ProduceOutcome {
                    room_id,
                    participant_id,
                    producer_id,
                    kind,
                })
            }
            Err(err) => {
                self.registry
                    .finish_negotiation(connection_id, false, previous);
                Err(err.into())
            }
        }
    }

    /// Subscribe a receive transport to a known producer in the room.
    pub async fn consume(
        &self,
        connection_id: &ConnectionId,
        transport_id: &TransportId,
        producer_id: &ProducerId,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor> {
        let (room_id, participant_id, previous) =
            self.registry.begin_negotiation(connection_id)?;

        if !self.tracker.owns(&participant_id, transport_id) {
            self.registry
                .finish_negotiation(connection_id, false, previous);
            return Err(Error::NotFound(format!("transport {transport_id}")));
        }
        if !self.registry.producer_exists(&room_id, producer_id) {
            self.registry
                .finish_negotiation(connection_id, false, previous);
            return Err(Error::NotFound(format!("producer {producer_id}")));
        }

        let result = self
            .sfu
            .create_consumer(
                room_id.as_str(),
                transport_id.as_str(),
                producer_id.as_str(),
                rtp_capabilities,
            )
            .await;
        self.registry
            .finish_negotiation(connection_id, result.is_ok(), previous);
        Ok(result?)
    }

    /// Pause delivery on a consumer.
    pub async fn pause_consumer(
        &self,
        connection_id: &ConnectionId,
        consumer_id: &str,
    ) -> Result<()> {
        let (room_id, _) = self.registry.lookup(connection_id)?;
        Ok(self.sfu.pause_consumer(room_id.as_str(), consumer_id).await?)
    }

    /// Resume delivery on a consumer (consumers start paused on the SFU).
    pub async fn resume_consumer(
        &self,
        connection_id: &ConnectionId,
        consumer_id: &str,
    ) -> Result<()> {
        let (room_id, _) = self.registry.lookup(connection_id)?;
        Ok(self
            .sfu
            .resume_consumer(room_id.as_str(), consumer_id)
            .await?)
    }

    /// Close a producer owned by this connection's participant.
    pub async fn close_producer(
        &self,
        connection_id: &ConnectionId,
        producer_id: &ProducerId,
    ) -> Result<ProducerClosed> {
        // Remove the local record first so a repeated close is NotFound; the
        // SFU call failing leaves the producer to the room-level bulk delete.
        let (room_id, participant_id) = self.registry.remove_producer(connection_id, producer_id)?;

        if let Err(err) = self
            .sfu
            .close_producer(room_id.as_str(), producer_id.as_str())
            .await
        {
            warn!(
                room_id = %room_id,
                producer_id = %producer_id,
                error = %err,
                "producer close failed on SFU, will be freed by room teardown"
            );
        }

        Ok(ProducerClosed {
            room_id,
            participant_id,
            producer_id: producer_id.clone(),
        })
    }

    /// Tear down the session owned by a connection.
    ///
    /// Idempotent: a connection with no participant returns `Ok(None)`.
    /// The registry removal, the `Deleting` transition, and the tracker
    /// forget happen before any SFU I/O, so a rapid disconnect-reconnect on
    /// the same connection id can never observe a half-torn-down
    /// participant. When the room emptied, `delete_room` is attempted
    /// exactly once; failure is a resource-leak condition that is logged
    /// for operator alerting while the in-process records are still
    /// removed.
    pub async fn disconnect(&self, connection_id: &ConnectionId) -> Result<Option<Disconnected>> {
        let departure = match self.registry.leave(connection_id) {
            Ok(departure) => departure,
            Err(Error::NotFound(_)) => return Ok(None),
            Err(err) => return Err(err),
        };

        let released = self.tracker.forget(&departure.participant_id);

        let mut leaked = false;
        if departure.room_emptied {
            match self.sfu.delete_room(departure.room_id.as_str()).await {
                Ok(()) => {
                    info!(room_id = %departure.room_id, "SFU room deleted");
                }
                Err(source) => {
                    leaked = true;
                    let leak = Error::ResourceLeak {
                        room_id: departure.room_id.clone(),
                        source,
                    };
                    error!(
                        room_id = %departure.room_id,
                        error = %leak,
                        "SFU cleanup failed, resources may be leaked"
                    );
                }
            }
            self.registry.finish_delete(&departure.room_id);
        }

        debug!(
            connection_id = %connection_id,
            participant_id = %departure.participant_id,
            released_transports = released.len(),
            "session torn down"
        );

        Ok(Some(Disconnected {
            room_id: departure.room_id,
            participant_id: departure.participant_id,
            display_name: departure.display_name,
            released_transports: released.len(),
            room_deleted: departure.room_emptied,
            leaked,
        }))
    }

    /// Tear down every remaining room. Used for graceful shutdown; returns
    /// the number of rooms whose SFU teardown succeeded.
    pub async fn shutdown(&self) -> usize {
        let rooms = self.registry.drain();
        self.tracker.clear();

        let mut deleted = 0;
        for room_id in &rooms {
            match self.sfu.delete_room(room_id.as_str()).await {
                Ok(()) => deleted += 1,
                Err(err) => {
                    error!(
                        room_id = %room_id,
                        error = %err,
                        "SFU cleanup failed during shutdown, resources may be leaked"
                    );
                }
            }
        }

        if !rooms.is_empty() {
            info!(rooms = rooms.len(), deleted, "teardown of remaining rooms complete");
        }
        deleted
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<ResourceTracker> {
        &self.tracker
    }
}
