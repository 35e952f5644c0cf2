//! Signaling event router
//!
//! An explicit table mapping event names to handlers, built once at
//! startup. Every handler receives the execution context (connection id,
//! outbound sender, shared state) explicitly — there is no ambient global
//! dispatch. Each dispatch is isolated: a handler error produces an error
//! envelope for the originating connection and never tears down the event
//! loop.
//!
//! Peer notifications (`user-joined`, `user-left`, `new-producer`,
//! `producer-closed`) are emitted only after the triggering registry
//! mutation has been applied, so a peer that reacts to a notification
//! immediately observes consistent state.

use crate::http::AppState;
use crate::observability::metrics;
use crate::ws::hub::EnvelopeSender;
use crate::ws::protocol::{
    ClientEnvelope, ConnectTransportPayload, ConsumePayload, ConsumerPayload,
    CreateTransportPayload, JoinRoomPayload, NewProducerEvent, ProducePayload,
    ProducerClosedEvent, ProducerClosedPayload, RelayEvent, RelayPayload, RoomJoinedData,
    ServerEnvelope, UserJoinedEvent, UserLeftEvent,
};
use chrono::Utc;
use conclave_core::models::{ConnectionId, ParticipantId, ProducerId, RoomId, TransportId};
use conclave_core::session::Disconnected;
use conclave_core::Error;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use tracing::{debug, info, warn};

/// Execution context passed to every handler.
pub struct HandlerContext {
    pub connection_id: ConnectionId,
    pub sender: EnvelopeSender,
    pub state: AppState,
}

type HandlerResult = Result<serde_json::Value, Error>;
type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;
type Handler = Box<dyn Fn(HandlerContext, serde_json::Value) -> HandlerFuture + Send + Sync>;

fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(HandlerContext, serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Box::new(move |ctx, data| Box::pin(f(ctx, data)))
}

fn parse<T: DeserializeOwned>(data: serde_json::Value) -> Result<T, Error> {
    serde_json::from_value(data).map_err(|err| Error::InvalidInput(format!("invalid payload: {err}")))
}

/// Success responses echo the request event name, except the join ack,
/// which goes out as `room-joined`. Errors always echo the request name so
/// `requestId` correlation stays uniform.
fn response_event(request_event: &str) -> String {
    match request_event {
        "join-room" => "room-joined".to_string(),
        other => other.to_string(),
    }
}

/// Event name → handler table.
pub struct EventRouter {
    handlers: HashMap<&'static str, Handler>,
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        let mut handlers: HashMap<&'static str, Handler> = HashMap::new();

        // Room membership
        handlers.insert("join-room", handler(handle_join_room));
        handlers.insert("leave-room", handler(handle_leave_room));

        // Transport negotiation
        handlers.insert(
            "get-router-capabilities",
            handler(handle_router_capabilities),
        );
        handlers.insert("create-transport", handler(handle_create_transport));
        handlers.insert("connect-transport", handler(handle_connect_transport));

        // Media
        handlers.insert("produce", handler(handle_produce));
        handlers.insert("consume", handler(handle_consume));
        handlers.insert("pause-consumer", handler(handle_pause_consumer));
        handlers.insert("resume-consumer", handler(handle_resume_consumer));
        handlers.insert("producer-closed", handler(handle_producer_closed));

        // Opaque relay
        for event in ["offer", "answer", "ice-candidate", "chat"] {
            handlers.insert(event, handler(move |ctx, data| handle_relay(ctx, data, event)));
        }

        // Screen-share presence
        for event in ["screen-share-started", "screen-share-stopped"] {
            handlers.insert(
                event,
                handler(move |ctx, data| handle_screen_share(ctx, data, event)),
            );
        }

        Self { handlers }
    }

    /// Dispatch one inbound envelope. Always produces a response envelope:
    /// a success payload or an explicit error — never silence.
    pub async fn dispatch(&self, ctx: HandlerContext, envelope: ClientEnvelope) -> ServerEnvelope {
        metrics::WS_EVENTS_TOTAL
            .with_label_values(&[envelope.event.as_str()])
            .inc();

        let Some(handler) = self.handlers.get(envelope.event.as_str()) else {
            debug!(event = %envelope.event, "unknown event");
            return ServerEnvelope::error(
                envelope.event.clone(),
                envelope.request_id,
                "ERR_UNKNOWN_EVENT",
                format!("unknown event '{}'", envelope.event),
            );
        };

        let connection_id = ctx.connection_id.clone();
        match handler(ctx, envelope.data).await {
            Ok(data) => ServerEnvelope::response(
                response_event(&envelope.event),
                envelope.request_id,
                data,
            ),
            Err(err) => {
                if err.is_rejection() {
                    debug!(
                        connection_id = %connection_id,
                        event = %envelope.event,
                        error = %err,
                        "request rejected"
                    );
                } else {
                    warn!(
                        connection_id = %connection_id,
                        event = %envelope.event,
                        error = %err,
                        "request failed"
                    );
                }
                ServerEnvelope::error(envelope.event, envelope.request_id, err.code(), err.to_string())
            }
        }
    }
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Tear down whatever session a connection owns and notify its room.
///
/// Shared between the explicit `leave-room` handler and the socket-close
/// path; both are idempotent through `SessionController::disconnect`.
pub async fn teardown_connection(
    state: &AppState,
    connection_id: &ConnectionId,
) -> Result<Option<Disconnected>, Error> {
    let disconnected = state.session.disconnect(connection_id).await?;
    state.hub.unsubscribe(connection_id);

    let Some(disconnected) = disconnected else {
        return Ok(None);
    };

    let notice = ServerEnvelope::event(
        "user-left",
        serde_json::to_value(UserLeftEvent {
            participant_id: disconnected.participant_id.clone(),
            display_name: disconnected.display_name.clone(),
            timestamp: Utc::now(),
        })?,
    );
    state.hub.broadcast(&disconnected.room_id, &notice);

    info!(
        connection_id = %connection_id,
        participant_id = %disconnected.participant_id,
        room_id = %disconnected.room_id,
        room_deleted = disconnected.room_deleted,
        "connection left room"
    );

    Ok(Some(disconnected))
}

async fn handle_join_room(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: JoinRoomPayload = parse(data)?;
    if payload.room_id.trim().is_empty() || payload.display_name.trim().is_empty() {
        return Err(Error::InvalidInput(
            "roomId and displayName are required".to_string(),
        ));
    }

    let joined = ctx
        .state
        .session
        .join(
            &ctx.connection_id,
            RoomId::from_string(payload.room_id),
            payload.display_name,
        )
        .await?;

    ctx.state.hub.subscribe(
        joined.room_id.clone(),
        joined.participant_id.clone(),
        ctx.connection_id.clone(),
        ctx.sender.clone(),
    );

    let notice = ServerEnvelope::event(
        "user-joined",
        serde_json::to_value(UserJoinedEvent {
            participant_id: joined.participant_id.clone(),
            display_name: joined.display_name.clone(),
            timestamp: joined.joined_at,
        })?,
    );
    ctx.state
        .hub
        .broadcast_except(&joined.room_id, &ctx.connection_id, &notice);

    Ok(serde_json::to_value(RoomJoinedData {
        room_id: joined.room_id,
        participant_id: joined.participant_id,
        capabilities: joined.capabilities.0,
        roster: joined.roster,
    })?)
}

async fn handle_leave_room(ctx: HandlerContext, _data: serde_json::Value) -> HandlerResult {
    match teardown_connection(&ctx.state, &ctx.connection_id).await? {
        Some(disconnected) => Ok(serde_json::json!({
            "roomId": disconnected.room_id,
            "participantId": disconnected.participant_id,
        })),
        None => Ok(serde_json::json!({})),
    }
}

async fn handle_router_capabilities(ctx: HandlerContext, _data: serde_json::Value) -> HandlerResult {
    let capabilities = ctx
        .state
        .session
        .router_capabilities(&ctx.connection_id)
        .await?;
    Ok(capabilities.0)
}

async fn handle_create_transport(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: CreateTransportPayload = parse(data)?;
    let descriptor = ctx
        .state
        .session
        .create_transport(&ctx.connection_id, payload.direction)
        .await?;
    Ok(serde_json::to_value(descriptor)?)
}

async fn handle_connect_transport(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ConnectTransportPayload = parse(data)?;
    ctx.state
        .session
        .connect_transport(
            &ctx.connection_id,
            &TransportId::from(payload.transport_id),
            payload.dtls_parameters,
        )
        .await?;
    Ok(serde_json::json!({ "connected": true }))
}

async fn handle_produce(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ProducePayload = parse(data)?;
    let outcome = ctx
        .state
        .session
        .produce(
            &ctx.connection_id,
            &TransportId::from(payload.transport_id),
            payload.kind,
            payload.rtp_parameters,
        )
        .await?;

    let notice = ServerEnvelope::event(
        "new-producer",
        serde_json::to_value(NewProducerEvent {
            producer_id: outcome.producer_id.as_str().to_string(),
            participant_id: outcome.participant_id.clone(),
            kind: outcome.kind,
        })?,
    );
    ctx.state
        .hub
        .broadcast_except(&outcome.room_id, &ctx.connection_id, &notice);

    Ok(serde_json::json!({ "producerId": outcome.producer_id }))
}

async fn handle_consume(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ConsumePayload = parse(data)?;
    let descriptor = ctx
        .state
        .session
        .consume(
            &ctx.connection_id,
            &TransportId::from(payload.transport_id),
            &ProducerId::from(payload.producer_id),
            payload.rtp_capabilities,
        )
        .await?;
    Ok(serde_json::to_value(descriptor)?)
}

async fn handle_pause_consumer(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ConsumerPayload = parse(data)?;
    ctx.state
        .session
        .pause_consumer(&ctx.connection_id, &payload.consumer_id)
        .await?;
    Ok(serde_json::json!({}))
}

async fn handle_resume_consumer(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ConsumerPayload = parse(data)?;
    ctx.state
        .session
        .resume_consumer(&ctx.connection_id, &payload.consumer_id)
        .await?;
    Ok(serde_json::json!({}))
}

async fn handle_producer_closed(ctx: HandlerContext, data: serde_json::Value) -> HandlerResult {
    let payload: ProducerClosedPayload = parse(data)?;
    let closed = ctx
        .state
        .session
        .close_producer(&ctx.connection_id, &ProducerId::from(payload.producer_id))
        .await?;

    let notice = ServerEnvelope::event(
        "producer-closed",
        serde_json::to_value(ProducerClosedEvent {
            producer_id: closed.producer_id.as_str().to_string(),
            participant_id: closed.participant_id,
        })?,
    );
    ctx.state
        .hub
        .broadcast_except(&closed.room_id, &ctx.connection_id, &notice);

    Ok(serde_json::json!({}))
}

/// Opaque relay: addressed to one participant or broadcast to the room with
/// the sender excluded. The payload is never interpreted.
async fn handle_relay(
    ctx: HandlerContext,
    data: serde_json::Value,
    event: &'static str,
) -> HandlerResult {
    let payload: RelayPayload = parse(data)?;
    let (room_id, participant_id) = ctx.state.session.registry().lookup(&ctx.connection_id)?;

    let envelope = ServerEnvelope::event(
        event,
        serde_json::to_value(RelayEvent {
            from: participant_id,
            payload: payload.payload,
        })?,
    );

    let delivered = match payload.target_participant_id {
        Some(target) => {
            let target = ParticipantId::from(target);
            let sent = ctx.state.hub.send_to_participant(&room_id, &target, &envelope);
            if sent == 0 {
                return Err(Error::NotFound(format!("participant {target}")));
            }
            sent
        }
        None => ctx
            .state
            .hub
            .broadcast_except(&room_id, &ctx.connection_id, &envelope),
    };

    Ok(serde_json::json!({ "relayed": delivered }))
}

async fn handle_screen_share(
    ctx: HandlerContext,
    _data: serde_json::Value,
    event: &'static str,
) -> HandlerResult {
    let (room_id, participant_id) = ctx.state.session.registry().lookup(&ctx.connection_id)?;

    let envelope = ServerEnvelope::event(
        event,
        serde_json::json!({ "participantId": participant_id }),
    );
    ctx.state
        .hub
        .broadcast_except(&room_id, &ctx.connection_id, &envelope);

    Ok(serde_json::json!({}))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use conclave_core::config::LimitsConfig;
    use conclave_core::{ResourceTracker, RoomRegistry, SessionController};
    use conclave_sfu::{
        ConsumerDescriptor, MediaKind, ProducerDescriptor, RouterCapabilities, SfuControl,
        SfuError, TransportDescriptor, TransportDirection,
    };
    use std::sync::Arc;
    use tokio::sync::mpsc;

    /// SFU stub that succeeds on every call.
    struct StubSfu;

    #[async_trait]
    impl SfuControl for StubSfu {
        async fn get_router_capabilities(
            &self,
            _room_id: &str,
        ) -> Result<RouterCapabilities, SfuError> {
            Ok(RouterCapabilities(serde_json::json!({"codecs": []})))
        }

        async fn create_transport(
            &self,
            _room_id: &str,
            _direction: TransportDirection,
        ) -> Result<TransportDescriptor, SfuError> {
            Ok(TransportDescriptor {
                id: "t1".to_string(),
                ice_parameters: serde_json::json!({}),
                ice_candidates: serde_json::json!([]),
                dtls_parameters: serde_json::json!({}),
            })
        }

        async fn connect_transport(
            &self,
            _room_id: &str,
            _transport_id: &str,
            _dtls_parameters: serde_json::Value,
        ) -> Result<(), SfuError> {
            Ok(())
        }

        async fn create_producer(
            &self,
            _room_id: &str,
            _transport_id: &str,
            _kind: MediaKind,
            _rtp_parameters: serde_json::Value,
        ) -> Result<ProducerDescriptor, SfuError> {
            Ok(ProducerDescriptor {
                id: "p1".to_string(),
            })
        }

        async fn create_consumer(
            &self,
            _room_id: &str,
            _transport_id: &str,
            producer_id: &str,
            _rtp_capabilities: serde_json::Value,
        ) -> Result<ConsumerDescriptor, SfuError> {
            Ok(ConsumerDescriptor {
                id: "c1".to_string(),
                producer_id: producer_id.to_string(),
                kind: MediaKind::Audio,
                rtp_parameters: serde_json::json!({}),
            })
        }

        async fn pause_consumer(
            &self,
            _room_id: &str,
            _consumer_id: &str,
        ) -> Result<(), SfuError> {
            Ok(())
        }

        async fn resume_consumer(
            &self,
            _room_id: &str,
            _consumer_id: &str,
        ) -> Result<(), SfuError> {
            Ok(())
        }

        async fn close_producer(
            &self,
            _room_id: &str,
            _producer_id: &str,
        ) -> Result<(), SfuError> {
            Ok(())
        }

        async fn delete_room(&self, _room_id: &str) -> Result<(), SfuError> {
            Ok(())
        }
    }

    fn test_state() -> AppState {
        let session = Arc::new(SessionController::new(
            Arc::new(RoomRegistry::new(&LimitsConfig::default())),
            Arc::new(ResourceTracker::new()),
            Arc::new(StubSfu),
        ));
        AppState::new(session)
    }

    struct TestClient {
        connection_id: ConnectionId,
        rx: mpsc::UnboundedReceiver<ServerEnvelope>,
        tx: mpsc::UnboundedSender<ServerEnvelope>,
    }

    impl TestClient {
        fn new() -> Self {
            let (tx, rx) = mpsc::unbounded_channel();
            Self {
                connection_id: ConnectionId::new(),
                rx,
                tx,
            }
        }

        fn ctx(&self, state: &AppState) -> HandlerContext {
            HandlerContext {
                connection_id: self.connection_id.clone(),
                sender: self.tx.clone(),
                state: state.clone(),
            }
        }
    }

    fn envelope(event: &str, data: serde_json::Value) -> ClientEnvelope {
        ClientEnvelope {
            event: event.to_string(),
            request_id: Some("req-1".to_string()),
            data,
        }
    }

    async fn join(state: &AppState, client: &TestClient, room: &str, name: &str) -> ServerEnvelope {
        state
            .event_router
            .dispatch(
                client.ctx(state),
                envelope(
                    "join-room",
                    serde_json::json!({"roomId": room, "displayName": name}),
                ),
            )
            .await
    }

    #[tokio::test]
    async fn test_unknown_event_gets_error_envelope() {
        let state = test_state();
        let client = TestClient::new();

        let response = state
            .event_router
            .dispatch(client.ctx(&state), envelope("warp-drive", serde_json::json!({})))
            .await;

        assert_eq!(response.event, "warp-drive");
        assert_eq!(response.data["error"]["code"], "ERR_UNKNOWN_EVENT");
    }

    #[tokio::test]
    async fn test_malformed_payload_rejected() {
        let state = test_state();
        let client = TestClient::new();

        let response = state
            .event_router
            .dispatch(
                client.ctx(&state),
                envelope("join-room", serde_json::json!({"roomId": 7})),
            )
            .await;

        assert_eq!(response.data["error"]["code"], "ERR_INVALID_INPUT");
        assert_eq!(response.request_id.as_deref(), Some("req-1"));
    }

    #[tokio::test]
    async fn test_join_broadcasts_after_state_applied() {
        let state = test_state();
        let mut alice = TestClient::new();
        let bob = TestClient::new();

        let joined_a = join(&state, &alice, "r1", "Alice").await;
        assert_eq!(joined_a.event, "room-joined");
        assert_eq!(joined_a.data["roster"], serde_json::json!([]));

        let joined_b = join(&state, &bob, "r1", "Bob").await;
        assert_eq!(joined_b.data["roster"][0]["displayName"], "Alice");

        // Alice hears about Bob, and the roster already contains him.
        let notice = alice.rx.recv().await.expect("user-joined notice");
        assert_eq!(notice.event, "user-joined");
        assert_eq!(notice.data["displayName"], "Bob");

        let roster = state
            .session
            .registry()
            .roster(&RoomId::from("r1"))
            .expect("roster");
        assert_eq!(roster.len(), 2);
    }

    #[tokio::test]
    async fn test_second_join_on_connection_rejected() {
        let state = test_state();
        let client = TestClient::new();

        join(&state, &client, "r1", "Alice").await;
        let response = join(&state, &client, "r2", "Alice").await;
        assert_eq!(response.data["error"]["code"], "ERR_ALREADY_JOINED");
    }

    #[tokio::test]
    async fn test_transport_and_produce_fanout() {
        let state = test_state();
        let alice = TestClient::new();
        let mut bob = TestClient::new();

        join(&state, &alice, "r1", "Alice").await;
        join(&state, &bob, "r1", "Bob").await;

        let transport = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope("create-transport", serde_json::json!({"direction": "send"})),
            )
            .await;
        assert_eq!(transport.data["id"], "t1");

        let connected = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope(
                    "connect-transport",
                    serde_json::json!({"transportId": "t1", "dtlsParameters": {}}),
                ),
            )
            .await;
        assert_eq!(connected.data["connected"], true);

        let produced = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope(
                    "produce",
                    serde_json::json!({
                        "transportId": "t1",
                        "kind": "audio",
                        "rtpParameters": {}
                    }),
                ),
            )
            .await;
        assert_eq!(produced.data["producerId"], "p1");

        let notice = bob.rx.recv().await.expect("new-producer notice");
        assert_eq!(notice.event, "new-producer");
        assert_eq!(notice.data["producerId"], "p1");
        assert_eq!(notice.data["kind"], "audio");
    }

    #[tokio::test]
    async fn test_relay_targeted_and_broadcast() {
        let state = test_state();
        let alice = TestClient::new();
        let mut bob = TestClient::new();
        let mut carol = TestClient::new();

        join(&state, &alice, "r1", "Alice").await;
        let joined_b = join(&state, &bob, "r1", "Bob").await;
        join(&state, &carol, "r1", "Carol").await;
        let bob_id = joined_b.data["participantId"]
            .as_str()
            .expect("participant id")
            .to_string();
        // Drain join notices.
        while bob.rx.try_recv().is_ok() {}
        while carol.rx.try_recv().is_ok() {}

        // Targeted offer reaches only Bob.
        let response = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope(
                    "offer",
                    serde_json::json!({
                        "targetParticipantId": bob_id,
                        "payload": {"sdp": "v=0"}
                    }),
                ),
            )
            .await;
        assert_eq!(response.data["relayed"], 1);

        let offer = bob.rx.recv().await.expect("offer");
        assert_eq!(offer.event, "offer");
        assert_eq!(offer.data["payload"]["sdp"], "v=0");
        assert!(carol.rx.try_recv().is_err());

        // Broadcast chat reaches everyone but the sender.
        let response = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope("chat", serde_json::json!({"payload": {"text": "hi"}})),
            )
            .await;
        assert_eq!(response.data["relayed"], 2);

        // Unknown target is an explicit rejection.
        let response = state
            .event_router
            .dispatch(
                alice.ctx(&state),
                envelope(
                    "answer",
                    serde_json::json!({"targetParticipantId": "ghost", "payload": {}}),
                ),
            )
            .await;
        assert_eq!(response.data["error"]["code"], "ERR_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_leave_notifies_peers_and_is_idempotent() {
        let state = test_state();
        let alice = TestClient::new();
        let mut bob = TestClient::new();

        join(&state, &alice, "r1", "Alice").await;
        join(&state, &bob, "r1", "Bob").await;

        let response = state
            .event_router
            .dispatch(alice.ctx(&state), envelope("leave-room", serde_json::json!({})))
            .await;
        assert_eq!(response.data["roomId"], "r1");

        let notice = bob.rx.recv().await.expect("user-left notice");
        assert_eq!(notice.event, "user-left");
        assert_eq!(notice.data["displayName"], "Alice");

        // Leaving again is a no-op, not an error.
        let response = state
            .event_router
            .dispatch(alice.ctx(&state), envelope("leave-room", serde_json::json!({})))
            .await;
        assert!(response.data.get("error").is_none());

        // The room survives while Bob is present.
        assert_eq!(state.session.registry().room_count(), 1);
    }
}
