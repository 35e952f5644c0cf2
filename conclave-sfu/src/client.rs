//! HTTP client for the external SFU control API
//!
//! The SFU is treated as a remote, fallible service: every call is awaited
//! under an explicit timeout and classified as either a transport failure
//! or an application-level rejection. Callers never commit local state for
//! a call that did not return success.

use crate::config::SfuClientConfig;
use crate::error::SfuError;
use crate::types::{
    ConsumerDescriptor, MediaKind, ProducerDescriptor, RouterCapabilities, TransportDescriptor,
    TransportDirection,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Typed contract to the external SFU control API.
///
/// The production implementation is [`HttpSfuClient`]; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait SfuControl: Send + Sync {
    /// Fetch the router RTP capabilities for a room.
    async fn get_router_capabilities(
        &self,
        room_id: &str,
    ) -> Result<RouterCapabilities, SfuError>;

    /// Allocate a WebRTC transport on the SFU.
    async fn create_transport(
        &self,
        room_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, SfuError>;

    /// Finalize DTLS negotiation for a previously created transport.
    async fn connect_transport(
        &self,
        room_id: &str,
        transport_id: &str,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), SfuError>;

    /// Start publishing a media stream over a send transport.
    async fn create_producer(
        &self,
        room_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<ProducerDescriptor, SfuError>;

    /// Subscribe a receive transport to a remote producer.
    async fn create_consumer(
        &self,
        room_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor, SfuError>;

    /// Pause delivery on a consumer.
    async fn pause_consumer(&self, room_id: &str, consumer_id: &str) -> Result<(), SfuError>;

    /// Resume delivery on a consumer (consumers start paused).
    async fn resume_consumer(&self, room_id: &str, consumer_id: &str) -> Result<(), SfuError>;

    /// Close a producer and stop forwarding its stream.
    async fn close_producer(&self, room_id: &str, producer_id: &str) -> Result<(), SfuError>;

    /// Bulk-release every transport/producer/consumer belonging to a room.
    ///
    /// This is the single cleanup primitive: per-resource deletion races are
    /// the dominant source of leaked SFU ports, so teardown always goes
    /// through one room-level call.
    async fn delete_room(&self, room_id: &str) -> Result<(), SfuError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateTransportRequest<'a> {
    room_id: &'a str,
    direction: TransportDirection,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ConnectTransportRequest<'a> {
    room_id: &'a str,
    transport_id: &'a str,
    dtls_parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateProducerRequest<'a> {
    room_id: &'a str,
    transport_id: &'a str,
    kind: MediaKind,
    rtp_parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateConsumerRequest<'a> {
    room_id: &'a str,
    transport_id: &'a str,
    producer_id: &'a str,
    rtp_capabilities: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RoomScopedRequest<'a> {
    room_id: &'a str,
}

/// Error body shape returned by the SFU on rejection.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Production SFU control client over HTTP.
pub struct HttpSfuClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl HttpSfuClient {
    pub fn new(config: &SfuClientConfig) -> Result<Self, SfuError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout: config.request_timeout(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request under the configured timeout and map non-success
    /// statuses to [`SfuError::Rejected`].
    async fn execute(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, SfuError> {
        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| SfuError::Timeout {
                operation,
                timeout_ms: self.request_timeout.as_millis() as u64,
            })??;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.or(body.message))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });

        Err(SfuError::Rejected {
            operation,
            status: status.as_u16(),
            message,
        })
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SfuError> {
        let response = self.execute(operation, request).await?;
        response.json::<T>().await.map_err(|e| SfuError::Decode {
            operation,
            message: e.to_string(),
        })
    }

    async fn ack(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<(), SfuError> {
        self.execute(operation, request).await.map(|_| ())
    }
}

#[async_trait]
impl SfuControl for HttpSfuClient {
    async fn get_router_capabilities(
        &self,
        room_id: &str,
    ) -> Result<RouterCapabilities, SfuError> {
        let url = self.url(&format!("/router/{room_id}/capabilities"));
        self.fetch("get_router_capabilities", self.http.get(url))
            .await
    }

    async fn create_transport(
        &self,
        room_id: &str,
        direction: TransportDirection,
    ) -> Result<TransportDescriptor, SfuError> {
        let url = self.url("/transport/create");
        let body = CreateTransportRequest { room_id, direction };
        let descriptor: TransportDescriptor = self
            .fetch("create_transport", self.http.post(url).json(&body))
            .await?;

        debug!(
            room_id = %room_id,
            transport_id = %descriptor.id,
            direction = %direction,
            "SFU transport created"
        );

        Ok(descriptor)
    }

    async fn connect_transport(
        &self,
        room_id: &str,
        transport_id: &str,
        dtls_parameters: serde_json::Value,
    ) -> Result<(), SfuError> {
        let url = self.url("/transport/connect");
        let body = ConnectTransportRequest {
            room_id,
            transport_id,
            dtls_parameters,
        };
        self.ack("connect_transport", self.http.post(url).json(&body))
            .await
    }

    async fn create_producer(
        &self,
        room_id: &str,
        transport_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> Result<ProducerDescriptor, SfuError> {
        let url = self.url("/producer/create");
        let body = CreateProducerRequest {
            room_id,
            transport_id,
            kind,
            rtp_parameters,
        };
        self.fetch("create_producer", self.http.post(url).json(&body))
            .await
    }

    async fn create_consumer(
        &self,
        room_id: &str,
        transport_id: &str,
        producer_id: &str,
        rtp_capabilities: serde_json::Value,
    ) -> Result<ConsumerDescriptor, SfuError> {
        let url = self.url("/consumer/create");
        let body = CreateConsumerRequest {
            room_id,
            transport_id,
            producer_id,
            rtp_capabilities,
        };
        self.fetch("create_consumer", self.http.post(url).json(&body))
            .await
    }

    async fn pause_consumer(&self, room_id: &str, consumer_id: &str) -> Result<(), SfuError> {
        let url = self.url(&format!("/consumer/{consumer_id}/pause"));
        let body = RoomScopedRequest { room_id };
        self.ack("pause_consumer", self.http.post(url).json(&body))
            .await
    }

    async fn resume_consumer(&self, room_id: &str, consumer_id: &str) -> Result<(), SfuError> {
        let url = self.url(&format!("/consumer/{consumer_id}/resume"));
        let body = RoomScopedRequest { room_id };
        self.ack("resume_consumer", self.http.post(url).json(&body))
            .await
    }

    async fn close_producer(&self, room_id: &str, producer_id: &str) -> Result<(), SfuError> {
        let url = self.url(&format!("/producer/{producer_id}/close"));
        let body = RoomScopedRequest { room_id };
        self.ack("close_producer", self.http.post(url).json(&body))
            .await
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), SfuError> {
        let url = self.url(&format!("/room/{room_id}"));
        match self.ack("delete_room", self.http.delete(url)).await {
            // A room the SFU no longer knows about is already clean.
            Err(SfuError::Rejected { status: 404, .. }) => {
                debug!(room_id = %room_id, "SFU room already deleted");
                Ok(())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HttpSfuClient {
        let config = SfuClientConfig {
            base_url: server.uri(),
            request_timeout_secs: 1,
            connect_timeout_secs: 1,
        };
        HttpSfuClient::new(&config).expect("client should build")
    }

    #[tokio::test]
    async fn test_get_router_capabilities() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/router/r1/capabilities"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"codecs": []})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let capabilities = client
            .get_router_capabilities("r1")
            .await
            .expect("capabilities should succeed");

        assert_eq!(capabilities.0, serde_json::json!({"codecs": []}));
    }

    #[tokio::test]
    async fn test_create_transport_request_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transport/create"))
            .and(body_partial_json(serde_json::json!({
                "roomId": "r1",
                "direction": "send"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "t1",
                "iceParameters": {},
                "iceCandidates": [],
                "dtlsParameters": {}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let descriptor = client
            .create_transport("r1", TransportDirection::Send)
            .await
            .expect("create_transport should succeed");

        assert_eq!(descriptor.id, "t1");
    }

    #[tokio::test]
    async fn test_rejection_maps_to_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/producer/create"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(serde_json::json!({"error": "unknown transport"})),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client
            .create_producer("r1", "t-missing", MediaKind::Audio, serde_json::json!({}))
            .await;

        match result {
            Err(SfuError::Rejected {
                status, message, ..
            }) => {
                assert_eq!(status, 400);
                assert_eq!(message, "unknown transport");
            }
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_is_transport_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/transport/create"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(serde_json::json!({
                        "id": "t1",
                        "iceParameters": {},
                        "iceCandidates": [],
                        "dtlsParameters": {}
                    })),
            )
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client.create_transport("r1", TransportDirection::Recv).await;

        match result {
            Err(err @ SfuError::Timeout { .. }) => assert!(err.is_transport()),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_delete_room_tolerates_missing_room() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/room/r-gone"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        client
            .delete_room("r-gone")
            .await
            .expect("delete of a missing room should be idempotent");
    }

    #[tokio::test]
    async fn test_invalid_body_maps_to_decode() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/router/r1/capabilities"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let result = client.get_router_capabilities("r1").await;

        match result {
            Err(err @ SfuError::Decode { .. }) => assert!(err.is_transport()),
            other => panic!("expected Decode, got {other:?}"),
        }
    }
}
