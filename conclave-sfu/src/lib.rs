//! Conclave SFU control-plane client
//!
//! The media plane lives in an external Selective Forwarding Unit reachable
//! over an HTTP control API. This crate owns that contract:
//!
//! - **`SfuControl`**: the typed request/response contract the rest of the
//!   system programs against
//! - **`HttpSfuClient`**: the production implementation over HTTP
//! - **`SfuError`**: transport-level failures kept distinct from
//!   application-level rejections
//!
//! Every call carries a bounded timeout; a timed-out call is a failure,
//! never an assumed success. Callers commit local state only after a call
//! returns successfully.

mod client;
mod config;
mod error;
mod types;

pub use client::{HttpSfuClient, SfuControl};
pub use config::SfuClientConfig;
pub use error::SfuError;
pub use types::{
    ConsumerDescriptor, MediaKind, ProducerDescriptor, RouterCapabilities, TransportDescriptor,
    TransportDirection,
};
