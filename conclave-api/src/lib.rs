// Conclave API Library
//
// Provides the WebSocket signaling surface and the HTTP observability
// surface over conclave-core.

pub mod http;
pub mod observability;
pub mod ws;

// Re-export commonly used types
pub use http::AppState;
