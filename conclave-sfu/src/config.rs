//! SFU client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the HTTP SFU control client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuClientConfig {
    /// Base URL of the SFU control API (no trailing slash).
    pub base_url: String,
    /// Per-request timeout in seconds. A timed-out call is a failure.
    pub request_timeout_secs: u64,
    /// TCP connect timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for SfuClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4443".to_string(),
            request_timeout_secs: 10,
            connect_timeout_secs: 5,
        }
    }
}

impl SfuClientConfig {
    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
