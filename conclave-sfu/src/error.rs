use thiserror::Error;

/// Errors returned by the SFU control client.
///
/// Transport-level failures (`Timeout`, `Http`, `Decode`) mean the outcome
/// of the call is unknown; application-level rejections (`Rejected`) mean
/// the SFU processed the request and refused it.
#[derive(Debug, Error)]
pub enum SfuError {
    #[error("SFU call '{operation}' timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("SFU transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("SFU rejected '{operation}' with status {status}: {message}")]
    Rejected {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("invalid SFU response for '{operation}': {message}")]
    Decode {
        operation: &'static str,
        message: String,
    },
}

impl SfuError {
    /// True for failures where the request may not have reached the SFU (or
    /// the response was lost), as opposed to an explicit rejection.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Http(_) | Self::Decode { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let timeout = SfuError::Timeout {
            operation: "create_transport",
            timeout_ms: 5000,
        };
        assert!(timeout.is_transport());

        let rejected = SfuError::Rejected {
            operation: "create_producer",
            status: 400,
            message: "unknown transport".to_string(),
        };
        assert!(!rejected.is_transport());
    }
}
