use crate::models::RoomId;
use conclave_sfu::SfuError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("connection already owns a participant in room {0}")]
    AlreadyJoined(RoomId),

    #[error("room {0} is being deleted, retry shortly")]
    RoomBusy(RoomId),

    #[error("capacity exceeded: {0}")]
    Capacity(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SFU call failed: {0}")]
    Sfu(#[from] SfuError),

    #[error("SFU cleanup for room {room_id} failed, resources may be leaked: {source}")]
    ResourceLeak {
        room_id: RoomId,
        #[source]
        source: SfuError,
    },

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable error code reported to clients in error payloads.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ERR_NOT_FOUND",
            Self::AlreadyJoined(_) => "ERR_ALREADY_JOINED",
            Self::RoomBusy(_) => "ERR_ROOM_BUSY",
            Self::Capacity(_) => "ERR_CAPACITY",
            Self::InvalidInput(_) => "ERR_INVALID_INPUT",
            Self::Serialization(_) => "ERR_INTERNAL",
            Self::Sfu(_) => "ERR_SFU",
            Self::ResourceLeak { .. } => "ERR_RESOURCE_LEAK",
            Self::Internal(_) => "ERR_INTERNAL",
        }
    }

    /// True for application-level rejections that leave the session intact.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::AlreadyJoined(_)
                | Self::RoomBusy(_)
                | Self::Capacity(_)
                | Self::InvalidInput(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_classification() {
        assert!(Error::NotFound("x".to_string()).is_rejection());
        assert!(Error::RoomBusy(RoomId::from("r1")).is_rejection());

        let sfu = Error::Sfu(SfuError::Timeout {
            operation: "create_transport",
            timeout_ms: 1000,
        });
        assert!(!sfu.is_rejection());
        assert_eq!(sfu.code(), "ERR_SFU");
    }
}
