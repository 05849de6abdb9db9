//! Error types for the sync engine.

use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Missing or invalid construction parameters, or an unrecognized
    /// transport variant. Fatal, raised synchronously at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network-level failure raised by the transport.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote peer answered with a non-success HTTP status.
    #[error("request failed with status {0}")]
    Status(u16),

    /// The response body was not valid JSON, or a wire payload could not be
    /// encoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// A counter-patch from the remote peer failed to apply.
    #[error("patch application failed: {0}")]
    Patch(#[from] json_patch::PatchError),

    /// An event name that is not part of the lifecycle event set.
    #[error("unknown event name: {0}")]
    UnknownEvent(String),
}

impl SyncError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Creates a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Returns true if this failure was raised on the wire rather than by
    /// the engine itself.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SyncError::Transport(_) | SyncError::Status(_) | SyncError::Codec(_)
        )
    }
}

impl From<tether_protocol::CodecError> for SyncError {
    fn from(error: tether_protocol::CodecError) -> Self {
        SyncError::Codec(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_classification() {
        assert!(SyncError::transport("connection refused").is_transport());
        assert!(SyncError::Status(502).is_transport());
        assert!(SyncError::codec("body was html").is_transport());
        assert!(!SyncError::configuration("missing get_url").is_transport());
        assert!(!SyncError::UnknownEvent("frob".into()).is_transport());
    }

    #[test]
    fn error_display() {
        let err = SyncError::Status(404);
        assert_eq!(err.to_string(), "request failed with status 404");

        let err = SyncError::configuration("polling-http transport requires get_url");
        assert!(err.to_string().contains("get_url"));
    }
}
