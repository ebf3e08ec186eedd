//! Error types for the mesh client

/// Result type alias using the mesh Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mesh client operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Signaling relay error
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Envelope serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// No session exists for the addressed participant
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnection(String),

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    Sdp(String),

    /// ICE candidate error
    #[error("ICE candidate error: {0}")]
    IceCandidate(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrack(String),

    /// Device capture error
    #[error("Capture error: {0}")]
    Capture(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Signaling(_) | Error::WebSocket(_) | Error::Io(_)
        )
    }

    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error is a peer-related error
    ///
    /// Peer errors destroy the affected session only; the mesh keeps
    /// operating for unaffected peers.
    pub fn is_peer_error(&self) -> bool {
        matches!(
            self,
            Error::PeerNotFound(_)
                | Error::PeerConnection(_)
                | Error::Sdp(_)
                | Error::IceCandidate(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidConfig("test".to_string());
        assert_eq!(err.to_string(), "Invalid configuration: test");
    }

    #[test]
    fn test_error_is_retryable() {
        assert!(Error::Signaling("test".to_string()).is_retryable());
        assert!(Error::WebSocket("test".to_string()).is_retryable());
        assert!(!Error::InvalidConfig("test".to_string()).is_retryable());
    }

    #[test]
    fn test_error_is_peer_error() {
        assert!(Error::PeerNotFound("test".to_string()).is_peer_error());
        assert!(Error::Sdp("test".to_string()).is_peer_error());
        assert!(!Error::InvalidConfig("test".to_string()).is_peer_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }
}
