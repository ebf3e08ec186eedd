//! Configuration types for the mesh client

use serde::{Deserialize, Serialize};

/// Main configuration for a mesh room session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshConfig {
    /// WebSocket signaling relay URL (ws:// or wss://)
    pub signaling_url: String,

    /// Room to join; the relay scopes membership events per room
    pub room: String,

    /// STUN server URLs (at least one required)
    pub stun_servers: Vec<String>,

    /// TURN server configurations (optional)
    pub turn_servers: Vec<TurnServerConfig>,

    /// Which local track kinds to request from the capture device
    pub media: CaptureConstraints,
}

/// TURN server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN server URL (turn:// or turns://)
    pub url: String,

    /// Username for TURN authentication
    pub username: String,

    /// Credential for TURN authentication
    pub credential: String,
}

/// Requested local capture kinds
///
/// These are requests, not guarantees: capture degrades gracefully when
/// a device is unavailable, down to joining with no local media at all.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CaptureConstraints {
    /// Request a microphone track
    pub audio: bool,

    /// Request a camera track
    pub video: bool,
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            room: "default".to_string(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            turn_servers: Vec::new(),
            media: CaptureConstraints::default(),
        }
    }
}

impl MeshConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `signaling_url` is not a ws:// or wss:// URL
    /// - `room` is empty
    /// - `stun_servers` is empty
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.signaling_url.starts_with("ws://") && !self.signaling_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "signaling_url must start with ws:// or wss://, got {}",
                self.signaling_url
            )));
        }

        if self.room.is_empty() {
            return Err(Error::InvalidConfig("room must not be empty".to_string()));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        Ok(())
    }

    /// Create a configuration for a room on a given relay
    pub fn for_room(signaling_url: &str, room: &str) -> Self {
        Self {
            signaling_url: signaling_url.to_string(),
            room: room.to_string(),
            ..Default::default()
        }
    }

    /// Add TURN servers to this configuration
    ///
    /// Useful for chaining with `for_room`.
    pub fn with_turn_servers(mut self, turn_servers: Vec<TurnServerConfig>) -> Self {
        self.turn_servers = turn_servers;
        self
    }

    /// Set the capture constraints
    pub fn with_media(mut self, media: CaptureConstraints) -> Self {
        self.media = media;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = MeshConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_stun_servers_fails() {
        let mut config = MeshConfig::default();
        config.stun_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_room_fails() {
        let mut config = MeshConfig::default();
        config.room.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_signaling_url_fails() {
        let mut config = MeshConfig::default();
        config.signaling_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let config = MeshConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: MeshConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.signaling_url, deserialized.signaling_url);
        assert_eq!(config.room, deserialized.room);
    }

    #[test]
    fn test_for_room_builder() {
        let config = MeshConfig::for_room("wss://relay.example.com", "r1").with_turn_servers(vec![
            TurnServerConfig {
                url: "turn:turn.example.com:3478".to_string(),
                username: "user".to_string(),
                credential: "pass".to_string(),
            },
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.room, "r1");
        assert_eq!(config.turn_servers.len(), 1);
    }
}
