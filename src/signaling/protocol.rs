//! Signaling envelope types
//!
//! The relay routes JSON envelopes between participants without touching
//! their payloads. Envelopes are validated into this tagged enum at the
//! channel boundary; SDP and ICE payloads pass through unmodified.

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// A signaling envelope, both directions over the relay
///
/// Wire format: `{ "type": ..., "from": ..., "to": ..., "payload": ... }`.
/// `from` is omitted for relay-originated `client-id`/`peers` envelopes;
/// `to` is required for the directed `offer`/`answer`/`ice-candidate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalEnvelope {
    /// Relay assigns this client its participant identity
    ClientId {
        /// Assigned identity
        payload: ClientIdPayload,
    },

    /// Authoritative full membership list for the room
    Peers {
        /// Identities currently in the room
        payload: PeersPayload,
    },

    /// A participant joined the room; `from` is the affected identity
    UserJoined {
        /// Joining participant
        from: String,
    },

    /// A participant left the room; `from` is the affected identity
    UserLeft {
        /// Leaving participant
        from: String,
    },

    /// SDP offer, passed through unmodified
    Offer {
        /// Sender identity
        from: String,
        /// Recipient identity
        to: String,
        /// Session description
        payload: RTCSessionDescription,
    },

    /// SDP answer, passed through unmodified
    Answer {
        /// Sender identity
        from: String,
        /// Recipient identity
        to: String,
        /// Session description
        payload: RTCSessionDescription,
    },

    /// ICE candidate, passed through unmodified
    IceCandidate {
        /// Sender identity
        from: String,
        /// Recipient identity
        to: String,
        /// Candidate
        payload: RTCIceCandidateInit,
    },
}

/// Payload of `client-id`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientIdPayload {
    /// Relay-assigned opaque identity, stable for the session
    pub id: String,
}

/// Payload of `peers`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersPayload {
    /// Current room membership, excluding the receiving client
    pub peers: Vec<String>,
}

impl SignalEnvelope {
    /// Convert envelope to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self)
            .map_err(|e| crate::Error::Serialization(format!("Failed to serialize envelope: {}", e)))
    }

    /// Parse envelope from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| crate::Error::Serialization(format!("Failed to deserialize envelope: {}", e)))
    }

    /// Get the wire tag, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            SignalEnvelope::ClientId { .. } => "client-id",
            SignalEnvelope::Peers { .. } => "peers",
            SignalEnvelope::UserJoined { .. } => "user-joined",
            SignalEnvelope::UserLeft { .. } => "user-left",
            SignalEnvelope::Offer { .. } => "offer",
            SignalEnvelope::Answer { .. } => "answer",
            SignalEnvelope::IceCandidate { .. } => "ice-candidate",
        }
    }

    /// Get the sender identity, if the envelope carries one
    pub fn from_id(&self) -> Option<&str> {
        match self {
            SignalEnvelope::ClientId { .. } | SignalEnvelope::Peers { .. } => None,
            SignalEnvelope::UserJoined { from }
            | SignalEnvelope::UserLeft { from }
            | SignalEnvelope::Offer { from, .. }
            | SignalEnvelope::Answer { from, .. }
            | SignalEnvelope::IceCandidate { from, .. } => Some(from),
        }
    }
}
