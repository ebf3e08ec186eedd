//! Read-only mesh state for the rendering layer
//!
//! Published after every mesh mutation; observers hold copies and never
//! reach into live sessions.

use crate::media::LocalTrackInfo;
use crate::peer::{NegotiationState, PeerSession, Role};
use serde::Serialize;
use std::collections::HashMap;

/// Observer-facing summary of one peer
#[derive(Debug, Clone, Serialize)]
pub struct PeerSummary {
    /// An inbound audio track arrived
    pub has_audio: bool,

    /// An inbound video track arrived
    pub has_video: bool,

    /// Inbound stream handle, if media arrived
    pub stream_id: Option<String>,

    /// Offer originator role
    pub role: Role,

    /// Negotiation state
    pub negotiation: NegotiationState,
}

impl PeerSummary {
    pub(crate) fn of(session: &PeerSession) -> Self {
        let stream = session.remote_stream();
        Self {
            has_audio: stream.map(|s| s.has_audio).unwrap_or(false),
            has_video: stream.map(|s| s.has_video).unwrap_or(false),
            stream_id: stream.map(|s| s.stream_id.clone()),
            role: session.role(),
            negotiation: session.negotiation(),
        }
    }
}

/// Immutable copy of the mesh state
#[derive(Debug, Clone, Default, Serialize)]
pub struct MeshSnapshot {
    /// Local participant identity, once assigned by the relay
    pub local_id: Option<String>,

    /// Local capture tracks
    pub local_tracks: Vec<LocalTrackInfo>,

    /// Per-peer summaries keyed by participant identity
    pub peers: HashMap<String, PeerSummary>,
}

impl MeshSnapshot {
    /// Number of peers in the mesh
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}
