//! Per-peer negotiation state machine
//!
//! One [`PeerSession`] exists per remote participant. It owns that
//! participant's connection, its negotiation state and the inbound
//! stream handle, and buffers ICE candidates that arrive before a remote
//! description exists. All operations are invoked sequentially by the
//! coordinator; the session never reaches into mesh state.

use super::connection::RtcConnection;
use crate::media::{LocalMediaSource, TrackKind};
use crate::{Error, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Who originates offers for this pair
///
/// Fixed at creation: the side joining a room creates Initiator sessions
/// toward members already present, so exactly one side of every pair
/// sends the first offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    /// This side sends offers
    Initiator,
    /// This side answers
    Responder,
}

/// Negotiation state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NegotiationState {
    /// No description applied yet
    Idle,
    /// Local offer created and applied, waiting for the answer
    OfferSent,
    /// Remote offer applied, answer not yet produced
    OfferReceived,
    /// Both descriptions applied; media can flow
    Stable,
    /// Terminal connectivity failure reported
    Failed,
    /// Torn down
    Closed,
}

/// Handle to the first inbound media stream of a connection
#[derive(Debug, Clone)]
pub struct RemoteStream {
    /// Remote stream identifier
    pub stream_id: String,

    /// An audio track arrived on this stream
    pub has_audio: bool,

    /// A video track arrived on this stream
    pub has_video: bool,
}

/// One remote participant's session
pub struct PeerSession {
    /// Participant identity (immutable key)
    id: String,

    /// Offer originator role, fixed at creation
    role: Role,

    /// Exclusively owned connection
    connection: Arc<RtcConnection>,

    /// Current negotiation state
    negotiation: NegotiationState,

    /// First inbound stream, set at most once per connection lifetime
    remote_stream: Option<RemoteStream>,

    /// Candidates received before the remote description, in arrival order
    pending_remote_candidates: Vec<RTCIceCandidateInit>,

    /// One ICE restart per connection lifetime
    restart_attempted: bool,
}

impl PeerSession {
    /// Create a session around an allocated connection
    pub fn new(id: &str, role: Role, connection: RtcConnection) -> Self {
        info!("Creating {:?} session for peer {}", role, id);

        Self {
            id: id.to_string(),
            role,
            connection: Arc::new(connection),
            negotiation: NegotiationState::Idle,
            remote_stream: None,
            pending_remote_candidates: Vec::new(),
            restart_attempted: false,
        }
    }

    /// Participant identity
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Offer originator role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current negotiation state
    pub fn negotiation(&self) -> NegotiationState {
        self.negotiation
    }

    /// The owned connection
    pub fn connection(&self) -> &Arc<RtcConnection> {
        &self.connection
    }

    /// Inbound stream handle, if media arrived
    pub fn remote_stream(&self) -> Option<&RemoteStream> {
        self.remote_stream.as_ref()
    }

    /// Number of candidates waiting for a remote description
    pub fn pending_candidates(&self) -> usize {
        self.pending_remote_candidates.len()
    }

    /// Attach local tracks not yet sent on this connection
    ///
    /// A kind already sent is skipped, so repeated attachment and any
    /// ordering of "media acquired" vs. "session created" add each kind
    /// at most once.
    pub async fn attach_local_media(&mut self, media: &LocalMediaSource) -> Result<()> {
        for local in media.tracks() {
            if self.connection.has_track(local.kind) {
                debug!("Peer {} already sends {}, skipping", self.id, local.kind);
                continue;
            }
            self.connection
                .add_track(local.kind, local.track.clone())
                .await?;
        }
        Ok(())
    }

    /// Generate and apply a local offer (Initiator side)
    ///
    /// Kinds without a local track are negotiated receive-only so a
    /// participant without camera or microphone still gets inbound media.
    /// Transitions to `OfferSent`; the returned description goes to the
    /// peer via signaling.
    pub async fn start_negotiation(&mut self, ice_restart: bool) -> Result<RTCSessionDescription> {
        self.connection
            .ensure_recv_transceiver(TrackKind::Audio)
            .await?;
        self.connection
            .ensure_recv_transceiver(TrackKind::Video)
            .await?;

        let offer = self.connection.create_offer(ice_restart).await?;
        self.negotiation = NegotiationState::OfferSent;

        Ok(offer)
    }

    /// Apply a remote offer and produce the answer
    ///
    /// Valid from `Idle` (first negotiation) or `Stable` (renegotiation
    /// during an active call). Other states are unexpected but the offer
    /// is still applied: rejecting mid-call renegotiation would drop an
    /// otherwise healthy session. Transitions to `Stable`.
    pub async fn apply_offer(&mut self, offer: RTCSessionDescription) -> Result<RTCSessionDescription> {
        match self.negotiation {
            NegotiationState::Idle | NegotiationState::Stable => {}
            state => warn!(
                "Peer {} offer arrived in {:?}, applying anyway",
                self.id, state
            ),
        }

        self.connection.set_remote_description(offer).await?;
        self.negotiation = NegotiationState::OfferReceived;
        self.drain_pending_candidates().await;

        let answer = self.connection.create_answer().await?;
        self.negotiation = NegotiationState::Stable;

        Ok(answer)
    }

    /// Apply a remote answer
    ///
    /// Only valid in `OfferSent`; anywhere else is a protocol error and
    /// the connection must not be touched. The caller destroys the
    /// session and lets membership events recreate it.
    pub async fn apply_answer(&mut self, answer: RTCSessionDescription) -> Result<()> {
        if self.negotiation != NegotiationState::OfferSent {
            return Err(Error::PeerConnection(format!(
                "answer from peer {} in state {:?}",
                self.id, self.negotiation
            )));
        }

        self.connection.set_remote_description(answer).await?;
        self.negotiation = NegotiationState::Stable;
        self.drain_pending_candidates().await;

        Ok(())
    }

    /// Accept a remote ICE candidate
    ///
    /// Applied immediately once a remote description exists; buffered in
    /// arrival order otherwise and replayed exactly once after the
    /// description is applied.
    pub async fn add_remote_candidate(&mut self, candidate: RTCIceCandidateInit) -> Result<()> {
        if self.connection.has_remote_description().await {
            self.connection.add_ice_candidate(candidate).await
        } else {
            debug!("Peer {}: no remote description yet, queuing candidate", self.id);
            self.pending_remote_candidates.push(candidate);
            Ok(())
        }
    }

    /// Replay buffered candidates in arrival order, then discard the queue
    async fn drain_pending_candidates(&mut self) {
        if self.pending_remote_candidates.is_empty() {
            return;
        }

        debug!(
            "Peer {}: applying {} buffered candidates",
            self.id,
            self.pending_remote_candidates.len()
        );

        for candidate in self.pending_remote_candidates.drain(..) {
            if let Err(e) = self.connection.add_ice_candidate(candidate).await {
                warn!("Peer {}: buffered candidate rejected: {}", self.id, e);
            }
        }
    }

    /// React to a renegotiation request from the connection
    ///
    /// Only the Initiator re-offers, and only from `Stable`: the guard
    /// prevents concurrent offer generation for the same peer when the
    /// request fires from within event handling.
    pub async fn handle_negotiation_needed(&mut self) -> Result<Option<RTCSessionDescription>> {
        if self.role != Role::Initiator || self.negotiation != NegotiationState::Stable {
            debug!(
                "Peer {}: ignoring renegotiation request ({:?}, {:?})",
                self.id, self.role, self.negotiation
            );
            return Ok(None);
        }

        let offer = self.start_negotiation(false).await?;
        Ok(Some(offer))
    }

    /// React to a terminal connectivity failure
    ///
    /// The Initiator gets one ICE restart per connection lifetime; a
    /// second failure, or any failure on the Responder side, returns
    /// `None` and the caller destroys the session.
    pub async fn handle_connection_failure(&mut self) -> Result<Option<RTCSessionDescription>> {
        self.negotiation = NegotiationState::Failed;

        if self.role != Role::Initiator {
            info!("Peer {}: connection failed as Responder, destroying", self.id);
            return Ok(None);
        }

        if self.restart_attempted {
            info!("Peer {}: ICE restart already attempted, destroying", self.id);
            return Ok(None);
        }

        info!("Peer {}: connection failed, attempting ICE restart", self.id);
        self.restart_attempted = true;

        let offer = self.start_negotiation(true).await?;
        Ok(Some(offer))
    }

    /// Record an inbound track for the snapshot
    ///
    /// The stream handle is set by the first track; later tracks update
    /// the kind flags, and tracks of a different stream are ignored.
    pub fn record_remote_track(&mut self, kind: TrackKind, stream_id: String) {
        let stream = self.remote_stream.get_or_insert_with(|| RemoteStream {
            stream_id: stream_id.clone(),
            has_audio: false,
            has_video: false,
        });

        if stream.stream_id != stream_id {
            debug!(
                "Peer {}: ignoring track on secondary stream {}",
                self.id, stream_id
            );
            return;
        }

        match kind {
            TrackKind::Audio => stream.has_audio = true,
            TrackKind::Video => stream.has_video = true,
        }

        info!("Peer {}: inbound {} track on stream {}", self.id, kind, stream_id);
    }

    /// Tear the session down
    ///
    /// Closes the connection exactly once and releases the stream handle.
    /// Safe to call while an asynchronous negotiation step is in flight:
    /// its stale result is discarded by connection id, never applied.
    pub async fn destroy(mut self) {
        info!("Destroying session for peer {}", self.id);

        self.negotiation = NegotiationState::Closed;
        self.remote_stream = None;
        self.pending_remote_candidates.clear();

        if let Err(e) = self.connection.close().await {
            warn!("Peer {}: error closing connection: {}", self.id, e);
        }
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("negotiation", &self.negotiation)
            .field("pending_candidates", &self.pending_remote_candidates.len())
            .finish()
    }
}
