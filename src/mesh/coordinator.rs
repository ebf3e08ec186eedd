//! Mesh orchestration
//!
//! [`MeshCoordinator`] owns the set of peer sessions, consumes signaling
//! and connection events strictly sequentially, drives session
//! transitions and publishes a snapshot after every mutation. Connection
//! callbacks never touch mesh state; they post [`MeshEvent`]s into the
//! coordinator's queue.

use super::snapshot::{MeshSnapshot, PeerSummary};
use crate::config::MeshConfig;
use crate::media::{LocalMediaSource, TrackKind};
use crate::peer::{ConnectionEvent, NegotiationState, PeerSession, Role, RtcConnection};
use crate::signaling::{ChannelEvent, SignalEnvelope, SignalSink};
use std::collections::HashMap;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// Events processed by the coordinator loop
#[derive(Debug)]
pub enum MeshEvent {
    /// Event produced by a session's connection
    Connection(ConnectionEvent),

    /// Attach the local capture source to the mesh
    AttachMedia(LocalMediaSource),

    /// Tear the mesh down
    Leave,
}

/// Introspection summary of a live session
#[derive(Debug, Clone)]
pub struct PeerInfo {
    /// Participant identity
    pub peer_id: String,

    /// Offer originator role
    pub role: Role,

    /// Negotiation state
    pub negotiation: NegotiationState,

    /// Id of the session's connection instance
    pub connection_id: Uuid,

    /// Candidates buffered awaiting a remote description
    pub pending_candidates: usize,

    /// Local track kinds sent on the connection
    pub sending_kinds: Vec<TrackKind>,
}

/// The mesh orchestrator
///
/// Owned by a single task; [`handle_channel_event`](Self::handle_channel_event)
/// and [`handle_event`](Self::handle_event) are its only entry points and
/// must never run concurrently. The event loop calls them one event at a
/// time, which is what keeps per-peer ordering and makes re-entrant
/// renegotiation safe.
pub struct MeshCoordinator {
    config: MeshConfig,

    /// Relay-assigned identity of this participant
    local_id: Option<String>,

    /// One session per remote participant
    sessions: HashMap<String, PeerSession>,

    /// Local capture source, at most one per mesh lifetime
    local_media: Option<LocalMediaSource>,

    /// Outgoing envelopes to the relay
    outbound: SignalSink,

    /// Where connection callbacks post their events
    events_tx: mpsc::UnboundedSender<MeshEvent>,

    /// Snapshot publication
    snapshot_tx: watch::Sender<MeshSnapshot>,
}

impl MeshCoordinator {
    /// Create a coordinator around an outbound sink
    ///
    /// Returns the coordinator, the event queue its connections feed
    /// (drive it through the loop in [`Mesh`](crate::Mesh), or directly
    /// in tests) and the snapshot watch.
    pub fn new(
        config: MeshConfig,
        outbound: SignalSink,
    ) -> (
        Self,
        mpsc::UnboundedReceiver<MeshEvent>,
        watch::Receiver<MeshSnapshot>,
    ) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(MeshSnapshot::default());

        let coordinator = Self {
            config,
            local_id: None,
            sessions: HashMap::new(),
            local_media: None,
            outbound,
            events_tx,
            snapshot_tx,
        };

        (coordinator, events_rx, snapshot_rx)
    }

    /// Sender half of the event queue, for commands
    pub fn events_handle(&self) -> mpsc::UnboundedSender<MeshEvent> {
        self.events_tx.clone()
    }

    /// Introspect a live session
    pub fn peer_info(&self, peer_id: &str) -> Option<PeerInfo> {
        self.sessions.get(peer_id).map(|s| PeerInfo {
            peer_id: s.id().to_string(),
            role: s.role(),
            negotiation: s.negotiation(),
            connection_id: s.connection().connection_id(),
            pending_candidates: s.pending_candidates(),
            sending_kinds: s.connection().sending_kinds(),
        })
    }

    /// Identities with a live session
    pub fn peer_ids(&self) -> Vec<String> {
        self.sessions.keys().cloned().collect()
    }

    /// Handle one signaling channel event
    pub async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Opened => {
                info!("Signaling channel open for room {}", self.config.room);
            }
            ChannelEvent::Envelope(envelope) => self.handle_envelope(envelope).await,
            ChannelEvent::Error(e) => {
                warn!("Signaling channel error: {}", e);
            }
            ChannelEvent::Closed => {
                // Hard-wired contract: a closed channel means all peers
                // are gone, transient or not
                warn!("Signaling channel closed, clearing {} sessions", self.sessions.len());
                self.clear_sessions().await;
                self.publish_snapshot();
            }
        }
    }

    /// Handle one mesh event
    pub async fn handle_event(&mut self, event: MeshEvent) {
        match event {
            MeshEvent::Connection(conn_event) => self.handle_connection_event(conn_event).await,
            MeshEvent::AttachMedia(source) => self.attach_local_media(source).await,
            MeshEvent::Leave => self.shutdown().await,
        }
    }

    async fn handle_envelope(&mut self, envelope: SignalEnvelope) {
        debug!("Handling {} envelope", envelope.kind());

        match envelope {
            SignalEnvelope::ClientId { payload } => {
                info!("Assigned client id {}", payload.id);
                self.local_id = Some(payload.id);
                self.publish_snapshot();
            }
            SignalEnvelope::Peers { payload } => self.handle_peers(payload.peers).await,
            SignalEnvelope::UserJoined { from } => self.handle_user_joined(from).await,
            SignalEnvelope::UserLeft { from } => self.handle_user_left(&from).await,
            SignalEnvelope::Offer { from, payload, .. } => self.handle_offer(from, payload).await,
            SignalEnvelope::Answer { from, payload, .. } => self.handle_answer(&from, payload).await,
            SignalEnvelope::IceCandidate { from, payload, .. } => {
                self.handle_candidate(&from, payload).await
            }
        }
    }

    /// Authoritative membership reset: this side initiates toward every
    /// member already in the room, so exactly one side of each pair sends
    /// the first offer
    async fn handle_peers(&mut self, peers: Vec<String>) {
        info!("Membership reset: {} peers", peers.len());

        self.clear_sessions().await;

        for peer_id in peers {
            self.create_session(peer_id, Role::Initiator).await;
        }

        self.publish_snapshot();
    }

    /// A new arrival initiates toward us; we answer
    async fn handle_user_joined(&mut self, peer_id: String) {
        if self.sessions.contains_key(&peer_id) {
            debug!("Peer {} already has a session, ignoring join", peer_id);
            return;
        }

        info!("Peer {} joined", peer_id);
        self.create_session(peer_id, Role::Responder).await;
        self.publish_snapshot();
    }

    async fn handle_user_left(&mut self, peer_id: &str) {
        match self.sessions.remove(peer_id) {
            Some(session) => {
                info!("Peer {} left", peer_id);
                session.destroy().await;
                self.publish_snapshot();
            }
            None => debug!("Peer {} left without a session, no-op", peer_id),
        }
    }

    async fn handle_offer(&mut self, peer_id: String, offer: RTCSessionDescription) {
        // An offer from an unknown identity creates its session on demand
        if !self.sessions.contains_key(&peer_id) {
            self.create_session(peer_id.clone(), Role::Responder).await;
        }

        let Some(session) = self.sessions.get_mut(&peer_id) else {
            warn!("Peer {}: session creation failed, dropping offer", peer_id);
            return;
        };

        match session.apply_offer(offer).await {
            Ok(answer) => {
                let envelope = SignalEnvelope::Answer {
                    from: self.local_id.clone().unwrap_or_default(),
                    to: peer_id,
                    payload: answer,
                };
                self.outbound.send(envelope);
            }
            Err(e) => {
                warn!("Peer {}: offer failed ({}), destroying session", peer_id, e);
                self.destroy_session(&peer_id).await;
            }
        }

        self.publish_snapshot();
    }

    async fn handle_answer(&mut self, peer_id: &str, answer: RTCSessionDescription) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            warn!("Answer from unknown peer {}, ignoring", peer_id);
            return;
        };

        if let Err(e) = session.apply_answer(answer).await {
            // Recovery by restart, not repair: drop the session and let
            // membership events recreate it
            warn!("Peer {}: {}, destroying session", peer_id, e);
            self.destroy_session(peer_id).await;
        }

        self.publish_snapshot();
    }

    async fn handle_candidate(&mut self, peer_id: &str, candidate: RTCIceCandidateInit) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            debug!("Candidate from unknown peer {}, ignoring", peer_id);
            return;
        };

        if let Err(e) = session.add_remote_candidate(candidate).await {
            warn!("Peer {}: candidate rejected: {}", peer_id, e);
        }
    }

    async fn handle_connection_event(&mut self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::LocalCandidate {
                peer,
                connection_id,
                candidate,
            } => {
                if !self.session_matches(&peer, connection_id) {
                    return;
                }
                // Forwarded verbatim, never buffered or deduplicated
                self.outbound.send(SignalEnvelope::IceCandidate {
                    from: self.local_id.clone().unwrap_or_default(),
                    to: peer,
                    payload: candidate,
                });
            }

            ConnectionEvent::TrackReceived {
                peer,
                connection_id,
                kind,
                stream_id,
            } => {
                if !self.session_matches(&peer, connection_id) {
                    return;
                }
                if let Some(session) = self.sessions.get_mut(&peer) {
                    session.record_remote_track(kind, stream_id);
                    self.publish_snapshot();
                }
            }

            ConnectionEvent::StateChanged {
                peer,
                connection_id,
                state,
            } => {
                if !self.session_matches(&peer, connection_id) {
                    return;
                }
                match state {
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed => {
                        self.handle_peer_failure(&peer).await;
                    }
                    other => debug!("Peer {} state {}, no action", peer, other),
                }
            }

            ConnectionEvent::NegotiationNeeded {
                peer,
                connection_id,
            } => {
                if !self.session_matches(&peer, connection_id) {
                    return;
                }
                self.handle_negotiation_needed(&peer).await;
            }
        }
    }

    /// Whether an event's connection instance is still the live one
    ///
    /// A destroyed session's connection keeps emitting callbacks until it
    /// is fully closed; those results are stale and must not be applied.
    fn session_matches(&self, peer_id: &str, connection_id: Uuid) -> bool {
        match self.sessions.get(peer_id) {
            Some(session) if session.connection().connection_id() == connection_id => true,
            Some(_) => {
                debug!("Stale connection event for peer {}, dropping", peer_id);
                false
            }
            None => {
                debug!("Connection event for unknown peer {}, dropping", peer_id);
                false
            }
        }
    }

    async fn handle_peer_failure(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };

        match session.handle_connection_failure().await {
            Ok(Some(restart_offer)) => {
                self.outbound.send(SignalEnvelope::Offer {
                    from: self.local_id.clone().unwrap_or_default(),
                    to: peer_id.to_string(),
                    payload: restart_offer,
                });
            }
            Ok(None) => {
                self.destroy_session(peer_id).await;
            }
            Err(e) => {
                warn!("Peer {}: ICE restart failed ({}), destroying", peer_id, e);
                self.destroy_session(peer_id).await;
            }
        }

        self.publish_snapshot();
    }

    async fn handle_negotiation_needed(&mut self, peer_id: &str) {
        let Some(session) = self.sessions.get_mut(peer_id) else {
            return;
        };

        match session.handle_negotiation_needed().await {
            Ok(Some(offer)) => {
                self.outbound.send(SignalEnvelope::Offer {
                    from: self.local_id.clone().unwrap_or_default(),
                    to: peer_id.to_string(),
                    payload: offer,
                });
                self.publish_snapshot();
            }
            Ok(None) => {}
            Err(e) => {
                warn!("Peer {}: renegotiation failed ({}), destroying", peer_id, e);
                self.destroy_session(peer_id).await;
                self.publish_snapshot();
            }
        }
    }

    /// Create a session, destroying any existing one for the identity
    /// first; never two sessions for one participant
    async fn create_session(&mut self, peer_id: String, role: Role) {
        if let Some(old) = self.sessions.remove(&peer_id) {
            info!("Peer {} already had a session, recreating", peer_id);
            old.destroy().await;
        }

        let connection = match RtcConnection::new(&peer_id, &self.config).await {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Peer {}: failed to allocate connection: {}", peer_id, e);
                return;
            }
        };

        let events_tx = self.events_tx.clone();
        connection.wire_events(move |event| {
            let _ = events_tx.send(MeshEvent::Connection(event));
        });

        let mut session = PeerSession::new(&peer_id, role, connection);

        if let Some(media) = &self.local_media {
            if let Err(e) = session.attach_local_media(media).await {
                warn!("Peer {}: failed to attach local media: {}", peer_id, e);
            }
        }

        if role == Role::Initiator {
            match session.start_negotiation(false).await {
                Ok(offer) => {
                    self.outbound.send(SignalEnvelope::Offer {
                        from: self.local_id.clone().unwrap_or_default(),
                        to: peer_id.clone(),
                        payload: offer,
                    });
                }
                Err(e) => {
                    warn!("Peer {}: initial offer failed ({}), dropping session", peer_id, e);
                    session.destroy().await;
                    return;
                }
            }
        }

        self.sessions.insert(peer_id, session);
    }

    async fn destroy_session(&mut self, peer_id: &str) {
        if let Some(session) = self.sessions.remove(peer_id) {
            session.destroy().await;
        }
    }

    async fn clear_sessions(&mut self) {
        for (_, session) in self.sessions.drain() {
            session.destroy().await;
        }
    }

    /// Record the local source and push its tracks into every session
    /// that does not yet send them
    async fn attach_local_media(&mut self, source: LocalMediaSource) {
        if self.local_media.is_some() {
            warn!("Local media already attached, ignoring");
            return;
        }

        info!("Attaching local media ({} tracks)", source.tracks().len());

        for session in self.sessions.values_mut() {
            if let Err(e) = session.attach_local_media(&source).await {
                warn!("Peer {}: failed to attach local media: {}", session.id(), e);
            }
        }

        self.local_media = Some(source);
        self.publish_snapshot();
    }

    /// Tear the mesh down: all sessions destroyed, media stopped
    ///
    /// Idempotent; the signaling channel closes when the sink is dropped
    /// with the coordinator.
    pub async fn shutdown(&mut self) {
        info!("Leaving room {}", self.config.room);

        self.clear_sessions().await;

        if let Some(media) = self.local_media.as_mut() {
            media.stop();
        }

        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let snapshot = MeshSnapshot {
            local_id: self.local_id.clone(),
            local_tracks: self
                .local_media
                .as_ref()
                .map(|m| m.track_info())
                .unwrap_or_default(),
            peers: self
                .sessions
                .iter()
                .map(|(id, session)| (id.clone(), PeerSummary::of(session)))
                .collect(),
        };

        self.snapshot_tx.send_replace(snapshot);
    }
}

impl std::fmt::Debug for MeshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeshCoordinator")
            .field("local_id", &self.local_id)
            .field("sessions", &self.sessions.len())
            .field("has_media", &self.local_media.is_some())
            .finish()
    }
}
