//! Connection capability
//!
//! [`RtcConnection`] wraps one `webrtc::RTCPeerConnection`, exclusively
//! owned by its peer session. The coordinator drives it through a small
//! operation set; events flow back through a forwarding hook tagged with
//! the connection's instance id so results for a torn-down connection can
//! be discarded instead of applied.

use crate::config::MeshConfig;
use crate::media::TrackKind;
use crate::{Error, Result};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::offer_answer_options::RTCOfferOptions;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::rtp_transceiver::rtp_transceiver_direction::RTCRtpTransceiverDirection;
use webrtc::rtp_transceiver::RTCRtpTransceiverInit;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

/// Events emitted by a connection back to the coordinator
///
/// Every event carries the `connection_id` of the instance that produced
/// it; events whose id no longer matches the live session are stale and
/// get dropped.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// Local ICE candidate produced; forward verbatim to the peer
    LocalCandidate {
        /// Remote participant
        peer: String,
        /// Producing connection instance
        connection_id: Uuid,
        /// The candidate
        candidate: RTCIceCandidateInit,
    },

    /// Inbound media track arrived
    TrackReceived {
        /// Remote participant
        peer: String,
        /// Producing connection instance
        connection_id: Uuid,
        /// Track kind
        kind: TrackKind,
        /// Remote stream the track belongs to
        stream_id: String,
    },

    /// Underlying connection state changed
    StateChanged {
        /// Remote participant
        peer: String,
        /// Producing connection instance
        connection_id: Uuid,
        /// New state
        state: RTCPeerConnectionState,
    },

    /// The connection wants renegotiation (tracks changed)
    NegotiationNeeded {
        /// Remote participant
        peer: String,
        /// Producing connection instance
        connection_id: Uuid,
    },
}

/// Exclusive wrapper over one WebRTC peer connection
pub struct RtcConnection {
    /// Remote participant this connection reaches
    peer_id: String,

    /// Unique id of this connection instance
    connection_id: Uuid,

    /// Underlying WebRTC peer connection
    pc: Arc<RTCPeerConnection>,

    /// Track kinds already added as senders (at most one per kind)
    sent_kinds: Mutex<HashSet<TrackKind>>,

    /// Kinds covered by a receive-only transceiver
    recv_kinds: Mutex<HashSet<TrackKind>>,

    /// Closed exactly once
    closed: AtomicBool,
}

impl RtcConnection {
    /// Create a new connection toward `peer_id`
    pub async fn new(peer_id: &str, config: &MeshConfig) -> Result<Self> {
        let connection_id = Uuid::new_v4();

        debug!(
            "Creating connection: peer={}, connection_id={}",
            peer_id, connection_id
        );

        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(|e| Error::PeerConnection(format!("Failed to register codecs: {}", e)))?;

        let interceptor_registry = register_default_interceptors(Default::default(), &mut media_engine)
            .map_err(|e| Error::PeerConnection(format!("Failed to register interceptors: {}", e)))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(interceptor_registry)
            .build();

        let ice_servers: Vec<RTCIceServer> = config
            .stun_servers
            .iter()
            .map(|url| RTCIceServer {
                urls: vec![url.clone()],
                ..Default::default()
            })
            .chain(config.turn_servers.iter().map(|turn| {
                #[allow(clippy::needless_update)]
                RTCIceServer {
                    urls: vec![turn.url.clone()],
                    username: turn.username.clone(),
                    credential: turn.credential.clone(),
                    ..Default::default()
                }
            }))
            .collect();

        let rtc_config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let pc = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .map_err(|e| Error::PeerConnection(format!("Failed to create connection: {}", e)))?,
        );

        Ok(Self {
            peer_id: peer_id.to_string(),
            connection_id,
            pc,
            sent_kinds: Mutex::new(HashSet::new()),
            recv_kinds: Mutex::new(HashSet::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// The remote participant identity
    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The id of this connection instance
    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Install the event forwarding hooks
    ///
    /// Callbacks never mutate mesh state directly; they post events into
    /// the coordinator's queue through `forward`.
    pub fn wire_events<F>(&self, forward: F)
    where
        F: Fn(ConnectionEvent) + Send + Sync + Clone + 'static,
    {
        let peer = self.peer_id.clone();
        let connection_id = self.connection_id;
        let hook = forward.clone();

        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => hook(ConnectionEvent::LocalCandidate {
                            peer: peer.clone(),
                            connection_id,
                            candidate: init,
                        }),
                        Err(e) => warn!("Failed to serialize local candidate: {}", e),
                    }
                } else {
                    debug!("ICE gathering complete for peer {}", peer);
                }
                Box::pin(async {})
            }));

        let peer = self.peer_id.clone();
        let hook = forward.clone();

        self.pc
            .on_track(Box::new(move |track, _receiver, _transceiver| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => Some(TrackKind::Audio),
                    RTPCodecType::Video => Some(TrackKind::Video),
                    RTPCodecType::Unspecified => None,
                };

                if let Some(kind) = kind {
                    hook(ConnectionEvent::TrackReceived {
                        peer: peer.clone(),
                        connection_id,
                        kind,
                        stream_id: track.stream_id(),
                    });
                }
                Box::pin(async {})
            }));

        let peer = self.peer_id.clone();
        let hook = forward.clone();

        self.pc.on_peer_connection_state_change(Box::new(
            move |state: RTCPeerConnectionState| {
                debug!("Peer {} connection state: {}", peer, state);
                hook(ConnectionEvent::StateChanged {
                    peer: peer.clone(),
                    connection_id,
                    state,
                });
                Box::pin(async {})
            },
        ));

        let peer = self.peer_id.clone();

        self.pc.on_negotiation_needed(Box::new(move || {
            forward(ConnectionEvent::NegotiationNeeded {
                peer: peer.clone(),
                connection_id,
            });
            Box::pin(async {})
        }));
    }

    /// Create an offer and apply it as the local description
    ///
    /// `ice_restart` requests fresh transport parameters to recover a
    /// failed connection without losing the call.
    pub async fn create_offer(&self, ice_restart: bool) -> Result<RTCSessionDescription> {
        let options = ice_restart.then(|| RTCOfferOptions {
            ice_restart: true,
            ..Default::default()
        });

        let offer = self
            .pc
            .create_offer(options)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create offer: {}", e)))?;

        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        debug!(
            "Created {}offer for peer {}",
            if ice_restart { "restart " } else { "" },
            self.peer_id
        );

        Ok(offer)
    }

    /// Create an answer to the applied remote offer and set it locally
    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to create answer: {}", e)))?;

        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set local description: {}", e)))?;

        debug!("Created answer for peer {}", self.peer_id);

        Ok(answer)
    }

    /// Apply a remote session description
    pub async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        self.pc
            .set_remote_description(desc)
            .await
            .map_err(|e| Error::Sdp(format!("Failed to set remote description: {}", e)))
    }

    /// Whether a remote description has been applied
    pub async fn has_remote_description(&self) -> bool {
        self.pc.remote_description().await.is_some()
    }

    /// Hand a remote ICE candidate to the transport
    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        self.pc
            .add_ice_candidate(candidate)
            .await
            .map_err(|e| Error::IceCandidate(format!("Failed to add ICE candidate: {}", e)))
    }

    /// Add a local track as a sender
    ///
    /// # Errors
    ///
    /// Returns an error if a track of this kind was already added; a
    /// connection carries at most one sender per kind.
    pub async fn add_track(
        &self,
        kind: TrackKind,
        track: Arc<TrackLocalStaticSample>,
    ) -> Result<()> {
        {
            let sent = self.sent_kinds.lock().unwrap();
            if sent.contains(&kind) {
                return Err(Error::MediaTrack(format!(
                    "{} track already added for peer {}",
                    kind, self.peer_id
                )));
            }
        }

        self.pc
            .add_track(track as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(|e| Error::MediaTrack(format!("Failed to add {} track: {}", kind, e)))?;

        self.sent_kinds.lock().unwrap().insert(kind);

        debug!("Added {} track for peer {}", kind, self.peer_id);

        Ok(())
    }

    /// Whether a sender of this kind exists
    pub fn has_track(&self, kind: TrackKind) -> bool {
        self.sent_kinds.lock().unwrap().contains(&kind)
    }

    /// Track kinds currently sent on this connection
    pub fn sending_kinds(&self) -> Vec<TrackKind> {
        let mut kinds: Vec<TrackKind> = self.sent_kinds.lock().unwrap().iter().copied().collect();
        kinds.sort_by_key(|k| *k as u8);
        kinds
    }

    /// Ensure inbound media of this kind is negotiated even without a
    /// local track, by adding a receive-only transceiver
    pub async fn ensure_recv_transceiver(&self, kind: TrackKind) -> Result<()> {
        if self.has_track(kind) || self.recv_kinds.lock().unwrap().contains(&kind) {
            return Ok(());
        }

        let codec_type = match kind {
            TrackKind::Audio => RTPCodecType::Audio,
            TrackKind::Video => RTPCodecType::Video,
        };

        self.pc
            .add_transceiver_from_kind(
                codec_type,
                Some(RTCRtpTransceiverInit {
                    direction: RTCRtpTransceiverDirection::Recvonly,
                    send_encodings: vec![],
                }),
            )
            .await
            .map_err(|e| {
                Error::PeerConnection(format!("Failed to add {} transceiver: {}", kind, e))
            })?;

        self.recv_kinds.lock().unwrap().insert(kind);

        Ok(())
    }

    /// Close the connection; idempotent, the transport is closed once
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            debug!("Connection to peer {} already closed", self.peer_id);
            return Ok(());
        }

        info!("Closing connection to peer {}", self.peer_id);

        self.pc
            .close()
            .await
            .map_err(|e| Error::PeerConnection(format!("Failed to close connection: {}", e)))
    }
}

impl std::fmt::Debug for RtcConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtcConnection")
            .field("peer_id", &self.peer_id)
            .field("connection_id", &self.connection_id)
            .field("closed", &self.closed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{CaptureDevice, SampleCapture};

    #[tokio::test]
    async fn test_connection_creation() {
        let config = MeshConfig::default();
        let conn = RtcConnection::new("peer-test", &config).await.unwrap();

        assert_eq!(conn.peer_id(), "peer-test");
        assert!(!conn.has_remote_description().await);
    }

    #[tokio::test]
    async fn test_connection_ids_are_unique() {
        let config = MeshConfig::default();
        let a = RtcConnection::new("peer-a", &config).await.unwrap();
        let b = RtcConnection::new("peer-a", &config).await.unwrap();

        assert_ne!(a.connection_id(), b.connection_id());
    }

    #[tokio::test]
    async fn test_create_offer_with_recv_transceivers() {
        let config = MeshConfig::default();
        let conn = RtcConnection::new("peer-test", &config).await.unwrap();

        conn.ensure_recv_transceiver(TrackKind::Audio).await.unwrap();
        conn.ensure_recv_transceiver(TrackKind::Video).await.unwrap();

        let offer = conn.create_offer(false).await.unwrap();
        assert!(offer.sdp.contains("audio"));
        assert!(offer.sdp.contains("video"));
    }

    #[tokio::test]
    async fn test_duplicate_track_kind_rejected() {
        let config = MeshConfig::default();
        let conn = RtcConnection::new("peer-test", &config).await.unwrap();

        let track = SampleCapture.open_track(TrackKind::Audio).await.unwrap();
        conn.add_track(TrackKind::Audio, track.clone()).await.unwrap();
        assert!(conn.has_track(TrackKind::Audio));

        let result = conn.add_track(TrackKind::Audio, track).await;
        assert!(matches!(result, Err(Error::MediaTrack(_))));
    }

    #[tokio::test]
    async fn test_recv_transceiver_skipped_when_sending() {
        let config = MeshConfig::default();
        let conn = RtcConnection::new("peer-test", &config).await.unwrap();

        let track = SampleCapture.open_track(TrackKind::Audio).await.unwrap();
        conn.add_track(TrackKind::Audio, track).await.unwrap();

        // No-op: the sender's transceiver already negotiates audio
        conn.ensure_recv_transceiver(TrackKind::Audio).await.unwrap();
        assert!(conn.recv_kinds.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let config = MeshConfig::default();
        let conn = RtcConnection::new("peer-test", &config).await.unwrap();

        conn.close().await.unwrap();
        conn.close().await.unwrap();
    }
}
