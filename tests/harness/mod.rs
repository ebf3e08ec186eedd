//! Shared fixtures for coordinator tests
//!
//! The coordinator is driven directly, one event at a time, with a
//! captured outbound sink instead of a live relay socket. Offer
//! fixtures come from real connections so descriptions parse.

// Each test binary uses a subset of these helpers
#![allow(dead_code)]

use meshcall::peer::RtcConnection;
use meshcall::signaling::{ChannelEvent, ClientIdPayload, PeersPayload, SignalEnvelope, SignalSink};
use meshcall::{MeshConfig, MeshCoordinator, MeshEvent, MeshSnapshot, TrackKind};
use tokio::sync::{mpsc, watch};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

pub struct TestMesh {
    pub coordinator: MeshCoordinator,
    pub events_rx: mpsc::UnboundedReceiver<MeshEvent>,
    pub snapshot_rx: watch::Receiver<MeshSnapshot>,
    pub outbound_rx: mpsc::UnboundedReceiver<SignalEnvelope>,
}

impl TestMesh {
    pub fn new() -> Self {
        let (sink, outbound_rx) = SignalSink::pair();
        let (coordinator, events_rx, snapshot_rx) =
            MeshCoordinator::new(MeshConfig::default(), sink);

        Self {
            coordinator,
            events_rx,
            snapshot_rx,
            outbound_rx,
        }
    }

    /// Feed one envelope as if it arrived from the relay
    pub async fn signal(&mut self, envelope: SignalEnvelope) {
        self.coordinator
            .handle_channel_event(ChannelEvent::Envelope(envelope))
            .await;
    }

    /// Collect everything sent toward the relay so far
    pub fn drain_outbound(&mut self) -> Vec<SignalEnvelope> {
        let mut sent = Vec::new();
        while let Ok(envelope) = self.outbound_rx.try_recv() {
            sent.push(envelope);
        }
        sent
    }

    pub fn snapshot(&self) -> MeshSnapshot {
        self.snapshot_rx.borrow().clone()
    }
}

pub fn client_id(id: &str) -> SignalEnvelope {
    SignalEnvelope::ClientId {
        payload: ClientIdPayload { id: id.to_string() },
    }
}

pub fn peers(ids: &[&str]) -> SignalEnvelope {
    SignalEnvelope::Peers {
        payload: PeersPayload {
            peers: ids.iter().map(|s| s.to_string()).collect(),
        },
    }
}

pub fn user_joined(id: &str) -> SignalEnvelope {
    SignalEnvelope::UserJoined {
        from: id.to_string(),
    }
}

pub fn user_left(id: &str) -> SignalEnvelope {
    SignalEnvelope::UserLeft {
        from: id.to_string(),
    }
}

pub fn ice_candidate(from: &str, to: &str, port: u16) -> SignalEnvelope {
    SignalEnvelope::IceCandidate {
        from: from.to_string(),
        to: to.to_string(),
        payload: RTCIceCandidateInit {
            candidate: format!("candidate:1 1 UDP 2130706431 127.0.0.1 {} typ host", port),
            sdp_mid: Some("0".to_string()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        },
    }
}

/// A real SDP offer, produced by a throwaway connection
pub async fn remote_offer() -> RTCSessionDescription {
    let conn = RtcConnection::new("fixture", &MeshConfig::default())
        .await
        .expect("fixture connection");
    conn.ensure_recv_transceiver(TrackKind::Audio)
        .await
        .expect("audio transceiver");
    conn.ensure_recv_transceiver(TrackKind::Video)
        .await
        .expect("video transceiver");
    let offer = conn.create_offer(false).await.expect("fixture offer");
    conn.close().await.expect("fixture close");
    offer
}
