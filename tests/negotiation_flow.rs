//! Offer/answer exchange, candidate buffering and media attachment

mod harness;

use harness::*;
use meshcall::peer::ConnectionEvent;
use meshcall::{
    CaptureConstraints, LocalMediaSource, MeshEvent, NegotiationState, SampleCapture,
    SignalEnvelope, TrackKind,
};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

fn offer_from(from: &str, payload: RTCSessionDescription) -> SignalEnvelope {
    SignalEnvelope::Offer {
        from: from.to_string(),
        to: "a".to_string(),
        payload,
    }
}

async fn local_media() -> LocalMediaSource {
    LocalMediaSource::acquire(&SampleCapture, &CaptureConstraints::default()).await
}

/// user-joined then offer: the responder answers and reaches Stable
#[tokio::test]
async fn responder_answers_inbound_offer() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(user_joined("b")).await;

    mesh.signal(offer_from("b", remote_offer().await)).await;

    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.negotiation, NegotiationState::Stable);

    let sent = mesh.drain_outbound();
    match sent.as_slice() {
        [SignalEnvelope::Answer { from, to, .. }] => {
            assert_eq!(from, "a");
            assert_eq!(to, "b");
        }
        other => panic!("expected one answer, got {:?}", other),
    }
}

/// An offer from an identity without a session creates one on demand
#[tokio::test]
async fn offer_from_unknown_peer_creates_responder_session() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.signal(offer_from("b", remote_offer().await)).await;

    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.negotiation, NegotiationState::Stable);
    assert_eq!(mesh.snapshot().peer_count(), 1);
}

/// An answer outside OfferSent never mutates the connection; the session
/// is destroyed and recreated by membership events later
#[tokio::test]
async fn answer_in_wrong_state_destroys_session() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(user_joined("b")).await;
    assert_eq!(mesh.snapshot().peer_count(), 1);

    mesh.signal(SignalEnvelope::Answer {
        from: "b".to_string(),
        to: "a".to_string(),
        payload: RTCSessionDescription::default(),
    })
    .await;

    assert!(mesh.coordinator.peer_info("b").is_none());
    assert_eq!(mesh.snapshot().peer_count(), 0);
}

#[tokio::test]
async fn answer_from_unknown_peer_is_ignored() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.signal(SignalEnvelope::Answer {
        from: "ghost".to_string(),
        to: "a".to_string(),
        payload: RTCSessionDescription::default(),
    })
    .await;

    assert!(mesh.coordinator.peer_ids().is_empty());
}

/// Candidates arriving before the remote description are buffered and
/// replayed once it lands
#[tokio::test]
async fn early_candidates_buffer_until_remote_description() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(user_joined("b")).await;

    mesh.signal(ice_candidate("b", "a", 50000)).await;
    mesh.signal(ice_candidate("b", "a", 50001)).await;
    assert_eq!(mesh.coordinator.peer_info("b").unwrap().pending_candidates, 2);

    mesh.signal(offer_from("b", remote_offer().await)).await;

    // Queue drained exactly once
    assert_eq!(mesh.coordinator.peer_info("b").unwrap().pending_candidates, 0);
}

#[tokio::test]
async fn candidate_for_unknown_peer_is_ignored() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.signal(ice_candidate("ghost", "a", 50000)).await;
    assert!(mesh.coordinator.peer_ids().is_empty());
}

/// Local tracks are added at most once per kind, media attached first
#[tokio::test]
async fn media_before_session_adds_each_kind_once() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.coordinator
        .handle_event(MeshEvent::AttachMedia(local_media().await))
        .await;
    mesh.signal(peers(&["b"])).await;

    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.sending_kinds, vec![TrackKind::Audio, TrackKind::Video]);
}

/// Local tracks are added at most once per kind, session created first
#[tokio::test]
async fn media_after_session_adds_each_kind_once() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(peers(&["b"])).await;

    mesh.coordinator
        .handle_event(MeshEvent::AttachMedia(local_media().await))
        .await;

    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.sending_kinds, vec![TrackKind::Audio, TrackKind::Video]);

    // A second source is rejected; the kinds stay unique
    mesh.coordinator
        .handle_event(MeshEvent::AttachMedia(local_media().await))
        .await;
    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.sending_kinds, vec![TrackKind::Audio, TrackKind::Video]);
}

/// The snapshot reflects local tracks once media is attached
#[tokio::test]
async fn snapshot_lists_local_tracks() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.coordinator
        .handle_event(MeshEvent::AttachMedia(local_media().await))
        .await;

    let snapshot = mesh.snapshot();
    assert_eq!(snapshot.local_tracks.len(), 2);
}

/// A participant without local media still negotiates, receive-only
#[tokio::test]
async fn receive_only_participant_completes_negotiation() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;

    mesh.signal(offer_from("b", remote_offer().await)).await;

    let info = mesh.coordinator.peer_info("b").unwrap();
    assert_eq!(info.negotiation, NegotiationState::Stable);
    assert!(info.sending_kinds.is_empty());
}

/// Inbound tracks surface in the snapshot
#[tokio::test]
async fn track_received_updates_snapshot() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(user_joined("b")).await;

    let cid = mesh.coordinator.peer_info("b").unwrap().connection_id;
    mesh.coordinator
        .handle_event(MeshEvent::Connection(ConnectionEvent::TrackReceived {
            peer: "b".to_string(),
            connection_id: cid,
            kind: TrackKind::Video,
            stream_id: "s1".to_string(),
        }))
        .await;

    let snapshot = mesh.snapshot();
    let summary = snapshot.peers.get("b").unwrap();
    assert!(summary.has_video);
    assert!(!summary.has_audio);
    assert_eq!(summary.stream_id.as_deref(), Some("s1"));
}

/// Renegotiation requests are honored only from Stable, Initiator side
#[tokio::test]
async fn negotiation_needed_ignored_while_offer_pending() {
    let mut mesh = TestMesh::new();
    mesh.signal(client_id("a")).await;
    mesh.signal(peers(&["b"])).await;
    mesh.drain_outbound();

    let cid = mesh.coordinator.peer_info("b").unwrap().connection_id;
    mesh.coordinator
        .handle_event(MeshEvent::Connection(ConnectionEvent::NegotiationNeeded {
            peer: "b".to_string(),
            connection_id: cid,
        }))
        .await;

    // Still waiting for the first answer; no concurrent offer generated
    assert!(mesh.drain_outbound().is_empty());
    assert_eq!(
        mesh.coordinator.peer_info("b").unwrap().negotiation,
        NegotiationState::OfferSent
    );
}
