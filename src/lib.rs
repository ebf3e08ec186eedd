//! WebRTC mesh conferencing client
//!
//! N participants in a named room establish a full mesh of real-time
//! audio/video connections, using a relay server only to exchange
//! signaling envelopes, never media.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │  Signaling relay (WebSocket, per-room routing)        │
//! │  ↓ envelopes                                          │
//! │  SignalingChannel (tagged-enum validation)            │
//! │  ↓ events (strictly sequential)                       │
//! │  MeshCoordinator                                      │
//! │  ├─ MeshState: one PeerSession per participant        │
//! │  │   └─ RtcConnection (webrtc-rs, exclusively owned)  │
//! │  ├─ LocalMediaSource (graceful capture degradation)   │
//! │  └─ MeshSnapshot → watch channel → rendering layer    │
//! └───────────────────────────────────────────────────────┘
//! ```
//!
//! All signaling and connection events funnel into one coordinator task
//! and are processed one at a time: per-peer ordering is the receipt
//! order, renegotiation is guarded per session, and a destroyed session
//! discards stale results by connection id.
//!
//! # Example
//!
//! ```no_run
//! use meshcall::{Mesh, MeshConfig, LocalMediaSource, SampleCapture};
//!
//! # async fn example() -> meshcall::Result<()> {
//! let config = MeshConfig::for_room("wss://relay.example.com", "r1");
//!
//! let mesh = Mesh::join(config.clone()).await?;
//!
//! let media = LocalMediaSource::acquire(&SampleCapture, &config.media).await;
//! mesh.attach_local_media(media);
//!
//! let snapshot = mesh.snapshot();
//! println!("{} peers in the room", snapshot.peer_count());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod mesh;
pub mod peer;
pub mod signaling;

// Re-exports for the public API
pub use config::{CaptureConstraints, MeshConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{CaptureDevice, LocalMediaSource, LocalTrackInfo, SampleCapture, TrackKind};
pub use mesh::{Mesh, MeshCoordinator, MeshEvent, MeshSnapshot, PeerInfo, PeerSummary};
pub use peer::{NegotiationState, Role};
pub use signaling::{ChannelEvent, SignalEnvelope, SignalSink};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
