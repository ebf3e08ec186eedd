//! Peer sessions and the connection capability

pub mod connection;
pub mod session;

pub use connection::{ConnectionEvent, RtcConnection};
pub use session::{NegotiationState, PeerSession, RemoteStream, Role};
