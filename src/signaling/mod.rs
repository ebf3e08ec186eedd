//! Signaling: envelope protocol and the relay channel

pub mod channel;
pub mod protocol;

pub use channel::{connect, ChannelEvent, SignalSink};
pub use protocol::{ClientIdPayload, PeersPayload, SignalEnvelope};
