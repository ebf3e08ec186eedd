//! WebSocket signaling channel
//!
//! Maintains the connection to the relay, serializes outgoing envelopes
//! and parses incoming frames into [`SignalEnvelope`]s. The receive side
//! is a lazy, unbounded, non-restartable event stream; the send side is
//! best-effort with no buffering or retry once the socket is gone.

use super::protocol::SignalEnvelope;
use crate::config::MeshConfig;
use crate::{Error, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// Events surfaced by the channel, in receipt order
#[derive(Debug)]
pub enum ChannelEvent {
    /// Socket established
    Opened,

    /// A parsed envelope from the relay
    Envelope(SignalEnvelope),

    /// Transport-level error; a `Closed` event follows
    Error(String),

    /// Socket gone; the coordinator treats this as all peers gone
    Closed,
}

/// Best-effort sender of outgoing envelopes
///
/// Cloneable handle onto the writer task. `send` silently drops the
/// envelope when the channel is no longer open.
#[derive(Debug, Clone)]
pub struct SignalSink {
    tx: mpsc::UnboundedSender<SignalEnvelope>,
}

impl SignalSink {
    /// Create a sink and the queue its envelopes arrive on
    ///
    /// Used internally by [`connect`]; also the way tests drive a
    /// coordinator without a live socket and observe what it sends.
    pub fn pair() -> (Self, mpsc::UnboundedReceiver<SignalEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Send an envelope; drops it silently if the channel is closed
    pub fn send(&self, envelope: SignalEnvelope) {
        if let Err(e) = self.tx.send(envelope) {
            debug!("Signaling channel closed, dropping {} envelope", e.0.kind());
        }
    }
}

/// Connect to the relay for the configured room
///
/// Returns the outgoing sink and the incoming event stream. Two tasks are
/// spawned: a writer draining the sink queue into the socket, and a reader
/// parsing frames into events. Both terminate when the socket closes;
/// dropping every `SignalSink` clone shuts the writer down and sends a
/// close frame to the relay.
pub async fn connect(
    config: &MeshConfig,
) -> Result<(SignalSink, mpsc::UnboundedReceiver<ChannelEvent>)> {
    let url = format!(
        "{}/ws?room={}",
        config.signaling_url.trim_end_matches('/'),
        config.room
    );

    info!("Connecting to signaling relay: {}", url);

    let (ws_stream, _response) = connect_async(url.as_str())
        .await
        .map_err(|e| Error::WebSocket(format!("Failed to connect to {}: {}", url, e)))?;

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    let (sink, mut out_rx) = SignalSink::pair();
    let (event_tx, event_rx) = mpsc::unbounded_channel();

    let _ = event_tx.send(ChannelEvent::Opened);

    // Writer: sink queue -> socket
    tokio::spawn(async move {
        while let Some(envelope) = out_rx.recv().await {
            let text = match envelope.to_json() {
                Ok(text) => text,
                Err(e) => {
                    warn!("Dropping unserializable envelope: {}", e);
                    continue;
                }
            };

            if let Err(e) = ws_tx.send(Message::Text(text)).await {
                debug!("Signaling write failed, stopping writer: {}", e);
                break;
            }
        }

        // Sink dropped or socket dead; tell the relay we are leaving
        let _ = ws_tx.send(Message::Close(None)).await;
        debug!("Signaling writer task exited");
    });

    // Reader: socket -> event stream
    tokio::spawn(async move {
        while let Some(frame) = ws_rx.next().await {
            match frame {
                Ok(Message::Text(text)) => match SignalEnvelope::from_json(&text) {
                    Ok(envelope) => {
                        debug!("Received {} envelope", envelope.kind());
                        if event_tx.send(ChannelEvent::Envelope(envelope)).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Dropping malformed signaling frame: {}", e);
                    }
                },
                Ok(Message::Close(_)) => {
                    info!("Signaling relay closed the connection");
                    break;
                }
                Ok(_) => {
                    // Ping/Pong handled by tungstenite, binary frames ignored
                }
                Err(e) => {
                    warn!("Signaling read error: {}", e);
                    let _ = event_tx.send(ChannelEvent::Error(e.to_string()));
                    break;
                }
            }
        }

        let _ = event_tx.send(ChannelEvent::Closed);
        debug!("Signaling reader task exited");
    });

    Ok((sink, event_rx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::protocol::SignalEnvelope;

    #[tokio::test]
    async fn test_sink_send_after_receiver_dropped_is_silent() {
        let (sink, rx) = SignalSink::pair();
        drop(rx);

        // Best-effort contract: no panic, no error surfaced
        sink.send(SignalEnvelope::UserLeft {
            from: "b".to_string(),
        });
    }

    #[tokio::test]
    async fn test_sink_delivers_in_order() {
        let (sink, mut rx) = SignalSink::pair();

        sink.send(SignalEnvelope::UserJoined {
            from: "b".to_string(),
        });
        sink.send(SignalEnvelope::UserLeft {
            from: "b".to_string(),
        });

        assert_eq!(rx.recv().await.unwrap().kind(), "user-joined");
        assert_eq!(rx.recv().await.unwrap().kind(), "user-left");
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Nothing listens on this port; join must fail outright
        let config = MeshConfig::for_room("ws://127.0.0.1:9", "r1");
        let result = connect(&config).await;
        assert!(matches!(result, Err(Error::WebSocket(_))));
    }
}
