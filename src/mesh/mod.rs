//! Mesh facade: join a room, observe snapshots, leave

pub mod coordinator;
pub mod snapshot;

pub use coordinator::{MeshCoordinator, MeshEvent, PeerInfo};
pub use snapshot::{MeshSnapshot, PeerSummary};

use crate::config::MeshConfig;
use crate::media::LocalMediaSource;
use crate::signaling::{self, ChannelEvent};
use crate::Result;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

/// A joined room
///
/// Owns the coordinator task. Dropping the handle (or calling
/// [`leave`](Self::leave)) tears the mesh down: every session is
/// destroyed, local media stopped, and the relay connection closed.
pub struct Mesh {
    commands: mpsc::UnboundedSender<MeshEvent>,
    snapshot_rx: watch::Receiver<MeshSnapshot>,
    task: Option<JoinHandle<()>>,
}

impl Mesh {
    /// Join a room
    ///
    /// Connects the signaling channel and spawns the coordinator loop.
    /// This is the only operation that fails outright to the caller;
    /// everything after it degrades per peer.
    pub async fn join(config: MeshConfig) -> Result<Self> {
        config.validate()?;

        let (sink, chan_rx) = signaling::connect(&config).await?;
        let (coordinator, events_rx, snapshot_rx) = MeshCoordinator::new(config, sink);
        let commands = coordinator.events_handle();

        let task = tokio::spawn(run_loop(coordinator, chan_rx, events_rx));

        Ok(Self {
            commands,
            snapshot_rx,
            task: Some(task),
        })
    }

    /// Attach the local capture source
    ///
    /// Its tracks are added to every existing session missing them and to
    /// every future session. At most one source per mesh lifetime.
    pub fn attach_local_media(&self, source: LocalMediaSource) {
        let _ = self.commands.send(MeshEvent::AttachMedia(source));
    }

    /// Current mesh snapshot
    pub fn snapshot(&self) -> MeshSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Watch for snapshot changes
    ///
    /// A new value is published after every mesh mutation.
    pub fn watch(&self) -> watch::Receiver<MeshSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Leave the room; idempotent
    pub async fn leave(&mut self) {
        let _ = self.commands.send(MeshEvent::Leave);

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            // Best effort: ask the loop to shut down, don't wait for it
            let _ = self.commands.send(MeshEvent::Leave);
            drop(task);
        }
    }
}

/// The single task that makes all mesh mutations sequential
async fn run_loop(
    mut coordinator: MeshCoordinator,
    mut chan_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    mut events_rx: mpsc::UnboundedReceiver<MeshEvent>,
) {
    loop {
        tokio::select! {
            channel_event = chan_rx.recv() => match channel_event {
                Some(event) => coordinator.handle_channel_event(event).await,
                None => {
                    debug!("Channel event stream ended");
                    coordinator.shutdown().await;
                    break;
                }
            },
            mesh_event = events_rx.recv() => match mesh_event {
                Some(MeshEvent::Leave) => {
                    coordinator.shutdown().await;
                    break;
                }
                Some(event) => coordinator.handle_event(event).await,
                // The coordinator holds a sender; this arm is unreachable
                // until it is dropped
                None => break,
            },
        }
    }

    debug!("Coordinator loop exited");
}
