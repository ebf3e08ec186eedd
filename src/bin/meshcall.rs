//! Join a room from the command line and log mesh activity

use clap::Parser;
use meshcall::{LocalMediaSource, Mesh, MeshConfig, SampleCapture};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "meshcall", about = "WebRTC mesh conferencing client")]
struct Args {
    /// Signaling relay URL
    #[arg(long, env = "MESHCALL_SIGNALING_URL", default_value = "ws://localhost:8080")]
    signaling_url: String,

    /// Room to join
    #[arg(long, env = "MESHCALL_ROOM")]
    room: String,

    /// Join without requesting local media
    #[arg(long)]
    no_media: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "meshcall=info".into()),
        )
        .init();

    let args = Args::parse();

    let config = MeshConfig::for_room(&args.signaling_url, &args.room);
    config.validate()?;

    info!("Joining room {} via {}", config.room, config.signaling_url);
    let mut mesh = Mesh::join(config.clone()).await?;

    if !args.no_media {
        let media = LocalMediaSource::acquire(&SampleCapture, &config.media).await;
        mesh.attach_local_media(media);
    }

    let mut snapshots = mesh.watch();

    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                info!(
                    "mesh update: {}",
                    serde_json::to_string(&snapshot).unwrap_or_else(|_| "<unprintable>".into())
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, leaving room");
                break;
            }
        }
    }

    mesh.leave().await;

    Ok(())
}
