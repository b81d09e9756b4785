use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use uscreen::config::{ServerOptions, DEFAULT_SOCKET_PATH};
use uscreen::screen::UsbScreen;
use uscreen::server::{bind_socket, FrameServer};

/// Drives a small USB screen: receives raw BGR frames from local
/// producers over a unix socket, palette-compresses them, and writes the
/// packed result to the device.
#[derive(Parser)]
struct Args {
    /// Serial device of the screen
    #[arg(short, long)]
    device: PathBuf,
    /// Socket to listen on for frame producers
    #[arg(short, long, default_value = DEFAULT_SOCKET_PATH)]
    socket: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let screen = UsbScreen::open(&args.device)
        .with_context(|| format!("failed to open screen device {}", args.device.display()))?;
    let listener = bind_socket(&args.socket)
        .with_context(|| format!("failed to bind socket {}", args.socket.display()))?;
    info!(socket = %args.socket.display(), "listening for producers");

    let server = FrameServer::new(ServerOptions::default(), screen)?;
    server.run(listener).await?;
    Ok(())
}
