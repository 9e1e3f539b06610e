//! clip-relay binary
//!
//! Parses the listen address, sets up logging and runs the relay until
//! SIGINT or SIGTERM.

use std::sync::Arc;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use clip_relay::server::{ServerConfig, WebSocketServer};

/// Relays clipboard updates to clipboard peers and log viewers over WebSocket
#[derive(Parser, Debug)]
#[command(name = "clip-relay")]
#[command(version, about, long_about = None)]
struct Args {
    /// Listening port shared by WebSocket peers and the log page
    #[arg(short, long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Log every dispatched message (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,

    /// Interface to listen on
    #[arg(long, env = "BIND", default_value = "0.0.0.0")]
    bind: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // RUST_LOG wins over --verbose when set
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("clip-relay v{}", env!("CARGO_PKG_VERSION"));

    let server = Arc::new(WebSocketServer::new(ServerConfig::new(args.bind, args.port)));
    let server_handle = Arc::clone(&server);

    tokio::spawn(async move {
        match stop_requested().await {
            Ok(name) => info!("{} received, stopping relay", name),
            Err(e) => {
                error!("Cannot listen for shutdown signals: {}", e);
                return;
            }
        }
        server_handle.shutdown();
    });

    server.run().await?;

    info!("Relay stopped");
    Ok(())
}

/// Resolves with the signal name once the process is asked to stop
async fn stop_requested() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|()| "Ctrl+C")
    }
}
