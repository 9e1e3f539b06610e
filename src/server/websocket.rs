//! WebSocket server implementation
//!
//! Listens on a single port, hands WebSocket upgrades to the relay and plain
//! HTTP requests to the display page.

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, trace, warn};

use super::page::{self, RequestKind};
use super::registry::{outbound_channel, ConnectionId};
use super::router::{BroadcastRouter, Dispatch};

/// Configuration for the WebSocket server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(bind: String, port: u16) -> Self {
        Self { bind, port }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Clipboard relay server
pub struct WebSocketServer {
    config: ServerConfig,
    router: BroadcastRouter,
    shutdown_tx: broadcast::Sender<()>,
}

impl WebSocketServer {
    /// Create a new WebSocket server
    pub fn new(config: ServerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            router: BroadcastRouter::new(),
            shutdown_tx,
        }
    }

    /// Router shared by every connection of this server
    pub fn router(&self) -> &BroadcastRouter {
        &self.router
    }

    /// Trigger server shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> anyhow::Result<()> {
        let addr = self.config.socket_addr();
        let listener = TcpListener::bind(&addr).await?;
        info!("Server running at http://{}", listener.local_addr()?);
        self.serve(listener).await
    }

    /// Accept connections from an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            tokio::select! {
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let router = self.router.clone();
                            let shutdown_rx = self.shutdown_tx.subscribe();

                            tokio::spawn(async move {
                                if let Err(e) = handle_stream(stream, peer_addr, router, shutdown_rx).await {
                                    error!("Connection error from {}: {}", peer_addr, e);
                                }
                            });
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            }
        }

        let open = self.router.registry().len().await;
        if open > 0 {
            info!("Closing {} open connections", open);
        }

        Ok(())
    }
}

/// Route an accepted TCP stream to the display page or the relay
async fn handle_stream(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: BroadcastRouter,
    shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    match page::classify(&stream).await? {
        RequestKind::WebSocket => {
            handle_connection(stream, peer_addr, router, shutdown_rx).await
        }
        RequestKind::Page => {
            debug!("Serving display page to {}", peer_addr);
            page::serve_display_page(stream).await?;
            Ok(())
        }
        RequestKind::Closed => {
            trace!("{} closed before sending a request", peer_addr);
            Ok(())
        }
        RequestKind::Rejected => {
            debug!("Dropping {}: no usable request head", peer_addr);
            Ok(())
        }
    }
}

/// Handle a single relay connection
///
/// The connection is attached to the registry for as long as this runs and
/// removed on every exit path.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    router: BroadcastRouter,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream).await?;
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let id = ConnectionId::new();
    let (outbound_tx, mut outbound_rx) = outbound_channel();
    router.connect(id, outbound_tx).await;
    info!("New connection {} from {}", id, peer_addr);

    // Drains this connection's queue so fanout never waits on the socket
    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let json = match message.to_json() {
                Ok(json) => json,
                Err(e) => {
                    error!("Failed to encode message for {}: {}", id, e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(Message::Text(json)).await {
                debug!("Write to {} failed: {}", id, e);
                break;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    loop {
        tokio::select! {
            msg = ws_receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        debug!("Received message from {}: {}", id, text);
                        dispatch(&router, id, &text).await;
                    }
                    Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                        Ok(text) => {
                            debug!("Received binary message from {}: {}", id, text);
                            dispatch(&router, id, text).await;
                        }
                        Err(_) => {
                            warn!("Discarding non-UTF-8 binary message from {} ({} bytes)", id, data.len());
                        }
                    },
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        // tungstenite answers pings itself
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("Client {} requested close", id);
                        break;
                    }
                    Some(Ok(Message::Frame(_))) => {}
                    Some(Err(e)) => {
                        error!("WebSocket error from {}: {}", id, e);
                        break;
                    }
                    None => {
                        break;
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, closing connection {}", id);
                break;
            }
        }
    }

    // Removing the entry drops the registry's sender; the writer then
    // flushes what is queued, sends Close and exits.
    router.disconnect(id).await;
    let _ = writer.await;

    info!("Client {} disconnected", id);
    Ok(())
}

async fn dispatch(router: &BroadcastRouter, id: ConnectionId, text: &str) {
    if let Dispatch::Registered(role) = router.dispatch(id, text).await {
        info!("Client {} registered as {}", id, role);
    }
}
