//! Broadcast router
//!
//! Parses each inbound text frame and decides who receives what: clipboard
//! peers get the payload verbatim, viewers get it re-tagged as a log entry,
//! unregistered connections and the sender get nothing.

use std::sync::Arc;

use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use super::protocol::{ClientMessage, Role, ServerMessage};
use super::registry::{ConnectionId, ConnectionRegistry, OutboundSender};

/// What the router did with one inbound message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Payload could not be parsed; dropped without reply
    Discarded,
    /// Sender declared a role
    Registered(Role),
    /// Clipboard payload fanned out to `delivered` peers
    Broadcast { delivered: usize },
    /// Unrecognized message type
    Ignored,
}

/// Routes inbound messages to the other connections by role
#[derive(Clone, Default)]
pub struct BroadcastRouter {
    registry: Arc<ConnectionRegistry>,
}

impl BroadcastRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Track a newly accepted connection
    pub async fn connect(&self, id: ConnectionId, outbound: OutboundSender) {
        self.registry.attach(id, outbound).await;
    }

    /// Forget a closed connection
    pub async fn disconnect(&self, id: ConnectionId) {
        if self.registry.remove(id).await {
            debug!("Removed connection {} from registry", id);
        }
    }

    /// Handle one inbound text frame from `sender`
    pub async fn dispatch(&self, sender: ConnectionId, text: &str) -> Dispatch {
        let message = match ClientMessage::from_json(text) {
            Ok(message) => message,
            Err(e) => {
                debug!("Discarding malformed message from {}: {}", sender, e);
                return Dispatch::Discarded;
            }
        };

        match message {
            ClientMessage::Register { role } => {
                self.registry.register(sender, role).await;
                Dispatch::Registered(role)
            }
            ClientMessage::Clipboard { data } => {
                let delivered = self.broadcast(sender, &data).await;
                Dispatch::Broadcast { delivered }
            }
            ClientMessage::Unknown => {
                debug!("Ignoring message with unknown type from {}", sender);
                Dispatch::Ignored
            }
        }
    }

    /// Fan `data` out to every registered, open peer except `sender`
    ///
    /// Returns the number of peers the message was queued for. A peer whose
    /// queue is closed or full is skipped without affecting the rest.
    pub async fn broadcast(&self, sender: ConnectionId, data: &str) -> usize {
        let peers = self.registry.all_connections().await;

        if !peers.iter().any(|p| p.id == sender && p.role.is_some()) {
            debug!("Unregistered connection {} is broadcasting", sender);
        }

        let mut delivered = 0;
        for peer in peers {
            if peer.id == sender || !peer.is_open() {
                continue;
            }
            let Some(role) = peer.role else {
                continue;
            };

            match peer.outbound.try_send(ServerMessage::for_role(role, data)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    debug!("Dropping update for {}: outbound queue full", peer.id)
                }
                Err(TrySendError::Closed(_)) => trace!("Skipping closed connection {}", peer.id),
            }
        }

        debug!(
            "Clipboard update from {} delivered to {} peers",
            sender, delivered
        );
        delivered
    }
}
