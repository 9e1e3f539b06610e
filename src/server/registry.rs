//! Connection registry
//!
//! Tracks every open relay connection together with the role it declared.
//! Connections are attached unregistered when accepted, gain a role on
//! `register`, and are removed when their socket closes.

use std::collections::HashMap;
use std::fmt;

use tokio::sync::{mpsc, RwLock};
use tracing::debug;
use uuid::Uuid;

use super::protocol::{Role, ServerMessage};

/// Messages a peer may have waiting before new ones are dropped for it
pub const OUTBOUND_CAPACITY: usize = 256;

/// Queue feeding a connection's socket writer
pub type OutboundSender = mpsc::Sender<ServerMessage>;

/// Receiving end drained by a connection's socket writer
pub type OutboundReceiver = mpsc::Receiver<ServerMessage>;

/// Create the bounded queue for one connection
pub fn outbound_channel() -> (OutboundSender, OutboundReceiver) {
    mpsc::channel(OUTBOUND_CAPACITY)
}

/// Stable identity of a connection for its whole lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Allocate a fresh connection identity
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct Entry {
    role: Option<Role>,
    outbound: OutboundSender,
}

/// Point-in-time view of one connection, taken for fanout
#[derive(Debug, Clone)]
pub struct PeerSnapshot {
    pub id: ConnectionId,
    pub role: Option<Role>,
    pub outbound: OutboundSender,
}

impl PeerSnapshot {
    /// Whether the connection's writer is still draining its queue
    pub fn is_open(&self) -> bool {
        !self.outbound.is_closed()
    }
}

/// Live mapping of connection -> role
#[derive(Default)]
pub struct ConnectionRegistry {
    entries: RwLock<HashMap<ConnectionId, Entry>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a newly accepted connection as open and unregistered
    pub async fn attach(&self, id: ConnectionId, outbound: OutboundSender) {
        let mut entries = self.entries.write().await;
        entries.insert(id, Entry { role: None, outbound });
    }

    /// Set or overwrite the role of an attached connection
    ///
    /// Returns the previous role. Connections that are not attached (already
    /// closed) are left alone and `None` is returned.
    pub async fn register(&self, id: ConnectionId, role: Role) -> Option<Role> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(&id) {
            Some(entry) => entry.role.replace(role),
            None => {
                debug!("Ignoring registration for detached connection {}", id);
                None
            }
        }
    }

    /// Role currently associated with `id`, if any
    pub async fn lookup(&self, id: ConnectionId) -> Option<Role> {
        self.entries.read().await.get(&id).and_then(|e| e.role)
    }

    /// Drop the connection. Removing an absent connection is a no-op.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        self.entries.write().await.remove(&id).is_some()
    }

    /// Snapshot every attached connection, registered or not
    ///
    /// The lock is released before this returns so callers can deliver
    /// without blocking registration or removal.
    pub async fn all_connections(&self) -> Vec<PeerSnapshot> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .map(|(id, entry)| PeerSnapshot {
                id: *id,
                role: entry.role,
                outbound: entry.outbound.clone(),
            })
            .collect()
    }

    /// Number of attached connections
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Number of connections that have declared a role
    pub async fn registered_len(&self) -> usize {
        self.entries
            .read()
            .await
            .values()
            .filter(|e| e.role.is_some())
            .count()
    }
}
