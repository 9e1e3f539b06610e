//! WebSocket relay server
//!
//! Accepts peer connections, tracks their declared roles and fans clipboard
//! updates out to the other peers.

mod page;
mod protocol;
mod registry;
mod router;
mod websocket;

pub use protocol::*;
pub use registry::*;
pub use router::*;
pub use websocket::*;
