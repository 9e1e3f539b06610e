//! Clipboard relay
//!
//! Relays clipboard updates between `clipboard` peers and mirrors them as log
//! entries to `viewer` peers over WebSocket.

pub mod server;
