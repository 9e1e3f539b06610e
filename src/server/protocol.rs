//! Protocol message definitions
//!
//! Defines the JSON messages exchanged between relay peers and the server.
//! Every message is an object tagged by its `type` field.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Protocol-related errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("JSON serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// Result type for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

// ============================================================================
// Roles
// ============================================================================

/// Behavioral category a peer declares when it registers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Sends and receives raw clipboard payloads
    Clipboard,
    /// Only receives log entries describing clipboard activity
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Clipboard => f.write_str("clipboard"),
            Role::Viewer => f.write_str("viewer"),
        }
    }
}

// ============================================================================
// Client Messages
// ============================================================================

/// Messages sent from a peer to the server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Declare (or re-declare) the sender's role
    Register {
        role: Role,
    },

    /// New clipboard content to fan out
    Clipboard {
        /// Opaque payload, never inspected by the relay
        data: String,
    },

    /// Any other `type` value
    #[serde(other)]
    Unknown,
}

impl ClientMessage {
    /// Parse a client message from a text frame
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize the message to JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Create a Register message
    pub fn register(role: Role) -> Self {
        ClientMessage::Register { role }
    }

    /// Create a Clipboard message
    pub fn clipboard(data: impl Into<String>) -> Self {
        ClientMessage::Clipboard { data: data.into() }
    }
}

// ============================================================================
// Server Messages
// ============================================================================

/// Messages sent from the server to a peer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Clipboard content from another peer, delivered to clipboard peers
    Clipboard { data: String },

    /// The same content re-tagged for viewers
    Log { data: String },
}

impl ServerMessage {
    /// Build the outbound message a peer with `role` should receive for `data`
    pub fn for_role(role: Role, data: &str) -> Self {
        match role {
            Role::Clipboard => ServerMessage::Clipboard {
                data: data.to_owned(),
            },
            Role::Viewer => ServerMessage::Log {
                data: data.to_owned(),
            },
        }
    }

    /// Serialize the message to JSON
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a server message from JSON (primarily for testing)
    pub fn from_json(json: &str) -> ProtocolResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_register() {
        let msg = ClientMessage::from_json(r#"{"type":"register","role":"viewer"}"#).unwrap();
        assert_eq!(msg, ClientMessage::register(Role::Viewer));
    }

    #[test]
    fn test_parse_clipboard() {
        let msg = ClientMessage::from_json(r#"{"type":"clipboard","data":"hello"}"#).unwrap();
        assert_eq!(msg, ClientMessage::clipboard("hello"));
    }

    #[test]
    fn test_unknown_type_is_unknown_variant() {
        let msg = ClientMessage::from_json(r#"{"type":"ping","seq":1}"#).unwrap();
        assert_eq!(msg, ClientMessage::Unknown);
    }

    #[test]
    fn test_unknown_role_rejected() {
        let result = ClientMessage::from_json(r#"{"type":"register","role":"admin"}"#);
        assert!(matches!(result, Err(ProtocolError::SerializationError(_))));
    }

    #[test]
    fn test_missing_type_rejected() {
        assert!(ClientMessage::from_json(r#"{"data":"hello"}"#).is_err());
    }

    #[test]
    fn test_clipboard_without_data_rejected() {
        assert!(ClientMessage::from_json(r#"{"type":"clipboard"}"#).is_err());
    }

    #[test]
    fn test_non_json_rejected() {
        assert!(ClientMessage::from_json("not json at all").is_err());
    }

    #[test]
    fn test_register_serialization() {
        let json = ClientMessage::register(Role::Clipboard).to_json().unwrap();
        assert!(json.contains("\"type\":\"register\""));
        assert!(json.contains("\"role\":\"clipboard\""));
    }

    #[test]
    fn test_for_role_clipboard() {
        let msg = ServerMessage::for_role(Role::Clipboard, "abc");
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"clipboard","data":"abc"}"#);
    }

    #[test]
    fn test_for_role_viewer() {
        let msg = ServerMessage::for_role(Role::Viewer, "abc");
        assert_eq!(msg.to_json().unwrap(), r#"{"type":"log","data":"abc"}"#);
    }

    #[test]
    fn test_payload_passes_through_unchanged() {
        let data = "line one\nline \"two\"\t\u{1F4CB}";
        let json = ServerMessage::for_role(Role::Clipboard, data).to_json().unwrap();
        let parsed = ServerMessage::from_json(&json).unwrap();
        assert_eq!(
            parsed,
            ServerMessage::Clipboard {
                data: data.to_string()
            }
        );
    }

    #[test]
    fn test_role_display() {
        assert_eq!(Role::Clipboard.to_string(), "clipboard");
        assert_eq!(Role::Viewer.to_string(), "viewer");
    }
}
