//! WebSocket frame types and serialization
//!
//! Defines the closed set of client-to-server and server-to-client frames with
//! type-safe serde serialization. Inbound frames are decoded into a tagged
//! union, so a frame with an unknown discriminator or a malformed shape is
//! rejected by the decoder instead of falling through an ad hoc dispatch path.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use deskrelay_shared::Message;

// =============================================================================
// Client-to-Server Frames
// =============================================================================

/// Frames sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Bind (or rebind) a human-readable sender identity to this connection
    Identify {
        user_name: String,
        #[serde(default)]
        user_email: Option<String>,
    },

    /// New chat content for this connection's ticket
    NewMessage { content: String },

    /// Application-level liveness probe
    Ping,
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Frames sent from server to client
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Connection acknowledged
    ConnectionEstablished {
        session_id: Uuid,
        ticket_id: String,
    },

    /// Current message list, sent once on connect
    MessageHistory {
        ticket_id: String,
        messages: Vec<Message>,
        count: usize,
    },

    /// New message added to the ticket
    NewMessage {
        ticket_id: String,
        message: Message,
    },

    /// Liveness response
    Pong,

    /// Structured error reply, scoped to one connection
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_frame_deserialization() {
        let json = r#"{"type":"new_message","content":"hola"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::NewMessage { content } => assert_eq!(content, "hola"),
            _ => panic!("Expected NewMessage frame"),
        }
    }

    #[test]
    fn test_identify_without_email() {
        let json = r#"{"type":"identify","user_name":"Ada"}"#;
        let frame: ClientFrame = serde_json::from_str(json).unwrap();
        match frame {
            ClientFrame::Identify {
                user_name,
                user_email,
            } => {
                assert_eq!(user_name, "Ada");
                assert!(user_email.is_none());
            }
            _ => panic!("Expected Identify frame"),
        }
    }

    #[test]
    fn test_unknown_frame_kind_is_rejected() {
        let json = r#"{"type":"typing_start","ticket_id":"TICKET-1"}"#;
        assert!(serde_json::from_str::<ClientFrame>(json).is_err());
    }

    #[test]
    fn test_server_frame_serialization() {
        let frame = ServerFrame::Pong;
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_error_frame_serialization() {
        let frame = ServerFrame::Error {
            message: "Invalid frame format".to_string(),
        };
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains("error"));
        assert!(json.contains("Invalid frame format"));
    }
}
