//! Wire protocol for the matchmaking WebSocket
//!
//! JSON objects with a `type` discriminator.
//!
//! Inbound:
//! - `{"type":"match-request","criterias":[...]}`
//! - `{"type":"match-ack","response":"accept"|"reject"}`
//! - `{"type":"match-cancel"}`
//!
//! Unknown fields are ignored; in particular a client-supplied `time` on a
//! match request has no effect, submission time is stamped server-side.

use serde::{Deserialize, Serialize};
use types::criterion::Criterion;
use types::ids::{SessionId, UserId};

/// Handshake answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckResponse {
    Accept,
    Reject,
}

/// Messages sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "match-request")]
    MatchRequest { criterias: Vec<Criterion> },

    #[serde(rename = "match-ack")]
    MatchAck { response: AckResponse },

    #[serde(rename = "match-cancel")]
    MatchCancel,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Submission stored, search started
    RequestQueued,

    MatchFound { criteria: Criterion },

    MatchTimeout { reason: String },

    MatchRejected { reason: String },

    SessionCreated {
        #[serde(rename = "sessionId")]
        session_id: SessionId,
        partner: UserId,
    },

    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    /// Serialize to the JSON text frame payload
    pub fn to_json(&self) -> String {
        // Serializing these plain enums cannot fail
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error","message":"encoding failure"}"#.to_string())
    }
}

/// Parse a raw text frame into a ClientMessage
pub fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    serde_json::from_str(text)
}
