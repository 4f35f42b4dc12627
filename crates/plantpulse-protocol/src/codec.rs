//! WebSocket message codec for the gateway protocol.
//!
//! The gateway uses JSON messages over WebSocket text frames. This module
//! provides encoding and decoding utilities for the protocol messages.

use crate::messages::{ClientMessage, ServerMessage};
use thiserror::Error;

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// JSON serialization failed.
    #[error("failed to serialize message: {0}")]
    Serialize(serde_json::Error),

    /// The client sent text that is not a recognized frame.
    #[error("malformed client frame: {0}")]
    Malformed(serde_json::Error),

    /// Received binary frame instead of text.
    #[error("expected text frame, received binary")]
    BinaryFrame,
}

/// Encode a server message to a JSON string for WebSocket transmission.
pub fn encode_server_message(msg: &ServerMessage) -> Result<String, CodecError> {
    serde_json::to_string(msg).map_err(CodecError::Serialize)
}

/// Decode a client message from a JSON string received over WebSocket.
pub fn decode_client_message(text: &str) -> Result<ClientMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Malformed)
}
