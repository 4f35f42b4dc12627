//! Protocol message types for the gateway's HTTP and WebSocket surface.
//!
//! This module defines all message types exchanged with dashboard clients:
//! - Server → Client: tag update frames, the post-subscribe snapshot,
//!   explicit error frames
//! - Client → Server: the authentication frame (first frame on the channel)
//! - REST bodies for `/login` and `/logout`
//!
//! Messages are serialized as JSON over WebSocket text frames.

use plantpulse_core::{format_timestamp, TagUpdate};
use serde::{Deserialize, Serialize};

/// Error codes carried by [`ErrorFrame`] and [`ApiError`].
pub mod error_codes {
    /// Login rejected. Deliberately generic: the server never distinguishes
    /// an unknown user from a wrong secret.
    pub const INVALID_CREDENTIALS: &str = "invalid_credentials";

    /// The presented session token was never issued.
    pub const INVALID_TOKEN: &str = "invalid_token";

    /// The presented session token has outlived its lifetime; re-login.
    pub const TOKEN_EXPIRED: &str = "token_expired";

    /// The first frame on the push channel was not a valid auth frame.
    pub const AUTH_REQUIRED: &str = "auth_required";
}

// ============================================================================
// REST bodies
// ============================================================================

/// `POST /login` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub secret: String,
}

/// `POST /login` success response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

/// `POST /logout` request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogoutRequest {
    pub token: String,
}

/// Error response body for REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
}

// ============================================================================
// Client → Server frames
// ============================================================================

/// Authentication frame: must be the first frame a client sends on the push
/// channel. Anything else gets an [`ErrorFrame`] and the connection closed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRequest {
    pub token: String,
}

/// Frames that can be received from a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClientMessage {
    /// Token presentation; honored only as the first frame.
    Auth(AuthRequest),
}

// ============================================================================
// Server → Client frames
// ============================================================================

/// A single live tag value pushed to a subscribed session.
///
/// # Example
/// ```json
/// {"tag": "KILN_FEED_END_TEMP", "value": 101.2, "unit": "°C",
///  "timestamp": "2024-01-17T10:30:00.000Z"}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagFrame {
    /// Registered tag name.
    pub tag: String,

    /// The observed value.
    pub value: f64,

    /// Display unit from the registry.
    pub unit: String,

    /// When the value was read, RFC 3339 with milliseconds.
    pub timestamp: String,

    /// Set once the value's age exceeds the staleness threshold.
    #[serde(default, skip_serializing_if = "is_false")]
    pub stale: bool,
}

impl TagFrame {
    /// Build a frame from a poller update plus registry metadata.
    pub fn from_update(update: &TagUpdate, unit: impl Into<String>, stale: bool) -> Self {
        Self {
            tag: update.tag.clone(),
            value: update.value,
            unit: unit.into(),
            timestamp: format_timestamp(update.timestamp),
            stale,
        }
    }
}

/// One tag's last-known state inside a snapshot.
///
/// `value` and `timestamp` are `null` for a tag that has never been polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub tag: String,
    pub value: Option<f64>,
    pub unit: String,
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub stale: bool,
}

/// Full snapshot of every registered tag's last-known value, sent as the
/// first frame after a successful subscribe so dashboards never start blank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotFrame {
    pub snapshot: Vec<SnapshotEntry>,
}

/// Explicit error frame. The server sends this before closing a connection
/// it cannot serve; connections are never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorFrame {
    pub error: String,
    pub message: String,
}

impl ErrorFrame {
    /// Create an error frame with the given code and human-readable message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: code.into(),
            message: message.into(),
        }
    }
}

/// Frames that can be sent from server to client.
///
/// Uses untagged serialization - the frame type is determined by which
/// fields are present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    /// Auth or protocol failure, followed by connection close.
    Error(ErrorFrame),

    /// Last-known values of all tags, first frame after subscribe.
    Snapshot(SnapshotFrame),

    /// Live tag update.
    Update(TagFrame),
}

fn is_false(value: &bool) -> bool {
    !*value
}
