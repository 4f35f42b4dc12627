//! # plantpulse-server
//!
//! The gateway itself:
//! - [`SessionAuthenticator`] - login, token issue/validation, revocation
//! - [`BroadcastHub`] - fan-out of tag updates to authenticated sessions,
//!   snapshot-on-subscribe, per-session failure isolation
//! - [`GatewayServer`] - the HTTP/WebSocket surface wiring it all together

pub mod auth;
pub mod hub;
pub mod server;

pub use auth::{AuthError, CredentialStore, SessionAuthenticator, SessionToken,
    StaticCredentialStore};
pub use hub::{BroadcastHub, FrameSender, Session};
pub use server::{AppState, GatewayServer};
