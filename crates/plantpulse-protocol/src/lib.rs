//! # plantpulse-protocol
//!
//! PlantPulse wire message types and codec.
//!
//! This crate defines the WebSocket and REST API message formats.

pub mod codec;
pub mod messages;

pub use codec::{decode_client_message, encode_server_message, CodecError};
pub use messages::*;
