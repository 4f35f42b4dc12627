//! # plantpulse-source
//!
//! The industrial-source side of the gateway:
//! - The [`PlantSource`] collaborator trait the gateway reads through
//! - The polling engine with reconnect/backoff lifecycle
//! - A simulated source for demo mode and tests

pub mod poller;
pub mod simulator;
pub mod source;

pub use poller::{PollerConfig, PollerHandle, PollerState, SourcePoller};
pub use simulator::SimulatedSource;
pub use source::{PlantSource, SourceError};
