//! The industrial data source collaborator.
//!
//! The gateway never speaks the industrial wire protocol itself; it reads
//! tag values through this trait. Production deployments implement it over
//! an OPC-UA client session; tests and demo mode use the simulator.

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a [`PlantSource`].
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    /// The source endpoint cannot be reached or the session dropped.
    /// Transient: the poller retries with backoff.
    #[error("source unavailable: {0}")]
    Unavailable(String),

    /// A single address could not be read on an otherwise live session.
    #[error("read of {address} failed: {message}")]
    Read { address: String, message: String },
}

/// A live connection to the industrial automation endpoint.
///
/// `read` takes the protocol-specific node address resolved from the tag
/// registry (e.g., "ns=2;i=21"). Implementations own their session state;
/// the poller calls `connect` again after any failure before resuming reads.
#[async_trait]
pub trait PlantSource: Send {
    /// Short identifier for log lines.
    fn name(&self) -> &str;

    /// Establish (or re-establish) the session with the source endpoint.
    async fn connect(&mut self) -> Result<(), SourceError>;

    /// Read the current value at a node address.
    async fn read(&mut self, address: &str) -> Result<f64, SourceError>;
}
