//! Simulated industrial source.
//!
//! Produces uniformly distributed values inside each tag's configured range,
//! the way the plant's demo rig behaves when no OPC-UA endpoint is
//! reachable. Simulation lives behind the [`PlantSource`] trait so the core
//! never knows whether it is talking to real iron.

use std::collections::HashMap;

use async_trait::async_trait;
use plantpulse_core::{TagRegistry, ValueRange};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::source::{PlantSource, SourceError};

/// Range used for addresses registered without an expected range.
const DEFAULT_RANGE: ValueRange = ValueRange { low: 0.0, high: 100.0 };

/// A [`PlantSource`] that fabricates in-range readings.
pub struct SimulatedSource {
    ranges: HashMap<String, ValueRange>,
    rng: StdRng,
    connected: bool,
}

impl SimulatedSource {
    /// Build a simulator covering every address in the registry.
    pub fn from_registry(registry: &TagRegistry) -> Self {
        let ranges = registry
            .all()
            .iter()
            .map(|tag| (tag.address.clone(), tag.range.unwrap_or(DEFAULT_RANGE)))
            .collect();

        Self {
            ranges,
            rng: StdRng::from_entropy(),
            connected: false,
        }
    }
}

#[async_trait]
impl PlantSource for SimulatedSource {
    fn name(&self) -> &str {
        "simulator"
    }

    async fn connect(&mut self) -> Result<(), SourceError> {
        if !self.connected {
            info!("running in simulation mode");
            self.connected = true;
        }
        Ok(())
    }

    async fn read(&mut self, address: &str) -> Result<f64, SourceError> {
        let range = self.ranges.get(address).ok_or_else(|| SourceError::Read {
            address: address.to_string(),
            message: "address not simulated".to_string(),
        })?;

        let value = self.rng.gen_range(range.low..=range.high);
        // Two decimals, matching what panel instruments display
        Ok((value * 100.0).round() / 100.0)
    }
}
