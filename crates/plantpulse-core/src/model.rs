//! PlantPulse data model types.
//!
//! These types represent the core telemetry structures:
//! - Tags (named process variables with a protocol address)
//! - TagUpdate messages emitted by the polling engine
//! - Expected value ranges for validation and simulation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A named process variable read from the industrial data source.
///
/// Tags are loaded into the registry at startup and are immutable for the
/// lifetime of the process. Changing the tag topology requires a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Human-readable tag name, unique within the registry
    /// (e.g., "KILN_FEED_END_TEMP").
    pub name: String,

    /// Protocol-specific node address on the source
    /// (e.g., "ns=2;i=21" for an OPC-UA node).
    pub address: String,

    /// Display unit string (e.g., "°C", "t/h").
    pub unit: String,

    /// Expected numeric range, used for validation warnings and by the
    /// simulated source.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<ValueRange>,
}

impl Tag {
    /// Create a tag without an expected range.
    pub fn new(
        name: impl Into<String>,
        address: impl Into<String>,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            unit: unit.into(),
            range: None,
        }
    }

    /// Attach an expected value range.
    pub fn with_range(mut self, low: f64, high: f64) -> Self {
        self.range = Some(ValueRange { low, high });
        self
    }
}

/// Inclusive expected range for a tag's values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub low: f64,
    pub high: f64,
}

impl ValueRange {
    /// Check whether a value falls inside the range.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.low && value <= self.high
    }
}

/// A single observed value for a tag.
///
/// Emitted by the polling engine once per tag per poll round. Each update
/// supersedes the previous one for the same tag; the gateway keeps no
/// history beyond the last known value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagUpdate {
    /// Name of the tag this value belongs to. Must exist in the registry.
    pub tag: String,

    /// The observed value.
    pub value: f64,

    /// When the value was read from the source (UTC).
    pub timestamp: DateTime<Utc>,
}

impl TagUpdate {
    /// Create an update stamped with the current time.
    pub fn now(tag: impl Into<String>, value: f64) -> Self {
        Self {
            tag: tag.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}

/// Format a timestamp the way frames carry it: RFC 3339 with milliseconds.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
