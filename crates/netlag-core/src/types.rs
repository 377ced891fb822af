//! Domain types for netlag.
//!
//! Peer identity is the network address. Names are informational and
//! only used for labelling logs and metrics.

use serde::{Deserialize, Serialize};

/// Network address of a node (an IP address in practice).
pub type Address = String;

// ── Nodes ─────────────────────────────────────────────────────────

/// A remote cluster member that the local node probes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct PeerNode {
    pub name: String,
    pub address: Address,
}

impl PeerNode {
    pub fn new(name: impl Into<String>, address: impl Into<Address>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }
}

/// The local node. Resolved once at startup and never changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SelfNode {
    pub name: String,
    pub address: Address,
}

impl SelfNode {
    pub fn new(name: impl Into<String>, address: impl Into<Address>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Whether `peer` is actually this node.
    pub fn is(&self, peer: &PeerNode) -> bool {
        self.address == peer.address
    }
}

// ── Latency ───────────────────────────────────────────────────────

/// Result of one round-trip probe. All values are milliseconds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct LatencyStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl LatencyStats {
    /// Build stats from raw probe values, rejecting negatives and NaN.
    pub fn new(min: f64, max: f64, mean: f64) -> Option<Self> {
        let valid = |v: f64| v.is_finite() && v >= 0.0;
        if valid(min) && valid(max) && valid(mean) {
            Some(Self { min, max, mean })
        } else {
            None
        }
    }
}

/// One observation of latency from the local node to a peer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LatencyMeasurement {
    pub from_name: String,
    pub from_address: Address,
    pub to_name: String,
    pub to_address: Address,
    /// Minimum round-trip latency in milliseconds.
    pub min: f64,
    /// Maximum round-trip latency in milliseconds.
    pub max: f64,
    /// Mean round-trip latency in milliseconds.
    pub mean: f64,
}

impl LatencyMeasurement {
    /// Combine identities and probe stats into a measurement.
    pub fn between(from: &SelfNode, to: &PeerNode, stats: LatencyStats) -> Self {
        Self {
            from_name: from.name.clone(),
            from_address: from.address.clone(),
            to_name: to.name.clone(),
            to_address: to.address.clone(),
            min: stats.min,
            max: stats.max,
            mean: stats.mean,
        }
    }

    /// Gauge key: last write wins per key.
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey {
            from_name: self.from_name.clone(),
            from_address: self.from_address.clone(),
            to_name: self.to_name.clone(),
            to_address: self.to_address.clone(),
        }
    }
}

/// Identity of one latency series: (source, destination).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    pub from_name: String,
    pub from_address: Address,
    pub to_name: String,
    pub to_address: Address,
}
