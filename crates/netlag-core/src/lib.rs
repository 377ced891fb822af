//! netlag-core — shared domain types for netlag.
//!
//! Every other crate in the workspace speaks in terms of these types:
//! the topology adapter produces [`PeerNode`]s, the probe adapter produces
//! [`LatencyStats`], and the monitor turns both into a
//! [`LatencyMeasurement`] for the metrics sink.

pub mod types;

pub use types::*;
