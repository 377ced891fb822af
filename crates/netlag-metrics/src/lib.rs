//! netlag-metrics — where latency measurements end up.
//!
//! # Architecture
//!
//! ```text
//! LatencySink (trait)
//!   └── LatencyGauges
//!         ├── publish() ← one call per successful probe
//!         └── samples() → current gauge values
//!
//! Prometheus exposition
//!   ├── render_prometheus() → text/plain
//!   └── metrics_router() → GET /metrics
//! ```
//!
//! Gauges are keyed by `(from_node, from_ip, to_node, to_ip)` and the
//! last write wins.

pub mod gauges;
pub mod prometheus;
pub mod server;

pub use gauges::{LatencyGauges, LatencySink};
pub use prometheus::render_prometheus;
pub use server::{METRICS_PATH, metrics_router, serve};
