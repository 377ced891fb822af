//! netlag-probe — latency probes for netlag.
//!
//! Wraps the `netperf` toolchain: [`Netperf`] runs one TCP request/response
//! test against a peer and reports min/max/mean latency, and
//! [`ProbeServer`] keeps the local `netserver` running so peers can probe
//! this node in turn.
//!
//! # Architecture
//!
//! ```text
//! LatencyProbe (trait)
//!   └── Netperf
//!         ├── netperf -H <addr> -p <port> -t TCP_RR -- -o min,max,mean
//!         ├── timeout (default 30s), child killed on expiry
//!         └── parse_latency() → LatencyStats (ms)
//!
//! ProbeServer
//!   └── netserver -D -p <port>, retried with RetryPolicy (5 × 2s)
//! ```

pub mod error;
pub mod netperf;
pub mod server;

pub use error::ProbeError;
pub use netperf::{LatencyProbe, Netperf, parse_latency};
pub use server::{ProbeServer, RetryPolicy};
