//! netlag-monitor — the monitoring orchestration loop.
//!
//! Decides which peers are being probed, runs exactly one probe task per
//! peer, restarts tasks after probe failures, and reconciles the active
//! set against a refreshed topology.
//!
//! # Architecture
//!
//! ```text
//! Supervisor
//!   ├── Topology::list_peers() on start, every refresh tick, and on failure
//!   ├── ActiveSet (address → claim), shared with every task
//!   ├── JoinSet of node monitor tasks
//!   │   └── run_node_monitor()
//!   │       ├── claim peer (duplicate → exit)
//!   │       ├── every probe interval: LatencyProbe → LatencySink
//!   │       └── on probe error: release claim, send address on failure channel
//!   └── watch shutdown broadcast → grace period → abort stragglers
//! ```
//!
//! # Recovery
//!
//! A probe failure ends the task. The supervisor re-lists the topology and
//! starts a replacement only if the peer is still in the cluster. The
//! replacement waits one probe interval before its first probe, so an
//! unreachable peer is retried at most once per interval.

pub mod error;
pub mod registry;
pub mod supervisor;
pub mod task;

pub use error::MonitorError;
pub use registry::{ActiveSet, Claim};
pub use supervisor::{RunSummary, SelfIdentity, Supervisor, SupervisorConfig, SupervisorState};
pub use task::{MonitorContext, MonitorExit, run_node_monitor};
