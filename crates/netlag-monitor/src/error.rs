//! Error types for the monitoring supervisor.

use thiserror::Error;

use netlag_topology::TopologyError;

/// Fatal conditions raised while the supervisor starts.
///
/// Once running, discovery and probe errors are logged and absorbed.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("could not resolve the name of the local node at {address}")]
    SelfUnresolved { address: String },

    #[error("no target nodes found")]
    NoPeers,

    #[error("initial topology listing failed: {0}")]
    Topology(#[from] TopologyError),
}
