//! Error types for topology discovery.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while listing cluster nodes.
#[derive(Debug, Error)]
pub enum TopologyError {
    #[error("failed to read node list {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse node list {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid peer entry: {0}")]
    InvalidPeer(String),

    #[error("node listing unavailable: {0}")]
    Unavailable(String),

    #[error("kubernetes API request failed: {0}")]
    Kube(#[from] kube::Error),
}
