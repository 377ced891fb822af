//! Error types for the probe adapter.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by latency probes and the probe server.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe against {target} timed out after {after:?}")]
    Timeout { target: String, after: Duration },

    #[error("probe execution failed: {0}")]
    Execution(String),

    #[error("malformed probe output: {0}")]
    MalformedOutput(String),

    #[error("probe server did not start after {attempts} attempts: {last}")]
    ServerUnavailable { attempts: u32, last: String },
}

impl ProbeError {
    /// Short label for structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::Timeout { .. } => "timeout",
            ProbeError::Execution(_) => "execution",
            ProbeError::MalformedOutput(_) => "malformed_output",
            ProbeError::ServerUnavailable { .. } => "server_unavailable",
        }
    }
}
