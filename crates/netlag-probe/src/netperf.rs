//! netperf TCP_RR latency probe.
//!
//! netperf prints the selected output columns as one CSV line, in
//! microseconds. The probe converts them to milliseconds.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use netlag_core::LatencyStats;

use crate::error::ProbeError;

/// Default upper bound on a single probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// Output columns requested from netperf, in this order.
const OUTPUT_SELECTOR: &str = "min_latency,max_latency,mean_latency";

/// A round-trip latency measurement against one peer.
#[async_trait]
pub trait LatencyProbe: Send + Sync {
    /// Measure latency to `address:port`. Implementations bound the call
    /// with their own timeout.
    async fn probe(&self, address: &str, port: u16) -> Result<LatencyStats, ProbeError>;
}

/// Runs `netperf` as a child process.
#[derive(Debug, Clone)]
pub struct Netperf {
    program: String,
    timeout: Duration,
}

impl Default for Netperf {
    fn default() -> Self {
        Self::new(DEFAULT_PROBE_TIMEOUT)
    }
}

impl Netperf {
    /// Create a probe using `netperf` from `PATH`.
    pub fn new(timeout: Duration) -> Self {
        Self {
            program: "netperf".to_string(),
            timeout,
        }
    }

    /// Use a different netperf binary.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn command(&self, address: &str, port: u16) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("-H")
            .arg(address)
            .arg("-p")
            .arg(port.to_string())
            .args(["-t", "TCP_RR", "--", "-o", OUTPUT_SELECTOR]);
        cmd
    }
}

#[async_trait]
impl LatencyProbe for Netperf {
    async fn probe(&self, address: &str, port: u16) -> Result<LatencyStats, ProbeError> {
        debug!(%address, port, program = %self.program, "running latency probe");
        run_latency_command(self.command(address, port), address, self.timeout).await
    }
}

/// Run a prepared probe command and parse its stdout.
///
/// The child is killed if `timeout` expires first.
async fn run_latency_command(
    mut cmd: Command,
    target: &str,
    timeout: Duration,
) -> Result<LatencyStats, ProbeError> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = cmd
        .spawn()
        .map_err(|e| ProbeError::Execution(format!("failed to start probe: {e}")))?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => {
            return Err(ProbeError::Execution(format!("failed to wait for probe: {e}")));
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                target: target.to_string(),
                after: timeout,
            });
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(ProbeError::Execution(format!(
            "probe exited with {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    parse_latency(&String::from_utf8_lossy(&output.stdout))
}

/// Parse netperf's selected-output CSV into millisecond stats.
///
/// Header lines are skipped; the first line starting with a digit must
/// hold exactly three comma-separated microsecond values.
pub fn parse_latency(output: &str) -> Result<LatencyStats, ProbeError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with(|c: char| c.is_ascii_digit()))
        .ok_or_else(|| ProbeError::MalformedOutput("no latency line in output".to_string()))?;

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() != 3 {
        return Err(ProbeError::MalformedOutput(format!(
            "expected 3 latency values, got {}",
            fields.len()
        )));
    }

    let mut values = [0.0f64; 3];
    for (slot, raw) in values.iter_mut().zip(&fields) {
        let micros: f64 = raw
            .parse()
            .map_err(|e| ProbeError::MalformedOutput(format!("invalid latency value [{raw}]: {e}")))?;
        *slot = micros / 1000.0;
    }

    LatencyStats::new(values[0], values[1], values[2])
        .ok_or_else(|| ProbeError::MalformedOutput(format!("negative latency in [{line}]")))
}
