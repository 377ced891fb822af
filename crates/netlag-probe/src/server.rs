//! Passive side of the probe exchange.
//!
//! Peers can only probe this node while `netserver` is listening. It is
//! started in the foreground (`-D`) so the daemon owns the process and
//! can stop it on shutdown.

use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::{error, info, warn};

use crate::error::ProbeError;

/// How many times to try starting the server, and how long to wait between tries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
    /// How long a fresh process must stay up to count as started.
    pub settle: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            delay: Duration::from_secs(2),
            settle: Duration::from_millis(500),
        }
    }
}

/// Running `netserver` process.
#[derive(Debug)]
pub struct ProbeServer {
    child: Child,
    port: u16,
}

impl ProbeServer {
    /// Start `netserver` on `port`, retrying per `retry`.
    pub async fn start(port: u16, retry: RetryPolicy) -> Result<Self, ProbeError> {
        Self::start_with(port, retry, || netserver_command(port)).await
    }

    /// Start a server from an arbitrary command factory.
    ///
    /// The factory is called once per attempt.
    pub async fn start_with<F>(port: u16, retry: RetryPolicy, make_command: F) -> Result<Self, ProbeError>
    where
        F: Fn() -> Command,
    {
        let attempts = retry.attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            match spawn_once(make_command(), retry.settle).await {
                Ok(child) => {
                    info!(port, attempt, "probe server started");
                    return Ok(Self { child, port });
                }
                Err(e) => {
                    error!(port, attempt, max_attempts = attempts, error = %e, "failed to start probe server");
                    last = e;
                }
            }

            if attempt < attempts {
                tokio::time::sleep(retry.delay).await;
            }
        }

        Err(ProbeError::ServerUnavailable { attempts, last })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Kill the server and reap it.
    pub async fn stop(mut self) {
        match self.child.kill().await {
            Ok(()) => info!(port = self.port, "probe server stopped"),
            Err(e) => warn!(port = self.port, error = %e, "failed to stop probe server"),
        }
    }
}

fn netserver_command(port: u16) -> Command {
    let mut cmd = Command::new("netserver");
    cmd.arg("-D").arg("-p").arg(port.to_string());
    cmd
}

/// Spawn the server and wait out the settle window.
///
/// netserver runs in the foreground, so any exit inside the window
/// (a taken port, a bad flag) means it is not serving.
async fn spawn_once(mut cmd: Command, settle: Duration) -> Result<Child, String> {
    cmd.stdin(Stdio::null()).kill_on_drop(true);
    let mut child = cmd.spawn().map_err(|e| e.to_string())?;

    match tokio::time::timeout(settle, child.wait()).await {
        Err(_) => Ok(child),
        Ok(Ok(status)) => Err(format!("exited during startup with {status}")),
        Ok(Err(e)) => Err(e.to_string()),
    }
}
