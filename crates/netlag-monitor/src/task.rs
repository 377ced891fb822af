//! Node monitor task — probes one peer until shutdown or failure.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use netlag_core::{Address, LatencyMeasurement, PeerNode, SelfNode};
use netlag_metrics::LatencySink;
use netlag_probe::LatencyProbe;

use crate::registry::ActiveSet;

/// Time between two probes of the same peer.
pub const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(10);

/// Why a monitor task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorExit {
    /// Another task already owned the peer.
    Duplicate,
    /// The shutdown signal fired.
    Shutdown,
    /// Reconciliation removed the peer from the active set, between
    /// probes or while one was in flight.
    Retired,
    /// A probe failed; the supervisor was notified.
    ProbeFailed,
}

/// Shared collaborators handed to every monitor task.
#[derive(Clone)]
pub struct MonitorContext {
    pub local: SelfNode,
    pub probe: Arc<dyn LatencyProbe>,
    pub sink: Arc<dyn LatencySink>,
    pub registry: ActiveSet,
    pub probe_port: u16,
    pub probe_interval: Duration,
    pub failures: mpsc::UnboundedSender<Address>,
}

/// Monitor `peer` until shutdown, retirement, or the first probe failure.
///
/// The first probe runs after `start_delay`. The peer's claim is released
/// on every exit path, and on probe failure it is released before the
/// address is sent on the failure channel.
pub async fn run_node_monitor(
    ctx: MonitorContext,
    peer: PeerNode,
    start_delay: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> MonitorExit {
    let Some(claim) = ctx.registry.claim_if_absent(&peer.address) else {
        warn!(node = %peer.name, ip = %peer.address, "node is already being monitored, skipping");
        return MonitorExit::Duplicate;
    };

    info!(node = %peer.name, ip = %peer.address, "started monitoring node");

    let mut ticker = tokio::time::interval_at(Instant::now() + start_delay, ctx.probe_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let exit = loop {
        tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break MonitorExit::Shutdown,
            _ = ticker.tick() => {}
        }

        if !claim.is_held() {
            break MonitorExit::Retired;
        }

        debug!(node = %peer.name, "probing node");
        let result = tokio::select! {
            biased;
            _ = shutdown.wait_for(|stop| *stop) => break MonitorExit::Shutdown,
            result = ctx.probe.probe(&peer.address, ctx.probe_port) => result,
        };

        // Reconciliation may have revoked the claim while the probe ran.
        if !claim.is_held() {
            break MonitorExit::Retired;
        }

        match result {
            Ok(stats) => {
                let measurement = LatencyMeasurement::between(&ctx.local, &peer, stats);
                info!(
                    from_node = %measurement.from_name,
                    current_ip = %measurement.from_address,
                    to_node = %measurement.to_name,
                    target_ip = %measurement.to_address,
                    min_latency_ms = measurement.min,
                    max_latency_ms = measurement.max,
                    mean_latency_ms = measurement.mean,
                    "latency results"
                );
                ctx.sink.publish(&measurement).await;
            }
            Err(e) => {
                error!(
                    node = %peer.name,
                    ip = %peer.address,
                    kind = e.kind(),
                    error = %e,
                    "failed to compute latency"
                );
                break MonitorExit::ProbeFailed;
            }
        }
    };

    drop(claim);

    match exit {
        MonitorExit::ProbeFailed => {
            // Only fails if the supervisor is gone, in which case nobody restarts us anyway.
            let _ = ctx.failures.send(peer.address.clone());
        }
        MonitorExit::Retired => {
            info!(node = %peer.name, ip = %peer.address, "node no longer in cluster, monitor retired");
        }
        _ => {}
    }

    info!(node = %peer.name, ip = %peer.address, reason = ?exit, "stopped monitoring node");
    exit
}
