//! Supervisor — owns the monitor tasks for the lifetime of the process.
//!
//! Runs three event sources until shutdown:
//! - refresh tick: reconcile the active set against a fresh topology and
//!   drop the gauges of departed peers;
//! - failure signal: restart the failed peer if it is still listed;
//! - shutdown: broadcast to all tasks and wait out the grace period.
//!
//! Events are handled one at a time, so two reconciliations never overlap.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use netlag_core::{PeerNode, SelfNode};
use netlag_metrics::LatencySink;
use netlag_probe::LatencyProbe;
use netlag_topology::Topology;

use crate::error::MonitorError;
use crate::registry::ActiveSet;
use crate::task::{DEFAULT_PROBE_INTERVAL, MonitorContext, MonitorExit, run_node_monitor};

/// Lifecycle of the supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

/// Timing and port settings for the supervisor and its tasks.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Port the peers' probe servers listen on.
    pub probe_port: u16,
    pub probe_interval: Duration,
    pub refresh_interval: Duration,
    /// How long tasks get to exit after shutdown before being aborted.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            probe_port: 12865,
            probe_interval: DEFAULT_PROBE_INTERVAL,
            refresh_interval: Duration::from_secs(60),
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// How the local node identifies itself at startup.
#[derive(Debug, Clone)]
pub struct SelfIdentity {
    pub address: String,
    /// Configured name. When absent, it is looked up in the topology.
    pub name: Option<String>,
}

/// Counters collected over one run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub spawned: u32,
    pub probe_failures: u32,
    pub restarts: u32,
    pub duplicates: u32,
    pub removed: u32,
    pub aborted: u32,
}

/// Monitoring supervisor.
pub struct Supervisor {
    topology: Topology,
    probe: Arc<dyn LatencyProbe>,
    sink: Arc<dyn LatencySink>,
    registry: ActiveSet,
    config: SupervisorConfig,
    state: watch::Sender<SupervisorState>,
}

/// Mutable state of one run, kept off `Supervisor` so `run` can borrow
/// both independently.
struct RunState {
    ctx: MonitorContext,
    tasks: JoinSet<MonitorExit>,
    stop: watch::Sender<bool>,
    summary: RunSummary,
}

impl Supervisor {
    pub fn new(
        topology: Topology,
        probe: Arc<dyn LatencyProbe>,
        sink: Arc<dyn LatencySink>,
        config: SupervisorConfig,
    ) -> Self {
        let (state, _) = watch::channel(SupervisorState::Starting);
        Self {
            topology,
            probe,
            sink,
            registry: ActiveSet::new(),
            config,
            state,
        }
    }

    /// The active set. Clones observe the live registry.
    pub fn registry(&self) -> ActiveSet {
        self.registry.clone()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Resolve the local node's name from configuration or the topology.
    pub async fn resolve_self(&self, identity: &SelfIdentity) -> Result<SelfNode, MonitorError> {
        let name = match &identity.name {
            Some(name) if !name.is_empty() => Some(name.clone()),
            _ => self.topology.resolve_self(&identity.address).await?,
        };

        match name {
            Some(name) => Ok(SelfNode::new(name, identity.address.clone())),
            None => Err(MonitorError::SelfUnresolved {
                address: identity.address.clone(),
            }),
        }
    }

    /// Run until `shutdown` resolves.
    ///
    /// Returns an error only for fatal startup conditions: unresolved
    /// self identity, a failed initial listing, or no peers at all.
    pub async fn run<F>(self, identity: SelfIdentity, shutdown: F) -> Result<RunSummary, MonitorError>
    where
        F: Future<Output = ()>,
    {
        self.set_state(SupervisorState::Starting);

        let local = self.resolve_self(&identity).await?;
        let peers = self.topology.list_peers(&local.address).await?;
        if peers.is_empty() {
            return Err(MonitorError::NoPeers);
        }
        info!(node = %local.name, ip = %local.address, peers = peers.len(), "monitoring starting");

        let (failures_tx, mut failures) = mpsc::unbounded_channel();
        let (stop, _) = watch::channel(false);
        let mut run = RunState {
            ctx: MonitorContext {
                local,
                probe: self.probe.clone(),
                sink: self.sink.clone(),
                registry: self.registry.clone(),
                probe_port: self.config.probe_port,
                probe_interval: self.config.probe_interval,
                failures: failures_tx,
            },
            tasks: JoinSet::new(),
            stop,
            summary: RunSummary::default(),
        };

        for peer in peers {
            self.spawn_monitor(&mut run, peer, Duration::ZERO);
        }
        self.set_state(SupervisorState::Running);

        let period = self.config.refresh_interval;
        let mut refresh = tokio::time::interval_at(Instant::now() + period, period);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutting down monitoring");
                    break;
                }
                _ = refresh.tick() => self.reconcile(&mut run).await,
                Some(address) = failures.recv() => self.recover(&mut run, address).await,
                Some(joined) = run.tasks.join_next(), if !run.tasks.is_empty() => {
                    record_exit(&mut run.summary, joined);
                }
            }
        }

        self.stop(&mut run).await;
        Ok(run.summary)
    }

    /// Refresh the topology and diff it against the active set.
    async fn reconcile(&self, run: &mut RunState) {
        let local = run.ctx.local.clone();
        let peers = match self.topology.list_peers(&local.address).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(error = %e, "topology refresh failed, retrying next cycle");
                return;
            }
        };

        let active = self.registry.snapshot();
        let listed: HashSet<&str> = peers.iter().map(|p| p.address.as_str()).collect();

        let stale: Vec<&String> = active
            .iter()
            .filter(|address| !listed.contains(address.as_str()))
            .collect();
        let mut removed = 0;
        for address in stale {
            if self.registry.release(address) {
                info!(ip = %address, "node removed from monitoring due to cluster update");
                removed += 1;
            }
            self.sink.forget(address).await;
        }

        let mut started = 0;
        for peer in &peers {
            if !active.contains(&peer.address) && !local.is(peer) {
                self.spawn_monitor(run, peer.clone(), Duration::ZERO);
                started += 1;
            }
        }

        run.summary.removed += removed;
        debug!(peers = peers.len(), started, removed, "topology refresh complete");
    }

    /// Restart monitoring for a failed peer if it is still in the cluster.
    async fn recover(&self, run: &mut RunState, address: String) {
        run.summary.probe_failures += 1;
        info!(ip = %address, "restarting monitoring for node");

        let peers = match self.topology.list_peers(&run.ctx.local.address).await {
            Ok(peers) => peers,
            Err(e) => {
                warn!(ip = %address, error = %e, "topology lookup failed, restart deferred to next refresh");
                return;
            }
        };

        match peers.into_iter().find(|p| p.address == address) {
            Some(peer) if !run.ctx.local.is(&peer) => {
                // Wait one interval so an unreachable peer isn't hammered.
                let delay = self.config.probe_interval;
                self.spawn_monitor(run, peer, delay);
                run.summary.restarts += 1;
            }
            _ => {
                info!(ip = %address, "node left the cluster, not restarting");
                self.sink.forget(&address).await;
            }
        }
    }

    fn spawn_monitor(&self, run: &mut RunState, peer: PeerNode, start_delay: Duration) {
        run.summary.spawned += 1;
        run.tasks.spawn(run_node_monitor(
            run.ctx.clone(),
            peer,
            start_delay,
            run.stop.subscribe(),
        ));
    }

    async fn stop(&self, run: &mut RunState) {
        self.set_state(SupervisorState::Stopping);
        run.stop.send_replace(true);

        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = run.tasks.join_next().await {
                record_exit(&mut run.summary, joined);
            }
        })
        .await;

        if drained.is_err() {
            warn!(remaining = run.tasks.len(), grace_secs = grace.as_secs(), "monitors did not stop in time, aborting");
            run.tasks.abort_all();
            while let Some(joined) = run.tasks.join_next().await {
                record_exit(&mut run.summary, joined);
            }
        }

        self.set_state(SupervisorState::Stopped);
        info!(active = self.registry.len(), "monitoring stopped");
    }

    fn set_state(&self, state: SupervisorState) {
        self.state.send_replace(state);
        debug!(?state, "supervisor state changed");
    }
}

fn record_exit(summary: &mut RunSummary, joined: Result<MonitorExit, JoinError>) {
    match joined {
        Ok(MonitorExit::Duplicate) => summary.duplicates += 1,
        Ok(_) => {}
        Err(e) if e.is_cancelled() => summary.aborted += 1,
        Err(e) => error!(error = %e, "monitor task panicked"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use netlag_core::LatencyStats;
    use netlag_metrics::LatencyGauges;
    use netlag_probe::ProbeError;
    use netlag_topology::StaticSource;

    struct OkProbe;

    #[async_trait]
    impl LatencyProbe for OkProbe {
        async fn probe(&self, _address: &str, _port: u16) -> Result<LatencyStats, ProbeError> {
            Ok(LatencyStats::new(0.1, 0.3, 0.2).unwrap())
        }
    }

    fn supervisor(nodes: &str) -> Supervisor {
        Supervisor::new(
            Topology::new(Arc::new(StaticSource::parse(nodes).unwrap())),
            Arc::new(OkProbe),
            Arc::new(LatencyGauges::new()),
            SupervisorConfig::default(),
        )
    }

    fn identity(address: &str) -> SelfIdentity {
        SelfIdentity {
            address: address.to_string(),
            name: None,
        }
    }

    #[test]
    fn default_config_matches_documented_intervals() {
        let config = SupervisorConfig::default();
        assert_eq!(config.probe_port, 12865);
        assert_eq!(config.probe_interval, Duration::from_secs(10));
        assert_eq!(config.refresh_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn resolve_self_prefers_configured_name() {
        let sup = supervisor("n1=10.0.0.1,me=10.0.0.9");
        let configured = SelfIdentity {
            address: "10.0.0.9".to_string(),
            name: Some("custom".to_string()),
        };
        assert_eq!(sup.resolve_self(&configured).await.unwrap().name, "custom");
        assert_eq!(sup.resolve_self(&identity("10.0.0.9")).await.unwrap().name, "me");
    }

    #[tokio::test]
    async fn unresolved_self_is_fatal() {
        let sup = supervisor("n1=10.0.0.1");
        let err = sup.run(identity("10.0.0.9"), std::future::pending()).await.unwrap_err();
        assert!(matches!(err, MonitorError::SelfUnresolved { .. }));
    }

    #[tokio::test]
    async fn no_peers_is_fatal() {
        let sup = supervisor("me=10.0.0.9");
        let err = sup.run(identity("10.0.0.9"), std::future::pending()).await.unwrap_err();
        assert!(matches!(err, MonitorError::NoPeers));
    }

    #[tokio::test(start_paused = true)]
    async fn state_transitions_through_lifecycle() {
        let sup = supervisor("n1=10.0.0.1,me=10.0.0.9");
        let mut state = sup.subscribe_state();
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let handle = tokio::spawn(sup.run(identity("10.0.0.9"), async move {
            let _ = rx.await;
        }));

        state.wait_for(|s| *s == SupervisorState::Running).await.unwrap();
        tx.send(()).unwrap();
        state.wait_for(|s| *s == SupervisorState::Stopped).await.unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.spawned, 1);
    }
}
