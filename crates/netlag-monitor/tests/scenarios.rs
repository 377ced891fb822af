//! Supervisor scenarios.
//!
//! Drives a full supervisor against in-memory fakes of the topology,
//! probe and sink, with tokio's clock paused so intervals are exact.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

use netlag_core::{LatencyMeasurement, LatencyStats};
use netlag_metrics::{LatencyGauges, LatencySink};
use netlag_monitor::*;
use netlag_probe::{LatencyProbe, ProbeError};
use netlag_topology::{AddressType, NodeAddress, NodeRecord, NodeSource, Topology, TopologyError};

const SELF_IP: &str = "10.0.0.9";

// ── Fakes ─────────────────────────────────────────────────────────

/// Node listing that tests can edit or break while the supervisor runs.
#[derive(Default)]
struct FakeCluster {
    nodes: Mutex<Vec<NodeRecord>>,
    unavailable: Mutex<bool>,
}

impl FakeCluster {
    fn with(pairs: &str) -> Arc<Self> {
        let cluster = Arc::new(Self::default());
        cluster.set(pairs);
        cluster
    }

    /// Replace the listing with `name=address` pairs.
    fn set(&self, pairs: &str) {
        *self.nodes.lock().unwrap() = nodes(pairs);
    }

    fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock().unwrap() = unavailable;
    }
}

fn nodes(pairs: &str) -> Vec<NodeRecord> {
    pairs.split(',')
        .map(|entry| {
            let (name, address) = entry.split_once('=').unwrap();
            NodeRecord {
                name: name.to_string(),
                addresses: vec![NodeAddress {
                    kind: AddressType::Internal,
                    address: address.to_string(),
                }],
            }
        })
        .collect()
}

#[async_trait]
impl NodeSource for FakeCluster {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, TopologyError> {
        if *self.unavailable.lock().unwrap() {
            return Err(TopologyError::Unavailable("api server down".to_string()));
        }
        Ok(self.nodes.lock().unwrap().clone())
    }
}

#[derive(Clone, Copy)]
enum Behavior {
    Ok,
    FailOnce,
    Hang,
    /// Wait for `FakeProbe::gate`, then succeed.
    Gated,
}

/// Probe with per-address behavior and call counting.
#[derive(Default)]
struct FakeProbe {
    behavior: Mutex<HashMap<String, Behavior>>,
    calls: Mutex<HashMap<String, u32>>,
    gate: tokio::sync::Notify,
}

impl FakeProbe {
    fn set(&self, address: &str, behavior: Behavior) {
        self.behavior.lock().unwrap().insert(address.to_string(), behavior);
    }

    fn calls(&self, address: &str) -> u32 {
        self.calls.lock().unwrap().get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl LatencyProbe for FakeProbe {
    async fn probe(&self, address: &str, _port: u16) -> Result<LatencyStats, ProbeError> {
        *self.calls.lock().unwrap().entry(address.to_string()).or_default() += 1;

        let behavior = self
            .behavior
            .lock()
            .unwrap()
            .get(address)
            .copied()
            .unwrap_or(Behavior::Ok);

        match behavior {
            Behavior::Ok => Ok(LatencyStats::new(0.1, 0.4, 0.2).unwrap()),
            Behavior::FailOnce => {
                self.set(address, Behavior::Ok);
                Err(ProbeError::Timeout {
                    target: address.to_string(),
                    after: Duration::from_secs(30),
                })
            }
            Behavior::Hang => std::future::pending().await,
            Behavior::Gated => {
                self.gate.notified().await;
                Ok(LatencyStats::new(0.1, 0.4, 0.2).unwrap())
            }
        }
    }
}

/// Sink that never returns from `publish`.
struct StuckSink;

#[async_trait]
impl LatencySink for StuckSink {
    async fn publish(&self, _measurement: &LatencyMeasurement) {
        std::future::pending::<()>().await
    }
}

// ── Harness ───────────────────────────────────────────────────────

struct Running {
    registry: ActiveSet,
    state: watch::Receiver<SupervisorState>,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<RunSummary, MonitorError>>,
}

impl Running {
    async fn shutdown(mut self) -> RunSummary {
        self.stop.send(()).unwrap();
        let summary = self.handle.await.unwrap().unwrap();
        assert_eq!(*self.state.borrow_and_update(), SupervisorState::Stopped);
        summary
    }
}

fn config() -> SupervisorConfig {
    SupervisorConfig {
        probe_port: 12865,
        probe_interval: Duration::from_secs(10),
        refresh_interval: Duration::from_secs(60),
        shutdown_grace: Duration::from_secs(5),
    }
}

async fn start(cluster: Arc<FakeCluster>, probe: Arc<FakeProbe>, sink: Arc<dyn LatencySink>) -> Running {
    let supervisor = Supervisor::new(Topology::new(cluster), probe, sink, config());
    let registry = supervisor.registry();
    let mut state = supervisor.subscribe_state();
    let (stop, stopped) = oneshot::channel();

    let identity = SelfIdentity {
        address: SELF_IP.to_string(),
        name: None,
    };
    let handle = tokio::spawn(supervisor.run(identity, async move {
        let _ = stopped.await;
    }));

    state
        .wait_for(|s| *s == SupervisorState::Running)
        .await
        .unwrap();
    // Let the freshly spawned tasks take their claims.
    tokio::time::sleep(Duration::from_millis(1)).await;

    Running {
        registry,
        state,
        stop,
        handle,
    }
}

fn addresses(registry: &ActiveSet) -> HashSet<String> {
    registry.snapshot()
}

fn set(items: &[&str]) -> HashSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// ── Scenarios ─────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn initial_peers_get_one_monitor_each_and_none_for_self() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());
    let gauges = LatencyGauges::new();

    let running = start(cluster, probe.clone(), Arc::new(gauges.clone())).await;

    assert_eq!(addresses(&running.registry), set(&["10.0.0.1", "10.0.0.2"]));
    assert_eq!(probe.calls(SELF_IP), 0);
    assert_eq!(probe.calls("10.0.0.1"), 1);

    let sample = gauges.latest_for("10.0.0.2").await.unwrap();
    assert_eq!(sample.from_name, "me");
    assert_eq!(sample.from_address, SELF_IP);
    assert_eq!(sample.to_name, "n2");

    let summary = running.shutdown().await;
    assert_eq!(summary.spawned, 2);
    assert_eq!(summary.duplicates, 0);
}

#[tokio::test(start_paused = true)]
async fn probe_failure_restarts_peer_still_in_cluster() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());
    probe.set("10.0.0.2", Behavior::FailOnce);

    let running = start(cluster, probe.clone(), Arc::new(LatencyGauges::new())).await;

    // The failed task released, the supervisor re-listed and respawned.
    assert!(running.registry.contains("10.0.0.2"));
    assert_eq!(probe.calls("10.0.0.2"), 1);

    // The replacement waits one interval before probing again.
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(probe.calls("10.0.0.2"), 2);
    assert!(running.registry.contains("10.0.0.2"));

    let summary = running.shutdown().await;
    assert_eq!(summary.probe_failures, 1);
    assert_eq!(summary.restarts, 1);
    assert_eq!(summary.spawned, 3);
    assert_eq!(summary.duplicates, 0);
}

#[tokio::test(start_paused = true)]
async fn probe_failure_for_departed_peer_is_not_restarted() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster.clone(), probe.clone(), Arc::new(LatencyGauges::new())).await;

    // n2 leaves, then its next probe fails before any refresh.
    cluster.set("n1=10.0.0.1,me=10.0.0.9");
    probe.set("10.0.0.2", Behavior::FailOnce);
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(addresses(&running.registry), set(&["10.0.0.1"]));

    let summary = running.shutdown().await;
    assert_eq!(summary.probe_failures, 1);
    assert_eq!(summary.restarts, 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_removes_departed_peer_and_adds_new_one() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());
    // n2's task is stuck mid-probe and will never report a failure.
    probe.set("10.0.0.2", Behavior::Hang);

    let running = start(cluster.clone(), probe.clone(), Arc::new(LatencyGauges::new())).await;
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1", "10.0.0.2"]));

    cluster.set("n1=10.0.0.1,n3=10.0.0.3,me=10.0.0.9");
    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(addresses(&running.registry), set(&["10.0.0.1", "10.0.0.3"]));
    assert_eq!(probe.calls("10.0.0.3"), 1);

    let summary = running.shutdown().await;
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.spawned, 3);
}

#[tokio::test(start_paused = true)]
async fn refresh_retires_stale_task_before_it_probes_again() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());
    let gauges = LatencyGauges::new();

    let running = start(cluster.clone(), probe.clone(), Arc::new(gauges.clone())).await;
    assert!(gauges.latest_for("10.0.0.2").await.is_some());

    cluster.set("n1=10.0.0.1,me=10.0.0.9");
    tokio::time::sleep(Duration::from_secs(60)).await;
    let calls_at_refresh = probe.calls("10.0.0.2");
    assert!(!running.registry.contains("10.0.0.2"));
    // The departed peer's series is no longer exported.
    assert!(gauges.latest_for("10.0.0.2").await.is_none());
    assert!(gauges.latest_for("10.0.0.1").await.is_some());

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(probe.calls("10.0.0.2"), calls_at_refresh);

    running.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn measurement_in_flight_across_removal_is_discarded() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());
    probe.set("10.0.0.2", Behavior::Gated);
    let gauges = LatencyGauges::new();

    let running = start(cluster.clone(), probe.clone(), Arc::new(gauges.clone())).await;
    assert_eq!(probe.calls("10.0.0.2"), 1);

    cluster.set("n1=10.0.0.1,me=10.0.0.9");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1"]));
    assert!(gauges.latest_for("10.0.0.2").await.is_none());

    // The held-back measurement completes after the peer was removed.
    probe.gate.notify_one();
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(gauges.latest_for("10.0.0.2").await.is_none());
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1"]));
    assert_eq!(probe.calls("10.0.0.2"), 1);

    let summary = running.shutdown().await;
    assert_eq!(summary.removed, 1);
    assert_eq!(summary.probe_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn refresh_restores_peer_that_rejoins() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster.clone(), probe.clone(), Arc::new(LatencyGauges::new())).await;

    cluster.set("n1=10.0.0.1,me=10.0.0.9");
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert!(!running.registry.contains("10.0.0.2"));

    cluster.set("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1", "10.0.0.2"]));

    let summary = running.shutdown().await;
    assert_eq!(summary.duplicates, 0);
}

#[tokio::test(start_paused = true)]
async fn discovery_failure_during_refresh_is_not_fatal() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster.clone(), probe.clone(), Arc::new(LatencyGauges::new())).await;

    cluster.set_unavailable(true);
    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1", "10.0.0.2"]));
    assert!(!running.handle.is_finished());

    cluster.set("n1=10.0.0.1,me=10.0.0.9");
    cluster.set_unavailable(false);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(addresses(&running.registry), set(&["10.0.0.1"]));

    running.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn discovery_failure_during_recovery_defers_to_refresh() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster.clone(), probe.clone(), Arc::new(LatencyGauges::new())).await;

    cluster.set_unavailable(true);
    probe.set("10.0.0.2", Behavior::FailOnce);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!running.registry.contains("10.0.0.2"));

    // The next refresh picks it back up.
    cluster.set_unavailable(false);
    tokio::time::sleep(Duration::from_secs(51)).await;
    assert!(running.registry.contains("10.0.0.2"));

    let summary = running.shutdown().await;
    assert_eq!(summary.probe_failures, 1);
    assert_eq!(summary.restarts, 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_mid_interval_empties_registry() {
    let cluster = FakeCluster::with("n1=10.0.0.1,n2=10.0.0.2,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster, probe.clone(), Arc::new(LatencyGauges::new())).await;
    tokio::time::sleep(Duration::from_secs(4)).await;

    let registry = running.registry.clone();
    let started = tokio::time::Instant::now();
    let summary = running.shutdown().await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(registry.is_empty());
    assert_eq!(summary.aborted, 0);
    assert_eq!(probe.calls("10.0.0.1"), 1);
}

#[tokio::test(start_paused = true)]
async fn stuck_tasks_are_aborted_after_grace_period() {
    let cluster = FakeCluster::with("n1=10.0.0.1,me=10.0.0.9");
    let probe = Arc::new(FakeProbe::default());

    let running = start(cluster, probe, Arc::new(StuckSink)).await;
    assert!(running.registry.contains("10.0.0.1"));

    let registry = running.registry.clone();
    let started = tokio::time::Instant::now();
    let summary = running.shutdown().await;

    assert!(started.elapsed() >= Duration::from_secs(5));
    assert_eq!(summary.aborted, 1);
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn startup_without_peers_fails() {
    let cluster = FakeCluster::with("me=10.0.0.9,kind-control-plane=10.0.0.100");
    let supervisor = Supervisor::new(
        Topology::new(cluster),
        Arc::new(FakeProbe::default()),
        Arc::new(LatencyGauges::new()),
        config(),
    );

    let identity = SelfIdentity {
        address: SELF_IP.to_string(),
        name: None,
    };
    let err = supervisor
        .run(identity, std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::NoPeers));
}

#[tokio::test(start_paused = true)]
async fn startup_discovery_failure_is_fatal() {
    let cluster = FakeCluster::with("n1=10.0.0.1");
    cluster.set_unavailable(true);
    let supervisor = Supervisor::new(
        Topology::new(cluster),
        Arc::new(FakeProbe::default()),
        Arc::new(LatencyGauges::new()),
        config(),
    );

    let identity = SelfIdentity {
        address: SELF_IP.to_string(),
        name: Some("me".to_string()),
    };
    let err = supervisor
        .run(identity, std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, MonitorError::Topology(_)));
}
