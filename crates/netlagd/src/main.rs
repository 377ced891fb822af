//! netlagd — the netlag daemon.
//!
//! Runs on every node of a cluster and assembles:
//! - the local probe server (`netserver`), so peers can probe this node
//! - the Prometheus scrape endpoint
//! - the monitoring supervisor, probing every peer with `netperf`
//!
//! # Usage
//!
//! ```text
//! HOST_IP=10.0.0.9 netlagd --kube
//! HOST_IP=10.0.0.9 netlagd --peers-file /etc/netlag/nodes.json
//! netlagd --host-ip 10.0.0.9 --peers worker-1=10.0.0.1,worker-2=10.0.0.2
//! ```

mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use netlag_metrics::LatencyGauges;
use netlag_monitor::Supervisor;
use netlag_probe::{Netperf, ProbeServer, RetryPolicy};

use crate::config::{Config, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);
    run(config).await
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,netlagd=debug,netlag=debug"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    info!(host_ip = %config.host_ip, "netlag daemon starting");

    // Handlers go in first so an early Ctrl-C or SIGTERM still exits cleanly.
    let mut shutdown = install_shutdown_handler()?;

    let topology = config.topology().await?;

    // ── Probe server ───────────────────────────────────────────

    let probe_server = if config.skip_probe_server {
        info!("probe server disabled, expecting an external netserver");
        None
    } else {
        tokio::select! {
            started = ProbeServer::start(config.netperf_port, RetryPolicy::default()) => {
                Some(started.context("probe server failed to start")?)
            }
            _ = shutdown.wait_for(|stop| *stop) => {
                info!("shutdown requested during startup");
                return Ok(());
            }
        }
    };

    // ── Metrics endpoint ───────────────────────────────────────

    let gauges = LatencyGauges::new();
    let (metrics_stop, mut metrics_stop_rx) = watch::channel(false);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind metrics endpoint on {addr}"))?;

    let metrics_handle = tokio::spawn(netlag_metrics::serve(listener, gauges.clone(), async move {
        let _ = metrics_stop_rx.wait_for(|stop| *stop).await;
    }));

    // ── Monitoring ─────────────────────────────────────────────

    let probe = Netperf::new(config.probe_timeout());
    let supervisor = Supervisor::new(topology, Arc::new(probe), Arc::new(gauges), config.supervisor());

    let outcome = supervisor
        .run(config.identity(), async move {
            let _ = shutdown.wait_for(|stop| *stop).await;
        })
        .await;

    // ── Teardown ───────────────────────────────────────────────

    metrics_stop.send_replace(true);
    match metrics_handle.await {
        Ok(Err(e)) => warn!(error = %e, "metrics server exited with error"),
        Err(e) => warn!(error = %e, "metrics server task failed"),
        Ok(Ok(())) => {}
    }

    if let Some(server) = probe_server {
        server.stop().await;
    }

    let summary = outcome.context("monitoring failed")?;
    info!(
        spawned = summary.spawned,
        probe_failures = summary.probe_failures,
        restarts = summary.restarts,
        removed = summary.removed,
        aborted = summary.aborted,
        "netlag daemon stopped"
    );
    Ok(())
}

/// Register SIGINT and SIGTERM handlers now and flip the returned watch
/// to `true` when either arrives.
#[cfg(unix)]
fn install_shutdown_handler() -> anyhow::Result<watch::Receiver<bool>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("failed to install SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    let (tx, rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
        info!("shutdown signal received");
        tx.send_replace(true);
    });
    Ok(rx)
}

#[cfg(not(unix))]
fn install_shutdown_handler() -> anyhow::Result<watch::Receiver<bool>> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                tx.send_replace(true);
            }
            Err(e) => warn!(error = %e, "failed to listen for Ctrl-C"),
        }
    });
    Ok(rx)
}
