//! Command-line and environment configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{ArgGroup, Parser, ValueEnum};

use netlag_monitor::{SelfIdentity, SupervisorConfig};
use netlag_topology::{AddressType, FileSource, KubeSource, NodeSource, StaticSource, Topology};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "netlagd", about = "Node-to-node latency monitor", version)]
#[command(group(ArgGroup::new("peer_source").required(true).args(["kube", "peers", "peers_file"])))]
pub struct Config {
    /// Address of this node.
    #[arg(long, env = "HOST_IP")]
    pub host_ip: String,

    /// Name of this node. Looked up by address in the node list when unset.
    #[arg(long, env = "NODE_NAME")]
    pub node_name: Option<String>,

    /// Port the probe server listens on, locally and on every peer.
    #[arg(long, env = "NETPERF_PORT", default_value_t = 12865)]
    pub netperf_port: u16,

    /// Port of the Prometheus scrape endpoint.
    #[arg(long, env = "METRICS_PORT", default_value_t = 9090)]
    pub metrics_port: u16,

    /// List nodes from the Kubernetes API (in-cluster config, then kubeconfig).
    #[arg(long, env = "NETLAG_KUBE")]
    pub kube: bool,

    /// Static node list as `name=address` pairs separated by commas.
    #[arg(long, env = "NETLAG_PEERS")]
    pub peers: Option<String>,

    /// JSON node list, re-read on every refresh.
    #[arg(long, env = "NETLAG_PEERS_FILE")]
    pub peers_file: Option<PathBuf>,

    /// Which node address to probe (internal or external).
    #[arg(long, env = "NETLAG_ADDRESS_TYPE", default_value = "internal")]
    pub address_type: AddressType,

    #[arg(long, env = "NETLAG_PROBE_INTERVAL_SECS", default_value_t = 10)]
    pub probe_interval_secs: u64,

    #[arg(long, env = "NETLAG_REFRESH_INTERVAL_SECS", default_value_t = 60)]
    pub refresh_interval_secs: u64,

    /// Upper bound on a single probe.
    #[arg(long, env = "NETLAG_PROBE_TIMEOUT_SECS", default_value_t = 30)]
    pub probe_timeout_secs: u64,

    /// Time monitors get to stop before they are aborted.
    #[arg(long, env = "NETLAG_SHUTDOWN_GRACE_SECS", default_value_t = 5)]
    pub shutdown_grace_secs: u64,

    /// Don't launch the local probe server (it runs as a sidecar).
    #[arg(long, env = "NETLAG_SKIP_PROBE_SERVER")]
    pub skip_probe_server: bool,

    #[arg(long, env = "NETLAG_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Config {
    /// Build the topology from whichever node source was configured.
    pub async fn topology(&self) -> anyhow::Result<Topology> {
        let source: Arc<dyn NodeSource> = match (&self.peers, &self.peers_file) {
            (Some(peers), _) => Arc::new(StaticSource::parse(peers).context("invalid --peers")?),
            (None, Some(path)) => Arc::new(FileSource::new(path)),
            (None, None) if self.kube => Arc::new(
                KubeSource::try_default()
                    .await
                    .context("failed to create kubernetes client")?,
            ),
            (None, None) => anyhow::bail!("one of --kube, --peers or --peers-file is required"),
        };
        Ok(Topology::new(source).with_address_type(self.address_type))
    }

    pub fn identity(&self) -> SelfIdentity {
        SelfIdentity {
            address: self.host_ip.clone(),
            name: self.node_name.clone().filter(|n| !n.is_empty()),
        }
    }

    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            probe_port: self.netperf_port,
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
            refresh_interval: Duration::from_secs(self.refresh_interval_secs.max(1)),
            shutdown_grace: Duration::from_secs(self.shutdown_grace_secs),
        }
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }
}
