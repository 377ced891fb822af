//! Node sources — where the raw cluster listing comes from.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::api::{Api, ListParams};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::TopologyError;

/// Which node address peers are probed on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AddressType {
    #[default]
    #[serde(rename = "InternalIP")]
    Internal,
    #[serde(rename = "ExternalIP")]
    External,
}

impl FromStr for AddressType {
    type Err = TopologyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "internal" | "internalip" => Ok(AddressType::Internal),
            "external" | "externalip" => Ok(AddressType::External),
            other => Err(TopologyError::InvalidPeer(format!(
                "unknown address type '{other}', expected internal or external"
            ))),
        }
    }
}

impl fmt::Display for AddressType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressType::Internal => f.write_str("InternalIP"),
            AddressType::External => f.write_str("ExternalIP"),
        }
    }
}

/// One typed address of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeAddress {
    #[serde(rename = "type")]
    pub kind: AddressType,
    pub address: String,
}

/// A cluster node as reported by a source, before filtering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub name: String,
    #[serde(default)]
    pub addresses: Vec<NodeAddress>,
}

impl NodeRecord {
    /// The node's address of the given type. The last match wins.
    pub fn address(&self, kind: AddressType) -> Option<&str> {
        self.addresses
            .iter()
            .rev()
            .find(|a| a.kind == kind && !a.address.is_empty())
            .map(|a| a.address.as_str())
    }

    /// Whether the node runs the control plane.
    pub fn is_control_plane(&self) -> bool {
        self.name.contains("master") || self.name.contains("control-plane")
    }
}

/// Lists the nodes currently in the cluster.
#[async_trait]
pub trait NodeSource: Send + Sync {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, TopologyError>;
}

// ── Static ─────────────────────────────────────────────────────────

/// A fixed node list from configuration.
///
/// Each address is registered under both address types.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    nodes: Vec<NodeRecord>,
}

impl StaticSource {
    pub fn new(nodes: Vec<NodeRecord>) -> Self {
        Self { nodes }
    }

    /// Parse `name=address` pairs separated by commas.
    pub fn parse(pairs: &str) -> Result<Self, TopologyError> {
        let mut nodes = Vec::new();
        for entry in pairs.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (name, address) = entry
                .split_once('=')
                .map(|(n, a)| (n.trim(), a.trim()))
                .filter(|(n, a)| !n.is_empty() && !a.is_empty())
                .ok_or_else(|| TopologyError::InvalidPeer(format!("expected name=address, got '{entry}'")))?;

            nodes.push(NodeRecord {
                name: name.to_string(),
                addresses: [AddressType::Internal, AddressType::External]
                    .into_iter()
                    .map(|kind| NodeAddress {
                        kind,
                        address: address.to_string(),
                    })
                    .collect(),
            });
        }
        Ok(Self { nodes })
    }
}

#[async_trait]
impl NodeSource for StaticSource {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, TopologyError> {
        Ok(self.nodes.clone())
    }
}

// ── File ───────────────────────────────────────────────────────────

/// A JSON node list on disk, re-read on every listing so a mounted
/// ConfigMap or a periodically refreshed dump is picked up live.
///
/// Accepts either a plain array of [`NodeRecord`] or the `NodeList`
/// shape printed by `kubectl get nodes -o json`.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl NodeSource for FileSource {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, TopologyError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| TopologyError::Read {
                path: self.path.clone(),
                source,
            })?;

        let file: NodeFile = serde_json::from_str(&raw).map_err(|source| TopologyError::Parse {
            path: self.path.clone(),
            source,
        })?;

        let nodes = file.into_records();
        debug!(path = ?self.path, nodes = nodes.len(), "node list loaded");
        Ok(nodes)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NodeFile {
    Records(Vec<NodeRecord>),
    KubeList { items: Vec<KubeNode> },
}

#[derive(Deserialize)]
struct KubeNode {
    metadata: KubeMetadata,
    #[serde(default)]
    status: KubeStatus,
}

#[derive(Deserialize)]
struct KubeMetadata {
    name: String,
}

#[derive(Deserialize, Default)]
struct KubeStatus {
    #[serde(default)]
    addresses: Vec<KubeAddress>,
}

#[derive(Deserialize)]
struct KubeAddress {
    #[serde(rename = "type")]
    kind: String,
    address: String,
}

impl NodeFile {
    fn into_records(self) -> Vec<NodeRecord> {
        match self {
            NodeFile::Records(records) => records,
            NodeFile::KubeList { items } => items
                .into_iter()
                .map(|node| NodeRecord {
                    name: node.metadata.name,
                    addresses: node
                        .status
                        .addresses
                        .into_iter()
                        .filter_map(|a| typed_address(&a.kind, a.address))
                        .collect(),
                })
                .collect(),
        }
    }
}

/// Keep the address types peers can be probed on. Hostname and DNS
/// entries are not probe targets.
fn typed_address(kind: &str, address: String) -> Option<NodeAddress> {
    let kind = match kind {
        "InternalIP" => AddressType::Internal,
        "ExternalIP" => AddressType::External,
        _ => return None,
    };
    Some(NodeAddress { kind, address })
}

// ── Kubernetes ─────────────────────────────────────────────────────

/// Lists nodes straight from the Kubernetes API.
///
/// Joins and departures show up on the next listing without any
/// outside process rewriting a file.
#[derive(Clone)]
pub struct KubeSource {
    nodes: Api<Node>,
}

impl KubeSource {
    pub fn new(client: kube::Client) -> Self {
        Self { nodes: Api::all(client) }
    }

    /// Connect with the in-cluster service account, falling back to the
    /// local kubeconfig.
    pub async fn try_default() -> Result<Self, TopologyError> {
        let client = kube::Client::try_default().await?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl NodeSource for KubeSource {
    async fn list_nodes(&self) -> Result<Vec<NodeRecord>, TopologyError> {
        let list = self.nodes.list(&ListParams::default()).await?;
        let nodes: Vec<NodeRecord> = list.items.into_iter().filter_map(record_from_node).collect();
        debug!(nodes = nodes.len(), "node list fetched from kubernetes");
        Ok(nodes)
    }
}

fn record_from_node(node: Node) -> Option<NodeRecord> {
    let name = node.metadata.name?;
    let addresses = node
        .status
        .and_then(|status| status.addresses)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|a| typed_address(&a.type_, a.address))
        .collect();
    Some(NodeRecord { name, addresses })
}
