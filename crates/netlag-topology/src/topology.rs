//! Peer filtering on top of a node source.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use netlag_core::PeerNode;

use crate::error::TopologyError;
use crate::source::{AddressType, NodeRecord, NodeSource};

/// Turns raw node listings into probe targets.
#[derive(Clone)]
pub struct Topology {
    source: Arc<dyn NodeSource>,
    address_type: AddressType,
}

impl Topology {
    pub fn new(source: Arc<dyn NodeSource>) -> Self {
        Self {
            source,
            address_type: AddressType::default(),
        }
    }

    /// Probe peers on this address type instead of the internal one.
    pub fn with_address_type(mut self, address_type: AddressType) -> Self {
        self.address_type = address_type;
        self
    }

    pub fn address_type(&self) -> AddressType {
        self.address_type
    }

    /// List probe targets, excluding the node at `exclude`.
    ///
    /// Control-plane nodes and nodes without a usable address are
    /// dropped. Peers are unique by address; the first listing wins.
    pub async fn list_peers(&self, exclude: &str) -> Result<Vec<PeerNode>, TopologyError> {
        let nodes = self.source.list_nodes().await?;
        Ok(self.peers_from(&nodes, exclude))
    }

    /// Find the name of the node that owns `address`, if it is listed.
    pub async fn resolve_self(&self, address: &str) -> Result<Option<String>, TopologyError> {
        let nodes = self.source.list_nodes().await?;
        Ok(nodes
            .into_iter()
            .find(|n| n.address(self.address_type) == Some(address))
            .map(|n| n.name))
    }

    fn peers_from(&self, nodes: &[NodeRecord], exclude: &str) -> Vec<PeerNode> {
        let mut seen = HashSet::new();
        let mut peers = Vec::with_capacity(nodes.len());

        for node in nodes {
            if node.is_control_plane() {
                continue;
            }
            let Some(address) = node.address(self.address_type) else {
                debug!(node = %node.name, address_type = %self.address_type, "node has no usable address, skipping");
                continue;
            };
            if address == exclude || !seen.insert(address.to_string()) {
                continue;
            }
            peers.push(PeerNode::new(node.name.clone(), address));
        }

        peers
    }
}
