//! netlag-topology — who else is in the cluster.
//!
//! A [`NodeSource`] lists raw cluster nodes; [`Topology`] turns that
//! listing into the peers this node should probe.
//!
//! # Architecture
//!
//! ```text
//! Topology
//!   ├── NodeSource (trait)
//!   │   ├── StaticSource  ← "name=addr,..." from config
//!   │   ├── FileSource    ← node list JSON, re-read on every call
//!   │   └── KubeSource    ← Kubernetes API node list
//!   ├── list_peers(exclude) → Vec<PeerNode>
//!   └── resolve_self(address) → node name
//! ```
//!
//! Control-plane nodes (names containing `master` or `control-plane`)
//! are never peers. Nodes without an address of the configured
//! [`AddressType`] are skipped.

pub mod error;
pub mod source;
pub mod topology;

pub use error::TopologyError;
pub use source::{AddressType, FileSource, KubeSource, NodeAddress, NodeRecord, NodeSource, StaticSource};
pub use topology::Topology;
