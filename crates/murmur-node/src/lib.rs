//! Murmur node - a leaderless broadcast replica
//!
//! A node accepts integer values from clients, stores each at most once,
//! answers reads from its local replica, and spreads every value to the rest
//! of the cluster by flooding new values to its neighbors and running
//! periodic anti-entropy sync rounds.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use murmur_node::{Client, MemoryNetwork, NodeConfig, Topology};
//!
//! # async fn demo() -> murmur_node::Result<()> {
//! let network = MemoryNetwork::new();
//! let ids: Vec<murmur_node::NodeId> = vec!["n0".into(), "n1".into(), "n2".into()];
//! for id in &ids {
//!     network.spawn_node(id.clone(), ids.clone(), NodeConfig::default());
//! }
//!
//! let client = Client::connect(&network, "c1");
//! client.assign_topology(&Topology::line(&ids)).await?;
//! client.broadcast(&ids[0], 42).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`] - Envelope, body and payload wire types
//! - [`transport`] - The transport seam and request/reply correlation
//! - [`stdio`] - Line-delimited JSON over stdin/stdout
//! - [`memory`] - In-process network for tests and simulation
//! - [`node`] - Message handlers over the replica store
//! - [`disseminator`] - Sync rounds and flood fan-out
//! - [`runtime`] - Message loop and process bootstrap
//! - [`client`] - Workload client
//! - [`config`] - Node configuration
//! - [`error`] - Error types

pub mod client;
pub mod config;
pub mod disseminator;
pub mod error;
pub mod memory;
pub mod node;
pub mod protocol;
pub mod runtime;
pub mod stdio;
pub mod transport;

pub use client::Client;
pub use config::{NodeConfig, NodeConfigBuilder};
pub use disseminator::{Disseminator, RoundReport};
pub use error::{NodeError, Result, TransportError};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use node::Node;
pub use protocol::{Body, Envelope, ErrorCode, Payload};
pub use runtime::{await_init, run, serve, serve_stdio, Init};
pub use stdio::StdioTransport;
pub use transport::{Endpoint, Transport};

pub use murmur_core::{NodeId, Topology, Value};
pub use murmur_sync::{Strategy, SyncPayload, SyncTargets};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::Client;
    pub use crate::config::NodeConfig;
    pub use crate::error::NodeError;
    pub use crate::memory::MemoryNetwork;
    pub use crate::node::Node;
    pub use crate::transport::Transport;
    pub use murmur_core::{NodeId, Topology, Value};
    pub use murmur_sync::Strategy;
}
