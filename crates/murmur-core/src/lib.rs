// File: `crates/murmur-core/src/lib.rs`
//! Core state of a Murmur node: the replica set, who is known to hold
//! each value, and the neighbor map handed out by the cluster controller.

pub mod id;
pub mod lattice;
pub mod provenance;
pub mod replica;
pub mod store;
pub mod topology;

pub use id::{NodeId, Value};
pub use lattice::Lattice;
pub use provenance::Provenance;
pub use replica::{Element, ReplicaSet};
pub use store::{Ingested, ReplicaStore};
pub use topology::{Topology, TopologyManager};
