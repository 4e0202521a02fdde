//! Neighbor map assigned by the cluster controller.

use crate::id::NodeId;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

/// Adjacency map: node → ordered neighbors.
///
/// Neighbor lists are normalized on construction: duplicates collapse to
/// their first occurrence and self-loops are dropped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<NodeId, Vec<NodeId>>", into = "BTreeMap<NodeId, Vec<NodeId>>")]
pub struct Topology {
    neighbors: BTreeMap<NodeId, Vec<NodeId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn neighbors_of(&self, node: &NodeId) -> &[NodeId] {
        self.neighbors.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeId> {
        self.neighbors.keys()
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Total number of directed edges.
    pub fn edge_count(&self) -> usize {
        self.neighbors.values().map(Vec::len).sum()
    }

    /// Every node can reach every other node along directed edges.
    pub fn is_connected(&self) -> bool {
        let Some(start) = self.neighbors.keys().next() else {
            return true;
        };
        let mut seen: HashSet<&NodeId> = HashSet::from([start]);
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            for next in self.neighbors_of(node) {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
        self.neighbors.keys().all(|node| seen.contains(node))
    }

    /// Each node linked to its predecessor and successor.
    pub fn line(nodes: &[NodeId]) -> Self {
        let mut map = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            let mut adjacent = Vec::new();
            if i > 0 {
                adjacent.push(nodes[i - 1].clone());
            }
            if i + 1 < nodes.len() {
                adjacent.push(nodes[i + 1].clone());
            }
            map.insert(node.clone(), adjacent);
        }
        map.into()
    }

    /// A line whose ends are joined.
    pub fn ring(nodes: &[NodeId]) -> Self {
        let count = nodes.len();
        let map: BTreeMap<_, _> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let prev = nodes[(i + count - 1) % count].clone();
                let next = nodes[(i + 1) % count].clone();
                (node.clone(), vec![prev, next])
            })
            .collect();
        map.into()
    }

    /// The first node is the hub, every other node is a spoke.
    pub fn star(nodes: &[NodeId]) -> Self {
        let Some((hub, spokes)) = nodes.split_first() else {
            return Self::new();
        };
        let mut map = BTreeMap::new();
        map.insert(hub.clone(), spokes.to_vec());
        for spoke in spokes {
            map.insert(spoke.clone(), vec![hub.clone()]);
        }
        map.into()
    }

    /// Every node is a neighbor of every other node.
    pub fn mesh(nodes: &[NodeId]) -> Self {
        let map: BTreeMap<_, _> = nodes
            .iter()
            .map(|node| (node.clone(), nodes.to_vec()))
            .collect();
        map.into()
    }
}

impl From<BTreeMap<NodeId, Vec<NodeId>>> for Topology {
    fn from(map: BTreeMap<NodeId, Vec<NodeId>>) -> Self {
        let neighbors = map
            .into_iter()
            .map(|(node, adjacent)| {
                let mut seen = HashSet::new();
                let adjacent = adjacent
                    .into_iter()
                    .filter(|peer| *peer != node && seen.insert(peer.clone()))
                    .collect();
                (node, adjacent)
            })
            .collect();
        Self { neighbors }
    }
}

impl From<Topology> for BTreeMap<NodeId, Vec<NodeId>> {
    fn from(topology: Topology) -> Self {
        topology.neighbors
    }
}

/// Shared holder for the current topology.
///
/// A node does no dissemination until a topology has been assigned, so
/// [`TopologyManager::is_assigned`] doubles as the initialization barrier.
/// Reassignment is allowed and is guarded like every other write.
#[derive(Debug, Default)]
pub struct TopologyManager {
    current: RwLock<Option<Arc<Topology>>>,
}

impl TopologyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the neighbor map, returning the previous one.
    pub fn assign(&self, topology: Topology) -> Option<Arc<Topology>> {
        self.current.write().replace(Arc::new(topology))
    }

    pub fn is_assigned(&self) -> bool {
        self.current.read().is_some()
    }

    pub fn current(&self) -> Option<Arc<Topology>> {
        self.current.read().clone()
    }

    /// Neighbors of `node`; empty when unassigned or unknown.
    pub fn neighbors_of(&self, node: &NodeId) -> Vec<NodeId> {
        self.current
            .read()
            .as_ref()
            .map(|topology| topology.neighbors_of(node).to_vec())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(names: &[&str]) -> Vec<NodeId> {
        names.iter().map(|n| NodeId::from(*n)).collect()
    }

    #[test]
    fn parses_controller_payload_and_normalizes() {
        let topology: Topology =
            serde_json::from_str(r#"{"n0":["n1","n2","n1","n0"],"n1":["n0"],"n2":["n0"]}"#)
                .unwrap();

        assert_eq!(topology.neighbors_of(&"n0".into()), ids(&["n1", "n2"]).as_slice());
        assert_eq!(topology.neighbors_of(&"n9".into()), &[] as &[NodeId]);
        assert_eq!(topology.len(), 3);
        assert_eq!(topology.edge_count(), 4);
        assert!(topology.is_connected());
    }

    #[test]
    fn shapes_are_connected() {
        let nodes = ids(&["n0", "n1", "n2", "n3", "n4"]);
        for topology in [
            Topology::line(&nodes),
            Topology::ring(&nodes),
            Topology::star(&nodes),
            Topology::mesh(&nodes),
        ] {
            assert_eq!(topology.len(), 5);
            assert!(topology.is_connected());
        }
        assert_eq!(Topology::line(&nodes).edge_count(), 8);
        assert_eq!(Topology::mesh(&nodes).edge_count(), 20);
    }

    #[test]
    fn disconnected_topology_is_detected() {
        let topology: Topology =
            serde_json::from_str(r#"{"n0":["n1"],"n1":["n0"],"n2":[]}"#).unwrap();
        assert!(!topology.is_connected());
    }

    #[test]
    fn manager_starts_unassigned() {
        let manager = TopologyManager::new();
        assert!(!manager.is_assigned());
        assert!(manager.neighbors_of(&"n0".into()).is_empty());

        let nodes = ids(&["n0", "n1", "n2"]);
        assert!(manager.assign(Topology::star(&nodes)).is_none());
        assert!(manager.is_assigned());
        assert_eq!(manager.neighbors_of(&"n0".into()), ids(&["n1", "n2"]));

        let previous = manager.assign(Topology::line(&nodes)).unwrap();
        assert_eq!(previous.neighbors_of(&"n2".into()), ids(&["n0"]).as_slice());
        assert_eq!(manager.neighbors_of(&"n2".into()), ids(&["n1"]));
    }
}
