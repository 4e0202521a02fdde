//! Deterministic in-process cluster for exercising dissemination.
//!
//! Every simulated node owns a real [`ReplicaStore`] and uses the same
//! planners as a live node; only the network is replaced by a queue that
//! can lose, duplicate and reorder messages, and cut nodes off entirely.
//!
//! A round looks like this:
//! 1. each node plans its `sync` requests from its own provenance,
//! 2. receivers ingest the values and answer with `sync_ok`,
//! 3. senders extend provenance for the acknowledged values.
//!
//! Flooding is simulated message by message: a node that admits a new
//! value from `broadcast` relays it to every neighbor except the sender,
//! together with anything that neighbor has not acknowledged yet.

use crate::planner::{relay_plan, SyncPlanner};
use crate::strategy::Strategy;
use murmur_core::{Lattice, NodeId, ReplicaStore, Topology, TopologyManager, Value};
use std::collections::{HashMap, HashSet, VecDeque};

/// Messages exchanged between simulated nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimMessage {
    Sync { from: NodeId, to: NodeId, messages: Vec<Value> },
    SyncOk { from: NodeId, to: NodeId, messages: Vec<Value> },
    Broadcast { from: NodeId, to: NodeId, message: Value },
    BroadcastOk { from: NodeId, to: NodeId, message: Value },
}

impl SimMessage {
    pub fn from(&self) -> &NodeId {
        match self {
            SimMessage::Sync { from, .. }
            | SimMessage::SyncOk { from, .. }
            | SimMessage::Broadcast { from, .. }
            | SimMessage::BroadcastOk { from, .. } => from,
        }
    }

    pub fn to(&self) -> &NodeId {
        match self {
            SimMessage::Sync { to, .. }
            | SimMessage::SyncOk { to, .. }
            | SimMessage::Broadcast { to, .. }
            | SimMessage::BroadcastOk { to, .. } => to,
        }
    }
}

/// Fault injection knobs.
#[derive(Debug, Clone, Default)]
pub struct NetworkConfig {
    /// Probability of message loss (0.0 - 1.0)
    pub loss_rate: f64,
    /// Probability of message duplication (0.0 - 1.0)
    pub dup_rate: f64,
    /// Probability of message reordering (0.0 - 1.0)
    pub reorder_rate: f64,
}

impl NetworkConfig {
    pub fn lossy(loss_rate: f64) -> Self {
        Self {
            loss_rate,
            ..Default::default()
        }
    }

    pub fn with_dups(dup_rate: f64) -> Self {
        Self {
            dup_rate,
            ..Default::default()
        }
    }

    /// Loss, duplication and reordering all at once.
    pub fn chaotic() -> Self {
        Self {
            loss_rate: 0.1,
            dup_rate: 0.2,
            reorder_rate: 0.3,
        }
    }
}

/// Message queue with seeded fault injection.
#[derive(Debug)]
pub struct NetworkSimulator {
    in_flight: VecDeque<SimMessage>,
    lost: Vec<SimMessage>,
    isolated: HashSet<NodeId>,
    config: NetworkConfig,
    rng_state: u64,
    sent: u64,
    unreachable: u64,
}

impl NetworkSimulator {
    pub fn new(config: NetworkConfig) -> Self {
        Self::with_seed(config, 12345)
    }

    pub fn with_seed(config: NetworkConfig, seed: u64) -> Self {
        Self {
            in_flight: VecDeque::new(),
            lost: Vec::new(),
            isolated: HashSet::new(),
            config,
            rng_state: seed,
            sent: 0,
            unreachable: 0,
        }
    }

    // LCG; good enough for fault injection and fully reproducible.
    fn next_random(&mut self) -> f64 {
        self.rng_state = self
            .rng_state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.rng_state >> 33) as f64 / (1u64 << 31) as f64
    }

    /// Queue a message. Returns `false` if either end is isolated; such
    /// messages are discarded, not kept for retransmission.
    pub fn send(&mut self, msg: SimMessage) -> bool {
        if self.isolated.contains(msg.from()) || self.isolated.contains(msg.to()) {
            self.unreachable += 1;
            return false;
        }
        self.sent += 1;

        if self.next_random() < self.config.loss_rate {
            self.lost.push(msg);
            return true;
        }

        if self.next_random() < self.config.dup_rate {
            self.in_flight.push_back(msg.clone());
        }

        if !self.in_flight.is_empty() && self.next_random() < self.config.reorder_rate {
            let pos = (self.next_random() * self.in_flight.len() as f64) as usize;
            self.in_flight.insert(pos.min(self.in_flight.len()), msg);
        } else {
            self.in_flight.push_back(msg);
        }
        true
    }

    pub fn receive(&mut self) -> Option<SimMessage> {
        self.in_flight.pop_front()
    }

    /// Put every lost message back on the wire.
    pub fn retransmit_lost(&mut self) {
        self.in_flight.extend(self.lost.drain(..));
    }

    pub fn isolate(&mut self, node: NodeId) {
        self.isolated.insert(node);
    }

    pub fn heal(&mut self, node: &NodeId) {
        self.isolated.remove(node);
    }

    pub fn is_isolated(&self, node: &NodeId) -> bool {
        self.isolated.contains(node)
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost.len()
    }

    /// Messages accepted onto the wire (including ones later lost).
    pub fn sent_count(&self) -> u64 {
        self.sent
    }

    /// Messages refused because an endpoint was isolated.
    pub fn unreachable_count(&self) -> u64 {
        self.unreachable
    }
}

#[derive(Debug)]
struct SimNode {
    id: NodeId,
    store: ReplicaStore,
}

/// A whole cluster sharing one topology and one strategy.
#[derive(Debug)]
pub struct ClusterSimulator {
    nodes: Vec<SimNode>,
    index: HashMap<NodeId, usize>,
    ids: Vec<NodeId>,
    topology: TopologyManager,
    planner: SyncPlanner,
    strategy: Strategy,
    client: NodeId,
    network: NetworkSimulator,
}

impl ClusterSimulator {
    /// Nodes named `n0..n{count}`.
    pub fn node_ids(count: usize) -> Vec<NodeId> {
        (0..count).map(|i| NodeId::new(format!("n{}", i))).collect()
    }

    pub fn new(
        ids: Vec<NodeId>,
        topology: Topology,
        strategy: Strategy,
        planner: SyncPlanner,
        config: NetworkConfig,
    ) -> Self {
        let nodes = ids
            .iter()
            .map(|id| SimNode {
                id: id.clone(),
                store: ReplicaStore::new(),
            })
            .collect();
        let index = ids.iter().cloned().enumerate().map(|(i, id)| (id, i)).collect();
        let manager = TopologyManager::new();
        manager.assign(topology);
        Self {
            nodes,
            index,
            ids,
            topology: manager,
            planner,
            strategy,
            client: NodeId::new("c0"),
            network: NetworkSimulator::new(config),
        }
    }

    /// `count` fully meshed nodes syncing deltas on every round.
    pub fn mesh(count: usize, config: NetworkConfig) -> Self {
        let ids = Self::node_ids(count);
        let topology = Topology::mesh(&ids);
        Self::new(ids, topology, Strategy::AntiEntropy, SyncPlanner::default(), config)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn id(&self, idx: usize) -> &NodeId {
        &self.nodes[idx].id
    }

    pub fn store(&self, idx: usize) -> &ReplicaStore {
        &self.nodes[idx].store
    }

    /// What a `read` on node `idx` would return.
    pub fn read(&self, idx: usize) -> Vec<Value> {
        self.nodes[idx].store.snapshot()
    }

    pub fn network(&self) -> &NetworkSimulator {
        &self.network
    }

    pub fn isolate(&mut self, idx: usize) {
        let id = self.nodes[idx].id.clone();
        self.network.isolate(id);
    }

    pub fn heal(&mut self, idx: usize) {
        let id = self.nodes[idx].id.clone();
        self.network.heal(&id);
    }

    /// A client broadcast delivered to node `idx`.
    pub fn broadcast(&mut self, idx: usize, value: Value) {
        let client = self.client.clone();
        let to = self.nodes[idx].id.clone();
        let admitted = self.nodes[idx].store.ingest(value, &client);
        if admitted.is_new() && self.strategy.floods() {
            self.relay(&to, &[value], &client);
        }
    }

    fn relay(&mut self, from: &NodeId, values: &[Value], source: &NodeId) {
        let Some(&idx) = self.index.get(from) else {
            return;
        };
        for plan in relay_plan(from, values, source, &self.nodes[idx].store, &self.topology) {
            let msg = match plan.messages.as_slice() {
                [message] => SimMessage::Broadcast {
                    from: from.clone(),
                    to: plan.peer,
                    message: *message,
                },
                _ => SimMessage::Sync {
                    from: from.clone(),
                    to: plan.peer,
                    messages: plan.messages,
                },
            };
            self.network.send(msg);
        }
    }

    /// Queue every node's sync requests for one round.
    pub fn start_sync_round(&mut self) {
        if !self.strategy.syncs() {
            return;
        }
        for node in &self.nodes {
            for plan in self.planner.plan(&node.id, &node.store, &self.topology, &self.ids) {
                self.network.send(SimMessage::Sync {
                    from: node.id.clone(),
                    to: plan.peer,
                    messages: plan.messages,
                });
            }
        }
    }

    /// One full round: plan, deliver and acknowledge.
    pub fn sync_round(&mut self) {
        self.start_sync_round();
        self.drain_network();
    }

    /// Deliver one message. Returns `false` when the network is empty.
    pub fn process_one(&mut self) -> bool {
        let Some(msg) = self.network.receive() else {
            return false;
        };
        let Some(&to_idx) = self.index.get(msg.to()) else {
            return true;
        };

        match msg {
            SimMessage::Sync { from, to, messages } => {
                let admitted = self.nodes[to_idx].store.ingest_all(messages.iter().copied(), &from);
                self.network.send(SimMessage::SyncOk {
                    from: to.clone(),
                    to: from.clone(),
                    messages,
                });
                if !admitted.is_empty() && self.strategy.relays_synced() {
                    self.relay(&to, &admitted, &from);
                }
            }
            SimMessage::SyncOk { from, messages, .. } => {
                self.nodes[to_idx].store.record_delivery(&from, &messages);
            }
            SimMessage::Broadcast { from, to, message } => {
                let admitted = self.nodes[to_idx].store.ingest(message, &from);
                self.network.send(SimMessage::BroadcastOk {
                    from: to.clone(),
                    to: from.clone(),
                    message,
                });
                if admitted.is_new() && self.strategy.floods() {
                    self.relay(&to, &[message], &from);
                }
            }
            SimMessage::BroadcastOk { from, message, .. } => {
                self.nodes[to_idx].store.record_delivery(&from, &[message]);
            }
        }
        true
    }

    pub fn drain_network(&mut self) {
        while self.process_one() {}
    }

    pub fn retransmit_and_process(&mut self) {
        self.network.retransmit_lost();
        self.drain_network();
    }

    /// Every node holds the same set of values.
    pub fn is_converged(&self) -> bool {
        let Some((first, rest)) = self.nodes.split_first() else {
            return true;
        };
        let reference = first.store.replica();
        rest.iter()
            .all(|node| node.store.replica().converged_with(&reference))
    }

    /// Run sync rounds until converged or `max_rounds` is hit.
    /// Returns the number of rounds run.
    pub fn run_until_converged(&mut self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while !self.is_converged() && rounds < max_rounds {
            self.sync_round();
            rounds += 1;
        }
        rounds
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_simulator_basic() {
        let mut net = NetworkSimulator::new(NetworkConfig::default());
        assert!(net.send(SimMessage::Sync {
            from: "n0".into(),
            to: "n1".into(),
            messages: vec![42],
        }));
        assert_eq!(net.in_flight_count(), 1);

        match net.receive().unwrap() {
            SimMessage::Sync { messages, .. } => assert_eq!(messages, vec![42]),
            other => panic!("expected sync, got {:?}", other),
        }
        assert!(net.is_empty());
    }

    #[test]
    fn isolated_endpoints_refuse_messages() {
        let mut net = NetworkSimulator::new(NetworkConfig::default());
        net.isolate("n1".into());

        assert!(!net.send(SimMessage::BroadcastOk {
            from: "n1".into(),
            to: "n0".into(),
            message: 1,
        }));
        assert_eq!(net.unreachable_count(), 1);
        assert_eq!(net.sent_count(), 0);

        net.heal(&"n1".into());
        assert!(net.send(SimMessage::BroadcastOk {
            from: "n1".into(),
            to: "n0".into(),
            message: 1,
        }));
    }

    #[test]
    fn star_scenario_converges_in_one_round() {
        let ids = ClusterSimulator::node_ids(3);
        let topology = Topology::star(&ids);
        let mut cluster = ClusterSimulator::new(
            ids,
            topology,
            Strategy::AntiEntropy,
            SyncPlanner::default(),
            NetworkConfig::default(),
        );

        cluster.broadcast(0, 5);
        assert_eq!(cluster.read(0), vec![5]);
        assert!(cluster.read(1).is_empty());

        cluster.sync_round();
        assert_eq!(cluster.read(1), vec![5]);
        assert_eq!(cluster.read(2), vec![5]);
        assert!(cluster.is_converged());
    }

    #[test]
    fn acknowledged_values_are_not_resent() {
        let mut cluster = ClusterSimulator::mesh(2, NetworkConfig::default());
        cluster.broadcast(0, 1);
        cluster.sync_round();
        let sent = cluster.network().sent_count();

        cluster.sync_round();
        assert_eq!(cluster.network().sent_count(), sent);
    }
}
