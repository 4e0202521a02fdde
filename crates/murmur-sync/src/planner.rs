//! Target and payload selection for both dissemination strategies.

use crate::strategy::{SyncPayload, SyncTargets};
use murmur_core::{NodeId, ReplicaStore, TopologyManager, Value};

/// One `sync` request to send in a round.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncPlan {
    pub peer: NodeId,
    pub messages: Vec<Value>,
}

/// Decides which peers a sync round contacts and what each one gets.
#[derive(Clone, Copy, Debug, Default)]
pub struct SyncPlanner {
    payload: SyncPayload,
    targets: SyncTargets,
}

impl SyncPlanner {
    pub fn new(payload: SyncPayload, targets: SyncTargets) -> Self {
        Self { payload, targets }
    }

    pub fn payload(&self) -> SyncPayload {
        self.payload
    }

    pub fn targets(&self) -> SyncTargets {
        self.targets
    }

    /// Peers this node syncs with, in a stable order.
    pub fn peers(&self, me: &NodeId, topology: &TopologyManager, cluster: &[NodeId]) -> Vec<NodeId> {
        let candidates = match self.targets {
            SyncTargets::Neighbors => topology.neighbors_of(me),
            SyncTargets::Cluster => cluster.to_vec(),
        };
        candidates.into_iter().filter(|peer| peer != me).collect()
    }

    /// Build this round's requests. Peers already known to hold every
    /// value are skipped.
    pub fn plan(
        &self,
        me: &NodeId,
        store: &ReplicaStore,
        topology: &TopologyManager,
        cluster: &[NodeId],
    ) -> Vec<SyncPlan> {
        let mut full: Option<Vec<Value>> = None;
        self.peers(me, topology, cluster)
            .into_iter()
            .filter_map(|peer| {
                let unknown = store.unknown_to(&peer);
                if unknown.is_empty() {
                    return None;
                }
                let messages = match self.payload {
                    SyncPayload::Delta => unknown,
                    SyncPayload::Full => full.get_or_insert_with(|| store.snapshot()).clone(),
                };
                Some(SyncPlan { peer, messages })
            })
            .collect()
    }
}

/// Neighbors that should receive `value` by flooding: everyone adjacent
/// except the node it came from and peers already known to hold it.
pub fn flood_targets(
    me: &NodeId,
    value: &Value,
    source: &NodeId,
    store: &ReplicaStore,
    topology: &TopologyManager,
) -> Vec<NodeId> {
    topology
        .neighbors_of(me)
        .into_iter()
        .filter(|peer| peer != me && peer != source)
        .filter(|peer| !store.is_known_to(value, peer))
        .collect()
}

/// Relay requests for freshly admitted `values`. Each target is a neighbor
/// [`flood_targets`] picks for at least one of them, and it receives every
/// value it is not yet known to hold, so values from earlier relays that
/// were lost or skipped ride along with the new ones.
pub fn relay_plan(
    me: &NodeId,
    values: &[Value],
    source: &NodeId,
    store: &ReplicaStore,
    topology: &TopologyManager,
) -> Vec<SyncPlan> {
    let mut targets: Vec<NodeId> = Vec::new();
    for value in values {
        for peer in flood_targets(me, value, source, store, topology) {
            if !targets.contains(&peer) {
                targets.push(peer);
            }
        }
    }
    targets
        .into_iter()
        .filter_map(|peer| {
            let messages = store.unknown_to(&peer);
            (!messages.is_empty()).then_some(SyncPlan { peer, messages })
        })
        .collect()
}
