//! Thread-safe replica store: the single source of truth for a node.
//!
//! The replica set and the provenance map live behind one lock so that the
//! membership check and the append of [`ReplicaStore::ingest`] happen in the
//! same critical section. Readers always get a copy, never a reference into
//! the store.

use crate::id::{NodeId, Value};
use crate::provenance::Provenance;
use crate::replica::{Element, ReplicaSet};
use parking_lot::RwLock;
use std::collections::BTreeSet;

/// Outcome of ingesting a single value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Ingested {
    /// The value was not known and has been appended.
    New,
    /// The value was already present; only provenance changed.
    Duplicate,
}

impl Ingested {
    pub fn is_new(self) -> bool {
        matches!(self, Ingested::New)
    }
}

#[derive(Debug)]
struct StoreState<V: Element> {
    replica: ReplicaSet<V>,
    provenance: Provenance<V>,
}

#[derive(Debug)]
pub struct ReplicaStore<V: Element = Value> {
    state: RwLock<StoreState<V>>,
}

impl<V: Element> ReplicaStore<V> {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(StoreState {
                replica: ReplicaSet::new(),
                provenance: Provenance::new(),
            }),
        }
    }

    pub fn contains(&self, value: &V) -> bool {
        self.state.read().replica.contains(value)
    }

    /// Append `value` without recording where it came from.
    /// Returns `false` if it was already present.
    pub fn append(&self, value: V) -> bool {
        self.state.write().replica.insert(value)
    }

    /// Full replica set in insertion order.
    pub fn snapshot(&self) -> Vec<V> {
        self.state.read().replica.as_slice().to_vec()
    }

    /// Full replica set as a lattice value.
    pub fn replica(&self) -> ReplicaSet<V> {
        self.state.read().replica.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().replica.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().replica.is_empty()
    }

    /// Admit `value` received from `source`.
    pub fn ingest(&self, value: V, source: &NodeId) -> Ingested {
        let mut state = self.state.write();
        let outcome = if state.replica.insert(value.clone()) {
            Ingested::New
        } else {
            Ingested::Duplicate
        };
        state.provenance.record(value, source);
        outcome
    }

    /// Admit a batch from one source under a single critical section.
    /// Returns the values that were not known before.
    pub fn ingest_all<I>(&self, values: I, source: &NodeId) -> Vec<V>
    where
        I: IntoIterator<Item = V>,
    {
        let mut state = self.state.write();
        let mut admitted = Vec::new();
        for value in values {
            if state.replica.insert(value.clone()) {
                admitted.push(value.clone());
            }
            state.provenance.record(value, source);
        }
        admitted
    }

    /// Record that `peer` acknowledged holding `values`. Values we do not
    /// hold ourselves are ignored. Returns how many entries were new.
    pub fn record_delivery(&self, peer: &NodeId, values: &[V]) -> usize {
        let mut state = self.state.write();
        let StoreState {
            replica,
            provenance,
        } = &mut *state;
        values
            .iter()
            .filter(|value| replica.contains(value))
            .filter(|value| provenance.record((*value).clone(), peer))
            .count()
    }

    /// Values not yet known to be held by `peer`, in replica order.
    pub fn unknown_to(&self, peer: &NodeId) -> Vec<V> {
        let state = self.state.read();
        state
            .replica
            .iter()
            .filter(|value| !state.provenance.is_known_to(value, peer))
            .cloned()
            .collect()
    }

    pub fn is_known_to(&self, value: &V, peer: &NodeId) -> bool {
        self.state.read().provenance.is_known_to(value, peer)
    }

    /// Peers known to hold `value`, if the value is stored at all.
    pub fn provenance(&self, value: &V) -> Option<BTreeSet<NodeId>> {
        let state = self.state.read();
        if !state.replica.contains(value) {
            return None;
        }
        Some(state.provenance.holders(value).cloned().unwrap_or_default())
    }
}

impl<V: Element> Default for ReplicaStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
