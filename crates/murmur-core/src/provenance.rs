//! Which peers are known to already hold which values.
//!
//! Entries only ever grow: once a peer has acknowledged a value (or sent it
//! to us) we never send it to that peer again.

use crate::id::NodeId;
use crate::replica::Element;
use std::collections::{BTreeSet, HashMap};

#[derive(Clone, Debug)]
pub struct Provenance<V: Element> {
    holders: HashMap<V, BTreeSet<NodeId>>,
}

impl<V: Element> Provenance<V> {
    pub fn new() -> Self {
        Self {
            holders: HashMap::new(),
        }
    }

    /// Note that `peer` holds `value`. Returns `true` if this is new information.
    pub fn record(&mut self, value: V, peer: &NodeId) -> bool {
        let holders = self.holders.entry(value).or_default();
        if holders.contains(peer) {
            return false;
        }
        holders.insert(peer.clone())
    }

    pub fn holders(&self, value: &V) -> Option<&BTreeSet<NodeId>> {
        self.holders.get(value)
    }

    pub fn is_known_to(&self, value: &V, peer: &NodeId) -> bool {
        self.holders
            .get(value)
            .is_some_and(|holders| holders.contains(peer))
    }

    /// Number of values with at least one recorded holder.
    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }
}

impl<V: Element> Default for Provenance<V> {
    fn default() -> Self {
        Self::new()
    }
}
