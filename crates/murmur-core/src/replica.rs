//! Append-only, insertion-ordered replica set.
//! Values can only be added, never removed.

use crate::lattice::Lattice;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;

/// Anything that can be stored in a replica set.
pub trait Element: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T: Clone + Eq + Hash + Debug + Send + Sync + 'static> Element for T {}

/// Insertion-ordered set with an O(1) membership index.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(from = "Vec<V>", into = "Vec<V>")]
#[serde(bound(serialize = "V: Element + Serialize", deserialize = "V: Element + Deserialize<'de>"))]
pub struct ReplicaSet<V: Element> {
    order: Vec<V>,
    index: HashSet<V>,
}

impl<V: Element> ReplicaSet<V> {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            index: HashSet::new(),
        }
    }

    /// Add a value (the only mutation allowed). Returns `false` if it was
    /// already present.
    pub fn insert(&mut self, value: V) -> bool {
        if !self.index.insert(value.clone()) {
            return false;
        }
        self.order.push(value);
        true
    }

    pub fn contains(&self, value: &V) -> bool {
        self.index.contains(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = &V> {
        self.order.iter()
    }

    pub fn as_slice(&self) -> &[V] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl<V: Element> Default for ReplicaSet<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Element> FromIterator<V> for ReplicaSet<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

impl<V: Element> Extend<V> for ReplicaSet<V> {
    fn extend<I: IntoIterator<Item = V>>(&mut self, iter: I) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl<V: Element> From<Vec<V>> for ReplicaSet<V> {
    fn from(values: Vec<V>) -> Self {
        values.into_iter().collect()
    }
}

impl<V: Element> From<ReplicaSet<V>> for Vec<V> {
    fn from(set: ReplicaSet<V>) -> Self {
        set.order
    }
}

impl<V: Element> Lattice for ReplicaSet<V> {
    fn bottom() -> Self {
        Self::new()
    }

    // Keeps our order, then appends what only `other` has in its order.
    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        joined.extend(other.iter().cloned());
        joined
    }

    fn leq(&self, other: &Self) -> bool {
        self.len() <= other.len() && self.iter().all(|v| other.contains(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_first_position() {
        let mut set = ReplicaSet::new();
        assert!(set.insert(3));
        assert!(set.insert(1));
        assert!(!set.insert(3));
        assert!(set.insert(2));

        assert_eq!(set.as_slice(), &[3, 1, 2]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn join_preserves_receiver_order() {
        let a: ReplicaSet<i64> = vec![1, 2].into();
        let b: ReplicaSet<i64> = vec![4, 2, 3].into();

        assert_eq!(a.join(&b).as_slice(), &[1, 2, 4, 3]);
        assert_eq!(b.join(&a).as_slice(), &[4, 2, 3, 1]);
        assert!(a.join(&b).converged_with(&b.join(&a)));
    }

    #[test]
    fn leq_ignores_order() {
        let a: ReplicaSet<i64> = vec![1, 2].into();
        let b: ReplicaSet<i64> = vec![2, 1].into();
        let c: ReplicaSet<i64> = vec![2, 1, 5].into();

        assert!(a.converged_with(&b));
        assert!(a.leq(&c));
        assert!(!c.leq(&a));
        assert!(ReplicaSet::bottom().leq(&a));
    }

    #[test]
    fn serializes_as_plain_sequence() {
        let set: ReplicaSet<i64> = vec![7, 8, 7].into();
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, "[7,8]");

        let back: ReplicaSet<i64> = serde_json::from_str("[1,1,2]").unwrap();
        assert_eq!(back.as_slice(), &[1, 2]);
    }
}
