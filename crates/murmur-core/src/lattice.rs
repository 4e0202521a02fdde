//! Join-semilattice trait used to reason about replica convergence.
//!
//! A join-semilattice (S, ⊔) satisfies:
//! - Commutativity: a ⊔ b = b ⊔ a
//! - Associativity: (a ⊔ b) ⊔ c = a ⊔ (b ⊔ c)
//! - Idempotence:  a ⊔ a = a
//!
//! Replica sets only grow, so every dissemination step moves a replica up
//! the lattice. Two replicas have converged once each is below the other.

/// State that can only move upwards by joining with other states.
///
/// Equality in the lattice is expressed through [`Lattice::leq`] rather than
/// `PartialEq`, since two replicas holding the same values may have admitted
/// them in different orders.
pub trait Lattice: Clone {
    /// The bottom element (identity for join)
    fn bottom() -> Self;

    /// Join operation (least upper bound)
    fn join(&self, other: &Self) -> Self;

    /// Lattice order: `self ≤ other` iff everything in `self` is in `other`
    fn leq(&self, other: &Self) -> bool;

    /// Join-assign: self = self ⊔ other
    fn join_assign(&mut self, other: &Self) {
        *self = self.join(other);
    }

    /// Both replicas hold exactly the same information.
    fn converged_with(&self, other: &Self) -> bool {
        self.leq(other) && other.leq(self)
    }
}
