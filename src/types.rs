//! Identifier types shared by the graph, scoring and search layers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable 0-based index of a variable in the dataset.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct VarId(pub u32);

impl VarId {
    /// Returns the index as `usize` for slice access.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Builds an id from a slice index.
    #[inline]
    pub fn from_index(index: usize) -> Self {
        VarId(index as u32)
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VarId {
    fn from(value: u32) -> Self {
        VarId(value)
    }
}

impl From<VarId> for u32 {
    fn from(value: VarId) -> Self {
        value.0
    }
}

/// A directed candidate edge `from -> to`.
///
/// Candidate sets, partitions and operator arguments are expressed with this
/// type; the graph itself stores endpoint marks (see [`crate::graph::Pdag`]).
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, Serialize, Deserialize)]
pub struct Edge {
    /// Tail of the edge.
    pub from: VarId,
    /// Head of the edge.
    pub to: VarId,
}

impl Edge {
    /// Creates the edge `from -> to`.
    pub fn new(from: VarId, to: VarId) -> Self {
        Self { from, to }
    }

    /// Returns the same pair pointing the other way.
    pub fn reversed(self) -> Self {
        Self {
            from: self.to,
            to: self.from,
        }
    }

    /// Returns true if `var` is one of the endpoints.
    pub fn touches(self, var: VarId) -> bool {
        self.from == var || self.to == var
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.from, self.to)
    }
}

/// Every ordered pair `(a, b)` with `a != b` over `n` variables, in index order.
pub fn all_arcs(n: usize) -> Vec<Edge> {
    let mut arcs = Vec::with_capacity(n.saturating_mul(n.saturating_sub(1)));
    for a in 0..n {
        for b in 0..n {
            if a != b {
                arcs.push(Edge::new(VarId::from_index(a), VarId::from_index(b)));
            }
        }
    }
    arcs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_arcs_covers_ordered_pairs() {
        let arcs = all_arcs(4);
        assert_eq!(arcs.len(), 12);
        assert!(arcs.contains(&Edge::new(VarId(3), VarId(0))));
        assert!(!arcs.iter().any(|e| e.from == e.to));
    }

    #[test]
    fn reversed_swaps_endpoints() {
        let e = Edge::new(VarId(1), VarId(2));
        assert_eq!(e.reversed(), Edge::new(VarId(2), VarId(1)));
        assert!(e.touches(VarId(2)));
        assert!(!e.touches(VarId(0)));
    }
}
