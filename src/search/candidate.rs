use std::cmp::Ordering;

use rand::Rng;

use crate::config::SelectionPolicy;
use crate::rng::SeededRng;
use crate::types::{Edge, VarId};

/// A scored move: apply the operator to `edge` with auxiliary set `subset`.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCandidate {
    /// Pair the move acts on.
    pub edge: Edge,
    /// Score change the move yields.
    pub delta: f64,
    /// `T` for insertions, `H` for deletions.
    pub subset: Vec<VarId>,
}

impl EdgeCandidate {
    /// Best first; equal deltas fall back to edge order so ranking is total.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .delta
            .total_cmp(&self.delta)
            .then_with(|| self.edge.cmp(&other.edge))
    }
}

/// Bounded best-of store keeping the `capacity` highest-scoring candidates.
#[derive(Debug, Clone)]
pub struct BestEdges {
    capacity: usize,
    entries: Vec<EdgeCandidate>,
}

impl BestEdges {
    /// Keeps at most `capacity` candidates.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Vec::with_capacity(capacity.max(1) + 1),
        }
    }

    /// Offers a candidate; it is kept only while it ranks in the top K.
    pub fn offer(&mut self, candidate: EdgeCandidate) {
        let at = self
            .entries
            .partition_point(|kept| kept.rank(&candidate) == Ordering::Less);
        if at >= self.capacity {
            return;
        }
        self.entries.insert(at, candidate);
        self.entries.truncate(self.capacity);
    }

    /// Candidates retained.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Nothing retained yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidates in rank order.
    pub fn as_slice(&self) -> &[EdgeCandidate] {
        &self.entries
    }

    /// Takes the winner according to `policy`.
    pub fn select(mut self, policy: SelectionPolicy, rng: &mut SeededRng) -> Option<EdgeCandidate> {
        if self.entries.is_empty() {
            return None;
        }
        let index = match policy {
            SelectionPolicy::Greedy => 0,
            SelectionPolicy::Randomized => rng.gen_range(0..self.entries.len()),
        };
        Some(self.entries.swap_remove(index))
    }
}
