//! Strategies that split the candidate-edge universe across workers.

mod hierarchical;
mod random;

use std::collections::BTreeSet;

use crate::rng::SeededRng;
use crate::types::Edge;

pub use hierarchical::HierarchicalPartitioner;
pub use random::RandomPartitioner;

/// Splits candidate edges into one subset per worker.
///
/// Implementations may keep state between calls (for instance a clustering
/// computed once), which is why `partition` takes `&mut self`. Randomness
/// must come from `rng` so runs are reproducible.
pub trait EdgePartitioner: Send {
    /// Returns exactly `parts` subsets whose union is `universe`.
    fn partition(
        &mut self,
        universe: &[Edge],
        parts: usize,
        rng: &mut SeededRng,
    ) -> Vec<BTreeSet<Edge>>;

    /// Short label used in logs.
    fn name(&self) -> &'static str;
}

/// Gives the whole universe to a single worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct WholePartitioner;

impl EdgePartitioner for WholePartitioner {
    fn partition(
        &mut self,
        universe: &[Edge],
        parts: usize,
        _rng: &mut SeededRng,
    ) -> Vec<BTreeSet<Edge>> {
        let mut subsets = vec![BTreeSet::new(); parts.max(1)];
        subsets[0] = universe.iter().copied().collect();
        subsets
    }

    fn name(&self) -> &'static str {
        "whole"
    }
}

/// Shuffles `items` and cuts them into `parts` groups of `len / parts`
/// elements; the remainder goes to the last group.
pub fn split<T: Ord + Clone>(items: &[T], parts: usize, rng: &mut SeededRng) -> Vec<BTreeSet<T>> {
    use rand::seq::SliceRandom;

    let parts = parts.max(1);
    let mut shuffled = items.to_vec();
    shuffled.shuffle(rng);
    let chunk = shuffled.len() / parts;
    let mut groups = Vec::with_capacity(parts);
    let mut rest = shuffled.into_iter();
    for _ in 0..parts - 1 {
        groups.push(rest.by_ref().take(chunk).collect());
    }
    groups.push(rest.collect());
    groups
}
