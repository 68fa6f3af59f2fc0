use std::collections::BTreeSet;

use super::{split, EdgePartitioner};
use crate::rng::SeededRng;
use crate::types::Edge;

/// Seeded shuffle of the edge universe cut into near-equal subsets.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomPartitioner;

impl EdgePartitioner for RandomPartitioner {
    fn partition(
        &mut self,
        universe: &[Edge],
        parts: usize,
        rng: &mut SeededRng,
    ) -> Vec<BTreeSet<Edge>> {
        split(universe, parts, rng)
    }

    fn name(&self) -> &'static str {
        "random"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::all_arcs;

    #[test]
    fn subsets_are_disjoint_and_cover_the_universe() {
        let universe = all_arcs(5);
        let parts = RandomPartitioner.partition(&universe, 3, &mut SeededRng::new(1));
        assert_eq!(parts.len(), 3);
        let total: usize = parts.iter().map(BTreeSet::len).sum();
        assert_eq!(total, universe.len());
        let union: BTreeSet<Edge> = parts.into_iter().flatten().collect();
        assert_eq!(union.len(), universe.len());
    }
}
