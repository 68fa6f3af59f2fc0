#![allow(missing_docs)]

use std::collections::BTreeSet;

use pges::data::NetworkSampler;
use pges::graph::{to_cpdag, to_dag};
use pges::partition::split;
use pges::rng::SeededRng;
use pges::{Edge, ParentSetKey, Pdag, ScoreConfig, ScoreOracle, VarId};
use proptest::prelude::*;

fn arb_parents(n: u32) -> impl Strategy<Value = Vec<VarId>> {
    prop::collection::vec((0..n).prop_map(VarId), 0..6)
}

fn arb_dag(n: usize) -> impl Strategy<Value = Pdag> {
    prop::collection::vec(any::<bool>(), n * (n - 1) / 2).prop_map(move |bits| {
        let mut edges = Vec::new();
        let mut k = 0;
        for a in 0..n {
            for b in (a + 1)..n {
                if bits[k] {
                    edges.push(Edge::new(VarId::from_index(a), VarId::from_index(b)));
                }
                k += 1;
            }
        }
        Pdag::from_edges(n, &edges)
    })
}

proptest! {
    #[test]
    fn prop_key_ignores_parent_order(parents in arb_parents(150), seed in any::<u64>()) {
        use rand::seq::SliceRandom;

        let mut shuffled = parents.clone();
        shuffled.shuffle(&mut SeededRng::new(seed));
        let a = ParentSetKey::new(VarId(0), &parents);
        let b = ParentSetKey::new(VarId(0), &shuffled);
        let distinct: BTreeSet<VarId> = parents.iter().copied().collect();
        prop_assert_eq!(&a, &b);
        prop_assert_eq!(a.len(), distinct.len());
        prop_assert_eq!(a.parents().collect::<BTreeSet<_>>(), distinct);
    }

    #[test]
    fn prop_pdag_completion_is_consistent(dag in arb_dag(6)) {
        let cpdag = to_cpdag(&dag);
        let completed = to_dag(&cpdag).unwrap();
        prop_assert!(completed.is_dag());
        prop_assert_eq!(completed.skeleton(), dag.skeleton());
        prop_assert_eq!(to_cpdag(&completed), cpdag);
    }

    #[test]
    fn prop_split_is_a_partition(len in 0usize..60, parts in 1usize..8, seed in any::<u64>()) {
        let items: Vec<usize> = (0..len).collect();
        let groups = split(&items, parts, &mut SeededRng::new(seed));
        prop_assert_eq!(groups.len(), parts);
        prop_assert_eq!(groups.iter().map(BTreeSet::len).sum::<usize>(), len);
        let union: BTreeSet<usize> = groups.into_iter().flatten().collect();
        prop_assert_eq!(union.len(), len);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn prop_equivalent_dags_score_equally(dag in arb_dag(5)) {
        let data = NetworkSampler::cancer().sample(300, 1).unwrap();
        let oracle = ScoreOracle::new(&data, &ScoreConfig::default()).unwrap();
        let other = to_dag(&to_cpdag(&dag)).unwrap();
        let a = oracle.score_graph(&dag).unwrap();
        let b = oracle.score_graph(&other).unwrap();
        prop_assert!((a - b).abs() < 1e-6 || (a == b));
    }
}
