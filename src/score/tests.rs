use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::thread;

use super::*;
use crate::config::{CachePolicy, ScoreConfig};
use crate::data::{DiscreteDataset, NetworkSampler};
use crate::graph::Pdag;
use crate::types::Edge;

fn cancer_oracle(config: &ScoreConfig) -> ScoreOracle {
    let data = NetworkSampler::cancer().sample(500, 42).unwrap();
    ScoreOracle::new(&data, config).unwrap()
}

fn small_config() -> ScoreConfig {
    ScoreConfig {
        cache: CachePolicy {
            target_fraction: 1.0,
            memory_budget: Some(64 << 20),
            shards: 1,
            ..CachePolicy::default()
        },
        ..ScoreConfig::default()
    }
}

#[test]
fn key_ignores_order_and_duplicates() {
    let a = ParentSetKey::new(VarId(3), [VarId(0), VarId(1), VarId(2)]);
    let b = ParentSetKey::new(VarId(3), vec![VarId(2), VarId(0), VarId(1), VarId(2)]);
    let c: BTreeSet<VarId> = [VarId(1), VarId(2), VarId(0)].into_iter().collect();
    assert_eq!(a, b);
    assert_eq!(a, ParentSetKey::new(VarId(3), &c));
    assert_eq!(a.len(), 3);
    assert!(a.contains(VarId(1)));
    assert!(!a.contains(VarId(3)));
    let set: HashSet<_> = [a.clone(), b].into_iter().collect();
    assert_eq!(set.len(), 1);
}

#[test]
fn key_distinguishes_variable_and_high_indices() {
    let low = ParentSetKey::new(VarId(0), [VarId(1)]);
    assert_ne!(low, ParentSetKey::new(VarId(2), [VarId(1)]));
    let high = ParentSetKey::new(VarId(0), [VarId(130), VarId(1)]);
    assert_eq!(high.parents().collect::<Vec<_>>(), vec![VarId(1), VarId(130)]);
    assert!(ParentSetKey::new(VarId(0), std::iter::empty::<VarId>()).is_empty());
}

#[test]
fn score_is_order_independent_with_one_cache_entry() {
    let oracle = cancer_oracle(&small_config());
    let before = oracle.stats().cache_len;
    let set: BTreeSet<VarId> = [VarId(0), VarId(1), VarId(2)].into_iter().collect();
    let rotated: BTreeSet<VarId> = [VarId(2), VarId(0), VarId(1)].into_iter().collect();
    let scores = [
        oracle.score(VarId(4), &set),
        oracle.score(VarId(4), &rotated),
        oracle.score(VarId(4), [VarId(0), VarId(1), VarId(2)]),
        oracle.score(VarId(4), [VarId(2), VarId(0), VarId(1)]),
    ];
    assert!(scores.iter().all(|&s| s == scores[0]));
    assert_eq!(oracle.stats().cache_len, before + 1);
}

#[test]
fn cache_hits_do_not_count_as_computations() {
    let oracle = cancer_oracle(&small_config());
    oracle.reset_stats();
    oracle.score(VarId(2), [VarId(0), VarId(1)]);
    let first = oracle.stats();
    oracle.score(VarId(2), [VarId(1), VarId(0)]);
    let second = oracle.stats();
    assert_eq!(first.non_cached_calls, 1);
    assert_eq!(second.non_cached_calls, 1);
    assert_eq!(second.total_calls, 2);
    assert_eq!(second.cache_hits, 1);
}

#[test]
fn bound_yields_negative_infinity() {
    let config = ScoreConfig {
        max_parents: 2,
        ..small_config()
    };
    let oracle = cancer_oracle(&config);
    assert!(oracle.score(VarId(0), [VarId(1)]).is_finite());
    assert_eq!(oracle.score(VarId(0), [VarId(1), VarId(2)]), f64::NEG_INFINITY);
    assert_eq!(
        oracle.score(VarId(0), [VarId(1), VarId(2), VarId(3)]),
        f64::NEG_INFINITY
    );
    oracle.reset_stats();
    oracle.score(VarId(0), [VarId(2), VarId(1)]);
    assert_eq!(oracle.stats().cache_hits, 1);
    assert_eq!(oracle.stats().non_cached_calls, 0);
}

#[test]
fn delta_handles_infinities() {
    assert_eq!(score_delta(f64::NEG_INFINITY, -3.0), f64::NEG_INFINITY);
    assert_eq!(score_delta(-3.0, f64::NEG_INFINITY), f64::INFINITY);
    assert_eq!(score_delta(f64::NEG_INFINITY, f64::NEG_INFINITY), f64::NEG_INFINITY);
    assert_eq!(score_delta(-1.0, -3.0), 2.0);
}

#[test]
fn dependent_parent_beats_independent_one() {
    let oracle = cancer_oracle(&small_config());
    let xray = oracle.variable("xray").unwrap();
    let cancer = oracle.variable("Cancer").unwrap();
    let empty = oracle.score(xray, std::iter::empty::<VarId>());
    let with_cancer = oracle.score(xray, [cancer]);
    assert!(empty.is_finite() && empty < 0.0);
    assert!(with_cancer.is_finite());
    assert_eq!(oracle.variable_name(cancer), Some("Cancer"));
}

#[test]
fn zero_counts_never_produce_nan() {
    let vars = vec![
        Variable::new("a", vec!["0".into(), "1".into(), "2".into()]),
        Variable::new("b", vec!["0".into(), "1".into()]),
    ];
    // category 2 of `a` never occurs
    let data = DiscreteDataset::new(vars, vec![vec![0, 1, 0, 1], vec![0, 0, 1, 1]]).unwrap();
    let oracle = ScoreOracle::new(&data, &small_config()).unwrap();
    assert!(oracle.score(VarId(0), [VarId(1)]).is_finite());
    assert!(oracle.score(VarId(1), [VarId(0)]).is_finite());
}

#[test]
fn graph_score_sums_local_scores() {
    let oracle = cancer_oracle(&small_config());
    let dag = Pdag::from_edges(5, &[Edge::new(VarId(2), VarId(3)), Edge::new(VarId(2), VarId(4))]);
    let expected = oracle.score(VarId(0), std::iter::empty::<VarId>())
        + oracle.score(VarId(1), std::iter::empty::<VarId>())
        + oracle.score(VarId(2), std::iter::empty::<VarId>())
        + oracle.score(VarId(3), [VarId(2)])
        + oracle.score(VarId(4), [VarId(2)]);
    assert!((oracle.score_graph(&dag).unwrap() - expected).abs() < 1e-9);
    assert_eq!(oracle.score_optional(None).unwrap(), f64::NEG_INFINITY);
    assert!(
        (oracle.score_graph(&Pdag::new(5)).unwrap() - oracle.empty_graph_score()).abs() < 1e-9
    );
}

#[test]
fn undirected_graphs_are_completed_before_scoring() {
    let oracle = cancer_oracle(&small_config());
    let mut pdag = Pdag::new(5);
    pdag.add_undirected(VarId(2), VarId(3));
    let dag = Pdag::from_edges(5, &[Edge::new(VarId(2), VarId(3))]);
    let reversed = Pdag::from_edges(5, &[Edge::new(VarId(3), VarId(2))]);
    let score = oracle.score_graph(&pdag).unwrap();
    // score equivalence makes either orientation agree
    assert!((score - oracle.score_graph(&dag).unwrap()).abs() < 1e-6);
    assert!((score - oracle.score_graph(&reversed).unwrap()).abs() < 1e-6);
}

#[test]
fn set_priors_clears_the_cache() {
    let mut oracle = cancer_oracle(&small_config());
    let before = oracle.score(VarId(3), [VarId(2)]);
    oracle
        .set_priors(Priors {
            structure: 0.01,
            sample: 1.0,
        })
        .unwrap();
    assert_eq!(oracle.stats().cache_len, 5);
    assert_ne!(oracle.score(VarId(3), [VarId(2)]), before);
    assert!(oracle
        .set_priors(Priors {
            structure: 0.01,
            sample: 0.0
        })
        .is_err());
}

#[test]
fn capacity_takes_the_smaller_limit() {
    assert_eq!(parent_set_count(5, 5), 5 * 16);
    assert_eq!(parent_set_count(5, 1), 5 * 5);
    let generous = CachePolicy {
        memory_budget: Some(1 << 40),
        ..CachePolicy::default()
    };
    assert_eq!(cache_capacity(5, 5, &generous), 8);
    let tight = CachePolicy {
        memory_budget: Some(3 * 220 * 4),
        ..CachePolicy::default()
    };
    assert_eq!(cache_capacity(50, 5, &tight), 4);
}

#[test]
fn bounded_cache_evicts() {
    let cache = ScoreCache::new(1, 2);
    for i in 0..3u32 {
        cache.insert(ParentSetKey::new(VarId(i), std::iter::empty::<VarId>()), f64::from(i));
    }
    assert_eq!(cache.len(), 2);
    assert_eq!(
        cache.get(&ParentSetKey::new(VarId(0), std::iter::empty::<VarId>())),
        None
    );
}

#[test]
fn concurrent_scoring_agrees_with_sequential() {
    let oracle = Arc::new(cancer_oracle(&small_config()));
    let expected = oracle.score(VarId(2), [VarId(0), VarId(1)]);
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let oracle = Arc::clone(&oracle);
            thread::spawn(move || {
                (0..50)
                    .map(|_| oracle.score(VarId(2), [VarId(1), VarId(0)]))
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.join().unwrap().into_iter().all(|s| s == expected));
    }
}
