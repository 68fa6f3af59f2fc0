//! Memoized decomposable scoring of "variable given parent set".

mod bdeu;
mod cache;
mod key;
#[cfg(test)]
mod tests;

use std::borrow::Borrow;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ScoreConfig;
use crate::data::{Dataset, Variable};
use crate::error::{Result, SearchError};
use crate::graph::{self, Pdag};
use crate::types::VarId;

pub use bdeu::BdeuScorer;
pub use cache::{cache_capacity, parent_set_count, ScoreCache};
pub use key::ParentSetKey;

/// Structure and equivalent-sample-size priors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Priors {
    /// Structure prior.
    pub structure: f64,
    /// Equivalent sample size.
    pub sample: f64,
}

/// Statistical scoring primitive behind the oracle.
pub trait LocalScorer: Send + Sync {
    /// Log score of `var` given `parents` (distinct indices, any order).
    fn local_score(&self, var: usize, parents: &[usize]) -> f64;
    /// Current priors.
    fn priors(&self) -> Priors;
    /// Replaces the priors for subsequent calls.
    fn set_priors(&self, priors: Priors);
}

/// Difference `new - old` where either side may be negative infinity.
///
/// Moving to an infeasible set is never an improvement, and leaving one
/// always is.
pub fn score_delta(new: f64, old: f64) -> f64 {
    if new == f64::NEG_INFINITY {
        f64::NEG_INFINITY
    } else if old == f64::NEG_INFINITY {
        f64::INFINITY
    } else {
        new - old
    }
}

/// Snapshot of oracle counters for one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreStats {
    /// Every `score` request.
    pub total_calls: u64,
    /// Requests that reached the local scorer.
    pub non_cached_calls: u64,
    /// Requests answered from the cache.
    pub cache_hits: u64,
    /// Entries currently cached.
    pub cache_len: usize,
    /// Cache bound.
    pub cache_capacity: usize,
}

#[derive(Default)]
struct Counters {
    total: AtomicU64,
    non_cached: AtomicU64,
    hits: AtomicU64,
}

/// Shared, thread-safe score oracle for one problem instance.
///
/// Parent sets with `max_parents` or more members score negative infinity,
/// and that verdict is cached like any other score.
pub struct ScoreOracle {
    scorer: Box<dyn LocalScorer>,
    variables: Vec<Variable>,
    max_parents: usize,
    cache: ScoreCache,
    counters: Counters,
    empty_graph_score: f64,
}

impl ScoreOracle {
    /// Builds a BDeu oracle over `data`.
    pub fn new(data: &dyn Dataset, config: &ScoreConfig) -> Result<Self> {
        let priors = Priors {
            structure: config.structure_prior,
            sample: config.sample_prior,
        };
        let scorer = BdeuScorer::new(data, priors);
        Self::with_scorer(data.variables().to_vec(), Box::new(scorer), config)
    }

    /// Builds an oracle around an arbitrary local scorer.
    pub fn with_scorer(
        variables: Vec<Variable>,
        scorer: Box<dyn LocalScorer>,
        config: &ScoreConfig,
    ) -> Result<Self> {
        if variables.is_empty() {
            return Err(SearchError::InvalidArgument("no variables to score".into()));
        }
        validate_priors(scorer.priors())?;
        let capacity = cache_capacity(variables.len(), config.max_parents, &config.cache);
        let mut oracle = Self {
            scorer,
            variables,
            max_parents: config.max_parents,
            cache: ScoreCache::new(config.cache.shards, capacity),
            counters: Counters::default(),
            empty_graph_score: 0.0,
        };
        oracle.empty_graph_score = oracle.compute_empty_graph_score();
        info!(
            variables = oracle.variables.len(),
            max_parents = oracle.max_parents,
            cache_capacity = oracle.cache.capacity(),
            empty_score = oracle.empty_graph_score,
            "score.oracle.ready"
        );
        Ok(oracle)
    }

    /// Local score of `var` given `parents`, served from the cache when
    /// possible.
    pub fn score<I>(&self, var: VarId, parents: I) -> f64
    where
        I: IntoIterator,
        I::Item: Borrow<VarId>,
    {
        self.score_key(ParentSetKey::new(var, parents))
    }

    /// Local score for an already canonical key.
    pub fn score_key(&self, key: ParentSetKey) -> f64 {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        if let Some(score) = self.cache.get(&key) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return score;
        }
        if key.len() >= self.max_parents {
            self.cache.insert(key, f64::NEG_INFINITY);
            return f64::NEG_INFINITY;
        }
        self.counters.non_cached.fetch_add(1, Ordering::Relaxed);
        let parents: Vec<usize> = key.parents().map(VarId::index).collect();
        let score = self.scorer.local_score(key.var().index(), &parents);
        self.cache.insert(key, score);
        score
    }

    /// `score(y, with) - score(y, without)`, infinity-aware.
    pub fn score_change<A, B>(&self, y: VarId, with: A, without: B) -> f64
    where
        A: IntoIterator,
        A::Item: Borrow<VarId>,
        B: IntoIterator,
        B::Item: Borrow<VarId>,
    {
        score_delta(self.score(y, with), self.score(y, without))
    }

    /// Sum of local scores over each node's parents. Graphs with undirected
    /// edges are completed to a DAG first.
    pub fn score_graph(&self, graph: &Pdag) -> Result<f64> {
        if graph.num_nodes() != self.variables.len() {
            return Err(SearchError::InvalidArgument(format!(
                "graph has {} nodes, oracle has {} variables",
                graph.num_nodes(),
                self.variables.len()
            )));
        }
        let completed;
        let dag = if graph.has_undirected() {
            completed = graph::to_dag(graph)?;
            &completed
        } else {
            graph
        };
        Ok(dag
            .nodes()
            .map(|v| self.score(v, dag.parents(v)))
            .sum())
    }

    /// Like [`ScoreOracle::score_graph`]; a missing graph scores negative
    /// infinity.
    pub fn score_optional(&self, graph: Option<&Pdag>) -> Result<f64> {
        graph.map_or(Ok(f64::NEG_INFINITY), |g| self.score_graph(g))
    }

    /// Score of the graph without edges, computed at construction.
    pub fn empty_graph_score(&self) -> f64 {
        self.empty_graph_score
    }

    /// Current priors of the underlying scorer.
    pub fn priors(&self) -> Priors {
        self.scorer.priors()
    }

    /// Replaces the priors and invalidates every cached score.
    pub fn set_priors(&mut self, priors: Priors) -> Result<()> {
        validate_priors(priors)?;
        self.scorer.set_priors(priors);
        self.cache.clear();
        self.empty_graph_score = self.compute_empty_graph_score();
        Ok(())
    }

    /// Parent-count bound.
    pub fn max_parents(&self) -> usize {
        self.max_parents
    }

    /// Ordered variables.
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Number of variables.
    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    /// Looks a variable up by name, ignoring ASCII case.
    pub fn variable(&self, name: &str) -> Option<VarId> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
            .map(VarId::from_index)
    }

    /// Display name of `var`.
    pub fn variable_name(&self, var: VarId) -> Option<&str> {
        self.variables.get(var.index()).map(|v| v.name.as_str())
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ScoreStats {
        ScoreStats {
            total_calls: self.counters.total.load(Ordering::Relaxed),
            non_cached_calls: self.counters.non_cached.load(Ordering::Relaxed),
            cache_hits: self.counters.hits.load(Ordering::Relaxed),
            cache_len: self.cache.len(),
            cache_capacity: self.cache.capacity(),
        }
    }

    /// Zeroes the call counters; cached scores are kept.
    pub fn reset_stats(&self) {
        self.counters.total.store(0, Ordering::Relaxed);
        self.counters.non_cached.store(0, Ordering::Relaxed);
        self.counters.hits.store(0, Ordering::Relaxed);
    }

    fn compute_empty_graph_score(&self) -> f64 {
        (0..self.variables.len())
            .map(|i| self.score(VarId::from_index(i), std::iter::empty::<VarId>()))
            .sum()
    }
}

fn validate_priors(priors: Priors) -> Result<()> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(priors.sample) || !positive(priors.structure) {
        return Err(SearchError::InvalidArgument(format!(
            "priors must be positive, got {priors:?}"
        )));
    }
    Ok(())
}
