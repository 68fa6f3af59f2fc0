//! Graph edits the local search can evaluate and apply.
//!
//! GES operators move between equivalence classes and work on CPDAGs;
//! hill-climbing operators edit DAGs arc by arc.

use std::collections::BTreeSet;

use crate::error::Result;
use crate::graph::{self, Pdag};
use crate::score::{score_delta, ScoreOracle};
use crate::types::{Edge, VarId};

use super::candidate::EdgeCandidate;
use super::Phase;

/// Validity, scoring and application of one kind of move.
pub trait Operator: Send + Sync {
    /// Which stage the operator runs in.
    fn phase(&self) -> Phase;

    /// Label used in logs.
    fn name(&self) -> &'static str;

    /// True when the working graph is a CPDAG that must be re-closed after
    /// each move.
    fn works_on_classes(&self) -> bool;

    /// Converts a stage's starting DAG into the operator's working form.
    fn prepare(&self, start: &Pdag) -> Result<Pdag> {
        if self.works_on_classes() {
            Ok(graph::to_cpdag(start))
        } else if start.has_undirected() {
            graph::to_dag(start)
        } else {
            Ok(start.clone())
        }
    }

    /// Best legal, strictly improving move for `edge`, if any.
    fn evaluate(&self, graph: &Pdag, edge: Edge, oracle: &ScoreOracle) -> Option<EdgeCandidate>;

    /// Applies a candidate previously returned by `evaluate`.
    fn apply(&self, graph: &mut Pdag, candidate: &EdgeCandidate);
}

fn union(parts: &[&[VarId]]) -> BTreeSet<VarId> {
    parts.iter().flat_map(|p| p.iter().copied()).collect()
}

/// Undirected neighbours of `y` that are adjacent to `x`.
fn na_yx(graph: &Pdag, x: VarId, y: VarId) -> Vec<VarId> {
    graph
        .neighbors(y)
        .into_iter()
        .filter(|&n| graph.is_adjacent(n, x))
        .collect()
}

/// Greedily grows an auxiliary set from `pool`, keeping the extension that
/// scores best among those `valid` accepts. Growth stops when nothing
/// improves or the set already exceeds `cap` elements.
fn grow_subset<S, V>(
    pool: Vec<VarId>,
    cap: usize,
    start: Option<f64>,
    score: S,
    valid: V,
) -> Option<(f64, Vec<VarId>)>
where
    S: Fn(&[VarId]) -> f64,
    V: Fn(&[VarId]) -> bool,
{
    let mut pool = pool;
    let mut chosen: Vec<VarId> = Vec::new();
    let mut best = start;
    loop {
        let mut winner: Option<(usize, f64)> = None;
        for (k, &node) in pool.iter().enumerate() {
            let mut trial = chosen.clone();
            trial.push(node);
            let delta = score(&trial);
            let threshold = winner.map(|w| w.1).or(best).unwrap_or(f64::NEG_INFINITY);
            if delta <= threshold || !valid(&trial) {
                continue;
            }
            winner = Some((k, delta));
        }
        match winner {
            Some((k, delta)) => {
                chosen.push(pool.remove(k));
                best = Some(delta);
            }
            None => break,
        }
        if chosen.len() > cap {
            break;
        }
    }
    best.map(|b| (b, chosen))
}

/// Chickering's Insert(x, y, T).
#[derive(Debug, Clone, Copy)]
pub struct GesInsert {
    /// Largest subset size that may still grow by one node.
    pub growth_cap: usize,
}

impl GesInsert {
    fn delta(oracle: &ScoreOracle, x: VarId, y: VarId, base: &[VarId], t: &[VarId]) -> f64 {
        let without = union(&[base, t]);
        let mut with = without.clone();
        with.insert(x);
        score_delta(oracle.score(y, &with), oracle.score(y, &without))
    }

    fn valid(graph: &Pdag, x: VarId, y: VarId, na: &[VarId], t: &[VarId]) -> bool {
        let nodes: Vec<VarId> = union(&[na, t]).into_iter().collect();
        graph.is_clique(&nodes) && graph.is_semi_directed_blocked(y, x, &nodes)
    }
}

impl Operator for GesInsert {
    fn phase(&self) -> Phase {
        Phase::Forward
    }

    fn name(&self) -> &'static str {
        "ges_insert"
    }

    fn works_on_classes(&self) -> bool {
        true
    }

    fn evaluate(&self, graph: &Pdag, edge: Edge, oracle: &ScoreOracle) -> Option<EdgeCandidate> {
        let (x, y) = (edge.from, edge.to);
        if x == y || graph.is_adjacent(x, y) {
            return None;
        }
        let na = na_yx(graph, x, y);
        let mut base = na.clone();
        base.extend(graph.parents(y));
        let initial = Self::delta(oracle, x, y, &base, &[]);
        if initial <= 0.0 || !Self::valid(graph, x, y, &na, &[]) {
            return None;
        }
        let pool: Vec<VarId> = graph
            .neighbors(y)
            .into_iter()
            .filter(|&t| t != x && !graph.is_adjacent(t, x))
            .collect();
        let (delta, subset) = grow_subset(
            pool,
            self.growth_cap,
            Some(initial),
            |t| Self::delta(oracle, x, y, &base, t),
            |t| Self::valid(graph, x, y, &na, t),
        )?;
        Some(EdgeCandidate {
            edge,
            delta,
            subset,
        })
    }

    fn apply(&self, graph: &mut Pdag, candidate: &EdgeCandidate) {
        let (x, y) = (candidate.edge.from, candidate.edge.to);
        graph.add_directed(x, y);
        for &t in &candidate.subset {
            graph.add_directed(t, y);
        }
    }
}

/// Chickering's Delete(x, y, H), for an edge `x -> y` or `x --- y`.
#[derive(Debug, Clone, Copy)]
pub struct GesDelete {
    /// Largest subset size that may still grow by one node.
    pub growth_cap: usize,
}

impl GesDelete {
    fn best_direction(
        &self,
        graph: &Pdag,
        x: VarId,
        y: VarId,
        oracle: &ScoreOracle,
    ) -> Option<(f64, Vec<VarId>)> {
        if !(graph.is_parent_of(x, y) || graph.is_undirected(x, y)) {
            return None;
        }
        let na = na_yx(graph, x, y);
        let parents: Vec<VarId> = graph.parents(y).into_iter().filter(|&p| p != x).collect();
        let delta = |h: &[VarId]| {
            let mut kept: BTreeSet<VarId> =
                na.iter().copied().filter(|n| !h.contains(n)).collect();
            kept.extend(parents.iter().copied());
            let mut with = kept.clone();
            with.insert(x);
            score_delta(oracle.score(y, &kept), oracle.score(y, &with))
        };
        let valid = |h: &[VarId]| {
            let rest: Vec<VarId> = na.iter().copied().filter(|n| !h.contains(n)).collect();
            graph.is_clique(&rest)
        };
        let start = valid(&[]).then(|| delta(&[]));
        grow_subset(na.clone(), self.growth_cap, start, delta, valid)
            .filter(|(d, _)| *d > 0.0)
    }
}

impl Operator for GesDelete {
    fn phase(&self) -> Phase {
        Phase::Backward
    }

    fn name(&self) -> &'static str {
        "ges_delete"
    }

    fn works_on_classes(&self) -> bool {
        true
    }

    fn evaluate(&self, graph: &Pdag, edge: Edge, oracle: &ScoreOracle) -> Option<EdgeCandidate> {
        let (a, b) = (edge.from, edge.to);
        let forward = self
            .best_direction(graph, a, b, oracle)
            .map(|(d, h)| (d, h, Edge::new(a, b)));
        let backward = self
            .best_direction(graph, b, a, oracle)
            .map(|(d, h)| (d, h, Edge::new(b, a)));
        let (delta, subset, edge) = match (forward, backward) {
            (Some(f), Some(r)) => {
                if r.0 > f.0 {
                    r
                } else {
                    f
                }
            }
            (Some(f), None) => f,
            (None, Some(r)) => r,
            (None, None) => return None,
        };
        Some(EdgeCandidate {
            edge,
            delta,
            subset,
        })
    }

    fn apply(&self, graph: &mut Pdag, candidate: &EdgeCandidate) {
        let (x, y) = (candidate.edge.from, candidate.edge.to);
        graph.remove_edge(x, y);
        for &h in &candidate.subset {
            graph.add_directed(y, h);
            if graph.is_undirected(x, h) {
                graph.add_directed(x, h);
            }
        }
    }
}

/// Adds the arc `x -> y` to a DAG when it keeps the graph acyclic.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcAddition;

impl Operator for ArcAddition {
    fn phase(&self) -> Phase {
        Phase::Forward
    }

    fn name(&self) -> &'static str {
        "arc_addition"
    }

    fn works_on_classes(&self) -> bool {
        false
    }

    fn evaluate(&self, graph: &Pdag, edge: Edge, oracle: &ScoreOracle) -> Option<EdgeCandidate> {
        let (x, y) = (edge.from, edge.to);
        if x == y || graph.is_adjacent(x, y) || graph.has_directed_path(y, x) {
            return None;
        }
        let parents = graph.parents(y);
        let mut with = parents.clone();
        with.push(x);
        let delta = score_delta(oracle.score(y, &with), oracle.score(y, &parents));
        (delta > 0.0).then(|| EdgeCandidate {
            edge,
            delta,
            subset: Vec::new(),
        })
    }

    fn apply(&self, graph: &mut Pdag, candidate: &EdgeCandidate) {
        graph.add_directed(candidate.edge.from, candidate.edge.to);
    }
}

/// Removes an existing arc `x -> y` from a DAG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArcRemoval;

impl Operator for ArcRemoval {
    fn phase(&self) -> Phase {
        Phase::Backward
    }

    fn name(&self) -> &'static str {
        "arc_removal"
    }

    fn works_on_classes(&self) -> bool {
        false
    }

    fn evaluate(&self, graph: &Pdag, edge: Edge, oracle: &ScoreOracle) -> Option<EdgeCandidate> {
        let (x, y) = (edge.from, edge.to);
        if !graph.is_parent_of(x, y) {
            return None;
        }
        let parents = graph.parents(y);
        let without: Vec<VarId> = parents.iter().copied().filter(|&p| p != x).collect();
        let delta = score_delta(oracle.score(y, &without), oracle.score(y, &parents));
        (delta > 0.0).then(|| EdgeCandidate {
            edge,
            delta,
            subset: Vec::new(),
        })
    }

    fn apply(&self, graph: &mut Pdag, candidate: &EdgeCandidate) {
        graph.remove_edge(candidate.edge.from, candidate.edge.to);
    }
}
