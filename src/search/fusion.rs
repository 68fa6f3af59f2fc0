//! Reconciling the partial graphs of a stage into one successor graph.
//!
//! Every fusion returns a graph scoring at least as well as the graph the
//! stage started from.

use serde::Serialize;
use tracing::{debug, info};

use crate::config::{RefreshMode, SelectionPolicy};
use crate::error::Result;
use crate::graph::{self, Pdag};
use crate::rng::SeededRng;
use crate::score::ScoreOracle;
use crate::types::Edge;

use super::operators::{ArcAddition, ArcRemoval, Operator};
use super::worker::{LocalSearchWorker, WorkerSettings};
use super::CancelToken;

/// How a fusion arrived at its graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionDecision {
    /// The merged graph beat the previous one.
    Accepted,
    /// Hill climbing over the merged edges beat the previous graph.
    Repaired,
    /// Nothing beat the previous graph.
    KeptPrevious,
}

/// Merged graph and how it was reached.
#[derive(Debug, Clone)]
pub struct FusionOutcome {
    /// Graph the next stage starts from.
    pub graph: Pdag,
    /// Score of `graph`.
    pub score: f64,
    /// Whether the merge was kept as is, repaired, or discarded.
    pub decision: FusionDecision,
}

/// Shared services a fusion may need for its repair search.
pub struct FusionContext<'a> {
    /// Scores the merged and repaired graphs.
    pub oracle: &'a ScoreOracle,
    /// Stops the repair search.
    pub cancel: &'a CancelToken,
    /// Stream for randomized repair moves.
    pub rng: SeededRng,
}

/// Merge policy for a stage's partial graphs.
pub trait Fusion: Send + Sync {
    /// Label used in logs.
    fn name(&self) -> &'static str;

    /// Merges `partials` into a graph no worse than `previous`.
    fn fuse(
        &self,
        ctx: &FusionContext<'_>,
        previous: &Pdag,
        previous_score: f64,
        partials: &[Pdag],
    ) -> Result<FusionOutcome>;
}

/// Union of the partial DAGs: earlier partials win adjacency conflicts and
/// arcs that would close a cycle are skipped.
pub fn consensus_union(num_nodes: usize, partials: &[Pdag]) -> Pdag {
    let mut union = Pdag::new(num_nodes);
    for partial in partials {
        for edge in partial.directed_edges() {
            if union.is_adjacent(edge.from, edge.to) || union.has_directed_path(edge.to, edge.from)
            {
                continue;
            }
            union.add_directed(edge.from, edge.to);
        }
    }
    union
}

/// Arcs of `previous` whose adjacency survives in every partial graph.
pub fn consensus_intersection(previous: &Pdag, partials: &[Pdag]) -> Pdag {
    let mut kept = previous.clone();
    for edge in previous.directed_edges() {
        if !partials.iter().all(|p| p.is_adjacent(edge.from, edge.to)) {
            kept.remove_edge(edge.from, edge.to);
        }
    }
    kept
}

fn decide(
    ctx: &FusionContext<'_>,
    merged: Pdag,
    previous: &Pdag,
    previous_score: f64,
    repair: &dyn Operator,
    candidates: Vec<Edge>,
) -> Result<FusionOutcome> {
    let merged_score = ctx.oracle.score_graph(&merged)?;
    if merged_score > previous_score {
        return Ok(FusionOutcome {
            graph: merged,
            score: merged_score,
            decision: FusionDecision::Accepted,
        });
    }
    debug!(
        merged_score,
        previous_score,
        candidates = candidates.len(),
        operator = repair.name(),
        "search.fusion.repairing"
    );
    if candidates.is_empty() {
        return Ok(kept(previous, previous_score));
    }
    let settings = WorkerSettings {
        selection: SelectionPolicy::Greedy,
        top_k: 1,
        max_iterations: Some(candidates.len()),
        max_edges: None,
        refresh: RefreshMode::Full,
        parallel_scoring: false,
        stack_size: None,
    };
    let worker = LocalSearchWorker::new(
        ctx.oracle,
        repair,
        candidates,
        settings,
        ctx.rng.clone(),
        ctx.cancel.clone(),
    );
    let repaired = worker.run(previous)?;
    if repaired.changed && repaired.score > previous_score {
        Ok(FusionOutcome {
            graph: repaired.graph,
            score: repaired.score,
            decision: FusionDecision::Repaired,
        })
    } else {
        Ok(kept(previous, previous_score))
    }
}

fn kept(previous: &Pdag, previous_score: f64) -> FusionOutcome {
    FusionOutcome {
        graph: previous.clone(),
        score: previous_score,
        decision: FusionDecision::KeptPrevious,
    }
}

/// Forward fusion: consensus union, repaired by forward hill climbing over
/// the newly proposed adjacencies (both orientations).
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusUnion;

impl Fusion for ConsensusUnion {
    fn name(&self) -> &'static str {
        "consensus_union"
    }

    fn fuse(
        &self,
        ctx: &FusionContext<'_>,
        previous: &Pdag,
        previous_score: f64,
        partials: &[Pdag],
    ) -> Result<FusionOutcome> {
        if partials.is_empty() {
            return Ok(kept(previous, previous_score));
        }
        let union = consensus_union(previous.num_nodes(), partials);
        let candidates: Vec<Edge> = union
            .skeleton()
            .into_iter()
            .filter(|&(a, b)| !previous.is_adjacent(a, b))
            .flat_map(|(a, b)| [Edge::new(a, b), Edge::new(b, a)])
            .collect();
        let outcome = decide(ctx, union, previous, previous_score, &ArcAddition, candidates)?;
        info!(
            fusion = self.name(),
            decision = ?outcome.decision,
            score = outcome.score,
            edges = outcome.graph.num_edges(),
            "search.fusion.completed"
        );
        Ok(outcome)
    }
}

/// Backward fusion: keeps arcs every partial retained, repaired by backward
/// hill climbing over the arcs some partial dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsensusIntersection;

impl Fusion for ConsensusIntersection {
    fn name(&self) -> &'static str {
        "consensus_intersection"
    }

    fn fuse(
        &self,
        ctx: &FusionContext<'_>,
        previous: &Pdag,
        previous_score: f64,
        partials: &[Pdag],
    ) -> Result<FusionOutcome> {
        let intersection = consensus_intersection(previous, partials);
        let candidates: Vec<Edge> = previous
            .directed_edges()
            .into_iter()
            .filter(|e| !intersection.is_adjacent(e.from, e.to))
            .collect();
        let outcome = decide(
            ctx,
            intersection,
            previous,
            previous_score,
            &ArcRemoval,
            candidates,
        )?;
        info!(
            fusion = self.name(),
            decision = ?outcome.decision,
            score = outcome.score,
            edges = outcome.graph.num_edges(),
            "search.fusion.completed"
        );
        Ok(outcome)
    }
}

/// Single-worker fusion: only breaks residual cycles of the one partial
/// graph, never accepting a regression.
#[derive(Debug, Clone, Copy, Default)]
pub struct InconsistencyRepair;

impl Fusion for InconsistencyRepair {
    fn name(&self) -> &'static str {
        "inconsistency_repair"
    }

    fn fuse(
        &self,
        ctx: &FusionContext<'_>,
        previous: &Pdag,
        previous_score: f64,
        partials: &[Pdag],
    ) -> Result<FusionOutcome> {
        let Some(partial) = partials.first() else {
            return Ok(kept(previous, previous_score));
        };
        let repaired = graph::remove_inconsistencies(partial);
        let score = ctx.oracle.score_graph(&repaired)?;
        if score > previous_score {
            Ok(FusionOutcome {
                graph: repaired,
                score,
                decision: FusionDecision::Accepted,
            })
        } else {
            Ok(kept(previous, previous_score))
        }
    }
}
