use std::collections::BTreeSet;

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::config::{RefreshMode, SearchConfig, SelectionPolicy};
use crate::error::{Result, SearchError};
use crate::graph::{self, Pdag};
use crate::rng::SeededRng;
use crate::score::ScoreOracle;
use crate::types::{Edge, VarId};

use super::candidate::{BestEdges, EdgeCandidate};
use super::operators::Operator;
use super::{CancelToken, Phase};

/// Per-worker knobs taken from the search configuration.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// How the winner is drawn from the retained moves.
    pub selection: SelectionPolicy,
    /// Number of best moves retained per round.
    pub top_k: usize,
    /// Moves allowed before the worker yields.
    pub max_iterations: Option<usize>,
    /// Forward workers stop once the graph holds this many edges.
    pub max_edges: Option<usize>,
    /// Candidate refresh after a forward move.
    pub refresh: RefreshMode,
    /// Scores a round's candidates on the rayon pool.
    pub parallel_scoring: bool,
    /// Stack size for the worker's thread, platform default when unset.
    pub stack_size: Option<usize>,
}

impl From<&SearchConfig> for WorkerSettings {
    fn from(config: &SearchConfig) -> Self {
        Self {
            selection: config.selection,
            top_k: config.top_k,
            max_iterations: config.stage_iteration_cap,
            max_edges: config.max_edges,
            refresh: config.refresh,
            parallel_scoring: config.parallel_scoring,
            stack_size: config.worker_stack_size,
        }
    }
}

/// What one worker hands back to its stage.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    /// Final DAG, or the starting graph when nothing improved.
    pub graph: Pdag,
    /// Whether the worker improved on its starting graph.
    pub changed: bool,
    /// Score of `graph`.
    pub score: f64,
    /// Moves applied.
    pub iterations: usize,
}

/// Greedy search restricted to one candidate subset, on a private graph.
pub struct LocalSearchWorker<'a> {
    oracle: &'a ScoreOracle,
    operator: &'a dyn Operator,
    candidates: Vec<Edge>,
    settings: WorkerSettings,
    rng: SeededRng,
    cancel: CancelToken,
}

impl<'a> LocalSearchWorker<'a> {
    /// Worker over `candidates`, drawing randomized choices from `rng`.
    pub fn new(
        oracle: &'a ScoreOracle,
        operator: &'a dyn Operator,
        candidates: impl IntoIterator<Item = Edge>,
        settings: WorkerSettings,
        rng: SeededRng,
        cancel: CancelToken,
    ) -> Self {
        Self {
            oracle,
            operator,
            candidates: candidates.into_iter().collect(),
            settings,
            rng,
            cancel,
        }
    }

    /// Runs until no improving move remains or a cap is hit.
    ///
    /// Returns [`SearchError::Interrupted`] as soon as cancellation is
    /// observed between moves.
    pub fn run(mut self, start: &Pdag) -> Result<WorkerOutcome> {
        let initial = self.oracle.score_graph(start)?;
        if self.candidates.is_empty() {
            return Ok(unchanged(start, initial));
        }
        let phase = self.operator.phase();
        let mut graph = self.operator.prepare(start)?;
        let mut dirty: Option<BTreeSet<VarId>> = None;
        let mut iterations = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(SearchError::Interrupted(phase.as_str()));
            }
            if self.settings.max_iterations.is_some_and(|cap| iterations >= cap) {
                break;
            }
            if phase == Phase::Forward
                && self
                    .settings
                    .max_edges
                    .is_some_and(|cap| graph.num_edges() >= cap)
            {
                break;
            }

            // Insert validity depends on paths through the whole graph, so
            // only moves scored against the current graph may win.
            let round: Vec<Edge> = match &dirty {
                None => self.candidates.clone(),
                Some(nodes) => self
                    .candidates
                    .iter()
                    .copied()
                    .filter(|e| nodes.contains(&e.from) || nodes.contains(&e.to))
                    .collect(),
            };
            let mut best = BestEdges::new(self.settings.top_k);
            for candidate in self.score_all(&graph, &round).into_iter().flatten() {
                if candidate.delta > 0.0 {
                    best.offer(candidate);
                }
            }
            let Some(winner) = best.select(self.settings.selection, &mut self.rng) else {
                break;
            };
            trace!(
                operator = self.operator.name(),
                edge = %winner.edge,
                delta = winner.delta,
                subset = ?winner.subset,
                "search.worker.move"
            );
            self.operator.apply(&mut graph, &winner);
            iterations += 1;
            dirty = self.refresh(&mut graph, winner.edge);
        }

        let dag = if self.operator.works_on_classes() {
            graph::to_dag(&graph)?
        } else {
            graph
        };
        let score = self.oracle.score_graph(&dag)?;
        debug!(
            operator = self.operator.name(),
            candidates = self.candidates.len(),
            iterations,
            initial,
            score,
            "search.worker.finished"
        );
        if score > initial {
            Ok(WorkerOutcome {
                graph: dag,
                changed: true,
                score,
                iterations,
            })
        } else {
            Ok(WorkerOutcome {
                iterations,
                ..unchanged(start, initial)
            })
        }
    }

    fn score_all(&self, graph: &Pdag, edges: &[Edge]) -> Vec<Option<EdgeCandidate>> {
        let evaluate = |&edge: &Edge| self.operator.evaluate(graph, edge, self.oracle);
        if self.settings.parallel_scoring {
            edges.par_iter().map(evaluate).collect()
        } else {
            edges.iter().map(evaluate).collect()
        }
    }

    /// Restores the working graph's invariants after a move and returns the
    /// nodes whose candidates form the next round (`None` means all).
    fn refresh(&self, graph: &mut Pdag, moved: Edge) -> Option<BTreeSet<VarId>> {
        let classes = self.operator.works_on_classes();
        let mode = match self.operator.phase() {
            Phase::Forward => self.settings.refresh,
            Phase::Backward => RefreshMode::Full,
        };
        let mut process = match mode {
            RefreshMode::SpeedUp => BTreeSet::new(),
            _ if classes => graph::rebuild_cpdag(graph),
            _ => BTreeSet::new(),
        };
        if mode == RefreshMode::Full {
            return None;
        }
        for v in [moved.from, moved.to] {
            process.insert(v);
            process.extend(graph.adjacent(v));
        }
        Some(process)
    }
}

fn unchanged(start: &Pdag, score: f64) -> WorkerOutcome {
    WorkerOutcome {
        graph: start.clone(),
        changed: false,
        score,
        iterations: 0,
    }
}
