use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::{Algorithm, PartitionStrategy, PgesConfig, SearchConfig};
use crate::data::Dataset;
use crate::error::{Result, SearchError};
use crate::graph::{self, Pdag};
use crate::partition::{
    split, EdgePartitioner, HierarchicalPartitioner, RandomPartitioner, WholePartitioner,
};
use crate::rng::{worker_stream, SeededRng};
use crate::score::ScoreOracle;
use crate::types::{all_arcs, Edge, VarId};

use super::fusion::{
    ConsensusIntersection, ConsensusUnion, Fusion, FusionContext, FusionOutcome,
    InconsistencyRepair,
};
use super::operators::{ArcAddition, ArcRemoval, GesDelete, GesInsert, Operator};
use super::stage::{StageOutcome, StageRunner};
use super::worker::WorkerSettings;
use super::{CancelToken, Phase, RoundRecord, SearchReport};

const PARTITION_STREAM: u64 = u64::MAX;
const FUSION_PHASE_OFFSET: u8 = 2;

struct Strategies {
    forward: Box<dyn Operator>,
    backward: Box<dyn Operator>,
    forward_fusion: Box<dyn Fusion>,
    backward_fusion: Box<dyn Fusion>,
}

impl Strategies {
    fn for_config(config: &SearchConfig) -> Self {
        let cap = config.subset_growth_cap;
        match config.algorithm {
            Algorithm::ParallelGes => Self {
                forward: Box::new(GesInsert { growth_cap: cap }),
                backward: Box::new(GesDelete { growth_cap: cap }),
                forward_fusion: Box::new(ConsensusUnion),
                backward_fusion: Box::new(ConsensusIntersection),
            },
            Algorithm::Ges => Self {
                forward: Box::new(GesInsert { growth_cap: cap }),
                backward: Box::new(GesDelete { growth_cap: cap }),
                forward_fusion: Box::new(InconsistencyRepair),
                backward_fusion: Box::new(InconsistencyRepair),
            },
            Algorithm::HillClimbing => Self {
                forward: Box::new(ArcAddition),
                backward: Box::new(ArcRemoval),
                forward_fusion: Box::new(InconsistencyRepair),
                backward_fusion: Box::new(InconsistencyRepair),
            },
        }
    }
}

struct EngineState {
    graph: Pdag,
    score: f64,
    iterations: usize,
    elapsed: Duration,
    report: SearchReport,
}

/// Structure-learning engine: one score oracle, one configuration and the
/// injected operator, partition and fusion strategies.
///
/// `search` takes `&self`, so the engine can be shared behind an `Arc` while
/// other threads read progress or cancel through [`SearchEngine::cancel_token`].
pub struct SearchEngine {
    oracle: Arc<ScoreOracle>,
    config: SearchConfig,
    partitioner: Mutex<Box<dyn EdgePartitioner>>,
    strategies: Strategies,
    initial_graph: Pdag,
    cancel: CancelToken,
    state: RwLock<EngineState>,
}

impl SearchEngine {
    /// Builds a BDeu oracle over `data` and the configured partitioner.
    pub fn new(data: &dyn Dataset, config: &PgesConfig) -> Result<Self> {
        config.search.validate()?;
        let oracle = ScoreOracle::new(data, &config.score)?;
        let partitioner: Box<dyn EdgePartitioner> = match config.search.partition {
            PartitionStrategy::Random => Box::new(RandomPartitioner),
            PartitionStrategy::Hierarchical => {
                Box::new(HierarchicalPartitioner::from_dataset(data, false))
            }
            PartitionStrategy::HierarchicalJoint => {
                Box::new(HierarchicalPartitioner::from_dataset(data, true))
            }
        };
        Self::with_oracle(Arc::new(oracle), config.search.clone(), partitioner)
    }

    /// Engine over an existing oracle. Sequential algorithms ignore
    /// `partitioner` and use a single worker.
    pub fn with_oracle(
        oracle: Arc<ScoreOracle>,
        mut config: SearchConfig,
        partitioner: Box<dyn EdgePartitioner>,
    ) -> Result<Self> {
        config.validate()?;
        let partitioner: Box<dyn EdgePartitioner> = match config.algorithm {
            Algorithm::ParallelGes => partitioner,
            Algorithm::Ges | Algorithm::HillClimbing => {
                config.workers = 1;
                Box::new(WholePartitioner)
            }
        };
        let initial_graph = Pdag::new(oracle.num_variables());
        let score = oracle.score_graph(&initial_graph)?;
        let report = empty_report(&config, &oracle, score);
        Ok(Self {
            strategies: Strategies::for_config(&config),
            partitioner: Mutex::new(partitioner),
            state: RwLock::new(EngineState {
                graph: initial_graph.clone(),
                score,
                iterations: 0,
                elapsed: Duration::ZERO,
                report,
            }),
            initial_graph,
            cancel: CancelToken::new(),
            oracle,
            config,
        })
    }

    /// Seeds the search with `graph` instead of the empty graph. PDAGs are
    /// completed to a DAG first.
    pub fn with_initial_graph(mut self, graph: Pdag) -> Result<Self> {
        if graph.num_nodes() != self.oracle.num_variables() {
            return Err(SearchError::InvalidArgument(format!(
                "initial graph has {} nodes, expected {}",
                graph.num_nodes(),
                self.oracle.num_variables()
            )));
        }
        if self.oracle.max_parents() == 0 && graph.num_edges() > 0 {
            return Err(SearchError::InvalidArgument(
                "max_parents is 0 but the initial graph has edges".into(),
            ));
        }
        let dag = if graph.has_undirected() {
            graph::to_dag(&graph)?
        } else {
            graph
        };
        if !dag.is_acyclic() {
            return Err(SearchError::InvalidArgument(
                "initial graph contains a directed cycle".into(),
            ));
        }
        let score = self.oracle.score_graph(&dag)?;
        {
            let state = self.state.get_mut();
            state.graph = dag.clone();
            state.score = score;
            state.report = empty_report(&self.config, &self.oracle, score);
        }
        self.initial_graph = dag;
        Ok(self)
    }

    /// Replaces the forward and backward operators.
    pub fn with_operators(mut self, forward: Box<dyn Operator>, backward: Box<dyn Operator>) -> Self {
        self.strategies.forward = forward;
        self.strategies.backward = backward;
        self
    }

    /// Replaces the forward and backward fusion policies.
    pub fn with_fusion(mut self, forward: Box<dyn Fusion>, backward: Box<dyn Fusion>) -> Self {
        self.strategies.forward_fusion = forward;
        self.strategies.backward_fusion = backward;
        self
    }

    /// Handle that interrupts a running [`SearchEngine::search`].
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Scorer shared with every worker.
    pub fn oracle(&self) -> &Arc<ScoreOracle> {
        &self.oracle
    }

    /// Effective configuration after presets were applied.
    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Scores any DAG or PDAG with the shared cache.
    pub fn score_graph(&self, graph: &Pdag) -> Result<f64> {
        self.oracle.score_graph(graph)
    }

    /// Completed rounds of the current or last search.
    pub fn iterations(&self) -> usize {
        self.state.read().iterations
    }

    /// Wall time of the current or last search.
    pub fn elapsed(&self) -> Duration {
        self.state.read().elapsed
    }

    /// Score of the current working graph.
    pub fn score(&self) -> f64 {
        self.state.read().score
    }

    /// Snapshot of the current working graph.
    pub fn current_graph(&self) -> Pdag {
        self.state.read().graph.clone()
    }

    /// Report of the current or last search.
    pub fn report(&self) -> SearchReport {
        self.state.read().report.clone()
    }

    /// Alternates forward and backward stages until the score stops
    /// improving or `max_iterations` rounds have run, and returns the final
    /// DAG.
    ///
    /// Cancellation ends the search early with the last fused graph and
    /// marks the report as interrupted.
    pub fn search(&self) -> Result<Pdag> {
        let started = Instant::now();
        let universe = all_arcs(self.oracle.num_variables());
        let settings = WorkerSettings::from(&self.config);
        let rng = SeededRng::new(self.config.seed);
        let mut partition_rng = rng.derive(PARTITION_STREAM);
        let mut graph = self.initial_graph.clone();
        let mut score = self.oracle.score_graph(&graph)?;
        let mut report = empty_report(&self.config, &self.oracle, score);
        self.publish(&graph, score, 0, started, &report);
        info!(
            algorithm = ?self.config.algorithm,
            workers = self.config.workers,
            variables = self.oracle.num_variables(),
            initial_score = score,
            "search.started"
        );

        while report.iterations < self.config.max_iterations {
            let round = report.iterations;
            let round_start = score;
            let runner = StageRunner {
                oracle: &self.oracle,
                settings: &settings,
                cancel: &self.cancel,
                rng: &rng,
                round,
            };

            let partitions =
                self.partitioner
                    .lock()
                    .partition(&universe, self.config.workers, &mut partition_rng);
            let forward = runner.run(self.strategies.forward.as_ref(), &graph, &partitions)?;
            if forward.interrupted {
                report.interrupted = true;
                break;
            }
            let forward_fused =
                match self.fuse(Phase::Forward, round, &rng, &graph, score, &forward) {
                    Err(err) if err.is_recoverable() => {
                        report.interrupted = true;
                        break;
                    }
                    other => other?,
                };
            graph = forward_fused.graph;
            score = forward_fused.score;

            let partitions = self.backward_partitions(&graph, &mut partition_rng);
            let backward = runner.run(self.strategies.backward.as_ref(), &graph, &partitions)?;
            if backward.interrupted {
                report.interrupted = true;
                break;
            }
            let backward_fused =
                match self.fuse(Phase::Backward, round, &rng, &graph, score, &backward) {
                    Err(err) if err.is_recoverable() => {
                        report.interrupted = true;
                        break;
                    }
                    other => other?,
                };
            graph = backward_fused.graph;
            score = backward_fused.score;

            report.iterations += 1;
            report.score_history.push(score);
            report.rounds.push(RoundRecord {
                round,
                forward_changed: forward.changed,
                backward_changed: backward.changed,
                forward_fusion: forward_fused.decision,
                backward_fusion: backward_fused.decision,
                score,
            });
            self.publish(&graph, score, report.iterations, started, &report);
            info!(
                round,
                score,
                edges = graph.num_edges(),
                forward_changed = forward.changed,
                backward_changed = backward.changed,
                "search.round.completed"
            );
            if score <= round_start {
                break;
            }
        }

        if report.interrupted {
            warn!(iterations = report.iterations, "search.interrupted");
        }
        report.final_score = score;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        report.score_stats = self.oracle.stats();
        report.edges = graph
            .directed_edges()
            .into_iter()
            .map(|e| self.edge_label(e))
            .collect();
        info!(
            iterations = report.iterations,
            score,
            edges = graph.num_edges(),
            elapsed_ms = report.elapsed_ms,
            "search.completed"
        );
        self.publish(&graph, score, report.iterations, started, &report);
        Ok(graph)
    }

    fn backward_partitions(&self, graph: &Pdag, rng: &mut SeededRng) -> Vec<BTreeSet<Edge>> {
        let edges = graph.directed_edges();
        if self.config.workers <= 1 {
            vec![edges.into_iter().collect()]
        } else {
            split(&edges, self.config.workers, rng)
        }
    }

    fn fuse(
        &self,
        phase: Phase,
        round: usize,
        rng: &SeededRng,
        previous: &Pdag,
        previous_score: f64,
        stage: &StageOutcome,
    ) -> Result<FusionOutcome> {
        let ctx = FusionContext {
            oracle: &self.oracle,
            cancel: &self.cancel,
            rng: rng.derive(worker_stream(round, FUSION_PHASE_OFFSET + phase.code(), 0)),
        };
        let fusion = match phase {
            Phase::Forward => &self.strategies.forward_fusion,
            Phase::Backward => &self.strategies.backward_fusion,
        };
        fusion.fuse(&ctx, previous, previous_score, &stage.graphs)
    }

    fn edge_label(&self, edge: Edge) -> String {
        let name = |v: VarId| {
            self.oracle
                .variable_name(v)
                .map(str::to_owned)
                .unwrap_or_else(|| v.to_string())
        };
        format!("{} -> {}", name(edge.from), name(edge.to))
    }

    fn publish(
        &self,
        graph: &Pdag,
        score: f64,
        iterations: usize,
        started: Instant,
        report: &SearchReport,
    ) {
        let mut state = self.state.write();
        state.graph = graph.clone();
        state.score = score;
        state.iterations = iterations;
        state.elapsed = started.elapsed();
        state.report = report.clone();
    }
}

fn empty_report(config: &SearchConfig, oracle: &ScoreOracle, score: f64) -> SearchReport {
    SearchReport {
        algorithm: config.algorithm,
        workers: config.workers,
        iterations: 0,
        elapsed_ms: 0,
        initial_score: score,
        final_score: score,
        score_history: vec![score],
        rounds: Vec::new(),
        interrupted: false,
        score_stats: oracle.stats(),
        edges: Vec::new(),
    }
}
