//! The search engine: operators, local workers, stages, fusion and the
//! convergence loop that ties them together.

mod candidate;
mod engine;
mod fusion;
mod operators;
mod stage;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::score::ScoreStats;

pub use crate::config::Algorithm;
pub use candidate::{BestEdges, EdgeCandidate};
pub use engine::SearchEngine;
pub use fusion::{
    consensus_intersection, consensus_union, ConsensusIntersection, ConsensusUnion, Fusion,
    FusionContext, FusionDecision, FusionOutcome, InconsistencyRepair,
};
pub use operators::{ArcAddition, ArcRemoval, GesDelete, GesInsert, Operator};
pub use stage::{StageOutcome, StageRunner};
pub use worker::{LocalSearchWorker, WorkerOutcome, WorkerSettings};

/// Direction of a search stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Edge insertion.
    Forward,
    /// Edge deletion.
    Backward,
}

impl Phase {
    /// Lower-case label for logs, thread names and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Forward => "forward",
            Phase::Backward => "backward",
        }
    }

    fn code(self) -> u8 {
        match self {
            Phase::Forward => 0,
            Phase::Backward => 1,
        }
    }
}

/// Cloneable handle that interrupts a running search.
///
/// Workers poll it between moves; once set, the current stage stops and
/// the engine returns the last fused graph.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Token that is not cancelled yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests interruption.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called on any clone.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a previous request so the engine can run again.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One forward+backward round of the convergence loop.
#[derive(Debug, Clone, Serialize)]
pub struct RoundRecord {
    /// Zero-based round number.
    pub round: usize,
    /// Some forward worker improved its graph.
    pub forward_changed: bool,
    /// Some backward worker improved its graph.
    pub backward_changed: bool,
    /// Outcome of the forward fusion.
    pub forward_fusion: FusionDecision,
    /// Outcome of the backward fusion.
    pub backward_fusion: FusionDecision,
    /// Score at the end of the round.
    pub score: f64,
}

/// Summary of a finished (or interrupted) search.
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    /// Algorithm that ran.
    pub algorithm: Algorithm,
    /// Workers used per stage.
    pub workers: usize,
    /// Rounds completed.
    pub iterations: usize,
    /// Wall time in milliseconds.
    pub elapsed_ms: u64,
    /// Score of the starting graph.
    pub initial_score: f64,
    /// Score of the returned graph.
    pub final_score: f64,
    /// Score after every completed round, starting with the initial score.
    pub score_history: Vec<f64>,
    /// Per-round details.
    pub rounds: Vec<RoundRecord>,
    /// The search stopped on cancellation.
    pub interrupted: bool,
    /// Oracle counters at the end of the search.
    pub score_stats: ScoreStats,
    /// Final edges as `A -> B` using variable names.
    pub edges: Vec<String>,
}
