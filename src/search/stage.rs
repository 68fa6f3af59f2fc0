use std::collections::BTreeSet;
use std::thread::{self, ScopedJoinHandle};

use tracing::{info, warn};

use crate::error::{Result, SearchError};
use crate::graph::Pdag;
use crate::rng::{worker_stream, SeededRng};
use crate::score::ScoreOracle;
use crate::types::Edge;

use super::operators::Operator;
use super::worker::{LocalSearchWorker, WorkerOutcome, WorkerSettings};
use super::CancelToken;

/// Partial graphs from one stage.
#[derive(Debug, Clone)]
pub struct StageOutcome {
    /// One graph per partition, in partition order. Holds only the starting
    /// graph when the stage was interrupted.
    pub graphs: Vec<Pdag>,
    /// Some worker improved on the starting graph.
    pub changed: bool,
    /// Cancellation stopped at least one worker.
    pub interrupted: bool,
    /// Final score of each worker, in partition order.
    pub worker_scores: Vec<f64>,
}

/// Fans a stage out to one scoped thread per partition and joins them all.
pub struct StageRunner<'a> {
    /// Shared scorer.
    pub oracle: &'a ScoreOracle,
    /// Copied into every worker.
    pub settings: &'a WorkerSettings,
    /// Observed by every worker between moves.
    pub cancel: &'a CancelToken,
    /// Parent of the per-worker streams.
    pub rng: &'a SeededRng,
    /// Round number, part of each worker's stream id.
    pub round: usize,
}

impl StageRunner<'_> {
    /// Runs `operator` on every partition from a private copy of `start`.
    ///
    /// Interruption yields an outcome flagged `interrupted` that carries
    /// `start` unchanged; a panicking worker or any other worker error fails
    /// the stage.
    pub fn run(
        &self,
        operator: &dyn Operator,
        start: &Pdag,
        partitions: &[BTreeSet<Edge>],
    ) -> Result<StageOutcome> {
        let phase = operator.phase();
        let results: Vec<Result<WorkerOutcome>> = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(partitions.len());
            for (index, subset) in partitions.iter().enumerate() {
                let worker = LocalSearchWorker::new(
                    self.oracle,
                    operator,
                    subset.iter().copied(),
                    self.settings.clone(),
                    self.rng.derive(worker_stream(self.round, phase.code(), index)),
                    self.cancel.clone(),
                );
                let mut builder = thread::Builder::new().name(format!("pges-{}-{index}", phase.as_str()));
                if let Some(size) = self.settings.stack_size {
                    builder = builder.stack_size(size);
                }
                match builder.spawn_scoped(scope, move || worker.run(start)) {
                    Ok(handle) => handles.push(handle),
                    Err(err) => {
                        // Running workers are joined here so a panic among
                        // them surfaces as an error instead of escaping the scope.
                        let _ = join_workers(handles, phase.as_str());
                        return Err(SearchError::from(err));
                    }
                }
            }
            Ok(join_workers(handles, phase.as_str()))
        })?;

        let mut interrupted = false;
        let mut outcomes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) if err.is_recoverable() => interrupted = true,
                Err(err) => return Err(err),
            }
        }
        if interrupted {
            warn!(
                phase = phase.as_str(),
                round = self.round,
                "search.stage.interrupted"
            );
            return Ok(StageOutcome {
                graphs: vec![start.clone()],
                changed: false,
                interrupted: true,
                worker_scores: Vec::new(),
            });
        }

        let changed = outcomes.iter().any(|o| o.changed);
        let worker_scores: Vec<f64> = outcomes.iter().map(|o| o.score).collect();
        info!(
            phase = phase.as_str(),
            round = self.round,
            workers = partitions.len(),
            changed,
            scores = ?worker_scores,
            "search.stage.completed"
        );
        Ok(StageOutcome {
            graphs: outcomes.into_iter().map(|o| o.graph).collect(),
            changed,
            interrupted: false,
            worker_scores,
        })
    }
}

fn join_workers(
    handles: Vec<ScopedJoinHandle<'_, Result<WorkerOutcome>>>,
    phase: &'static str,
) -> Vec<Result<WorkerOutcome>> {
    handles
        .into_iter()
        .enumerate()
        .map(|(worker, handle)| {
            handle
                .join()
                .map_err(|_| SearchError::WorkerPanicked { phase, worker })
                .and_then(|outcome| outcome)
        })
        .collect()
}
