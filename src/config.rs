//! Search and scoring configuration, with presets and TOML loading.

use std::fs;
use std::path::Path;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};
use crate::rng::{DEFAULT_SEED, MAX_WORKERS};

/// Which search template the engine runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Partitioned GES with consensus fusion.
    ParallelGes,
    /// Sequential GES over the whole edge universe.
    Ges,
    /// Sequential arc addition/removal over DAGs.
    HillClimbing,
}

/// How a worker picks the edge to apply among its best candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SelectionPolicy {
    /// Always the single best candidate.
    Greedy,
    /// Uniformly among the retained top-K candidates.
    Randomized,
}

/// What a forward worker recomputes after applying an insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum RefreshMode {
    /// Rebuild the CPDAG and rescore every candidate.
    Full,
    /// Rebuild the CPDAG, rescore only candidates near the change.
    Neighborhood,
    /// Skip the CPDAG rebuild and rescore near the change. Approximate.
    SpeedUp,
}

/// Edge partitioning strategy for parallel stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PartitionStrategy {
    /// Seeded shuffle split into near-equal groups.
    Random,
    /// Mutual-information clustering of variables.
    Hierarchical,
    /// Clustering where variables may belong to several clusters.
    HierarchicalJoint,
}

/// Knobs for the convergence loop, stages and workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Search template.
    pub algorithm: Algorithm,
    /// Partitions, and so threads, per stage.
    pub workers: usize,
    /// Forward/backward rounds before the loop gives up on convergence.
    pub max_iterations: usize,
    /// Worker rounds allowed within one stage; `None` runs to exhaustion.
    pub stage_iteration_cap: Option<usize>,
    /// Forward workers stop once the graph holds this many edges.
    pub max_edges: Option<usize>,
    /// How workers pick among their best moves.
    pub selection: SelectionPolicy,
    /// Best moves a worker retains per round.
    pub top_k: usize,
    /// Largest auxiliary subset size that is still grown by one more node.
    pub subset_growth_cap: usize,
    /// Candidate refresh after a forward move.
    pub refresh: RefreshMode,
    /// Score each worker's candidates on the rayon pool.
    pub parallel_scoring: bool,
    /// Root of every random stream in a search.
    pub seed: u64,
    /// How the edge universe is split for forward stages.
    pub partition: PartitionStrategy,
    /// Stack size for worker threads; the platform default when unset.
    pub worker_stack_size: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self::parallel(2)
    }
}

impl SearchConfig {
    /// Partitioned GES over `workers` threads.
    pub fn parallel(workers: usize) -> Self {
        Self {
            algorithm: Algorithm::ParallelGes,
            workers,
            max_iterations: 15,
            stage_iteration_cap: Some(5),
            max_edges: None,
            selection: SelectionPolicy::Greedy,
            top_k: 10,
            subset_growth_cap: 1,
            refresh: RefreshMode::Full,
            parallel_scoring: false,
            seed: DEFAULT_SEED,
            partition: PartitionStrategy::Random,
            worker_stack_size: None,
        }
    }

    /// Plain sequential GES.
    pub fn ges() -> Self {
        Self {
            algorithm: Algorithm::Ges,
            workers: 1,
            stage_iteration_cap: None,
            parallel_scoring: true,
            ..Self::parallel(1)
        }
    }

    /// Sequential hill climbing over DAGs.
    pub fn hill_climbing() -> Self {
        Self {
            algorithm: Algorithm::HillClimbing,
            ..Self::ges()
        }
    }

    /// Checks ranges the engine relies on.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(SearchError::InvalidArgument("workers must be at least 1".into()));
        }
        if self.workers > MAX_WORKERS {
            return Err(SearchError::InvalidArgument(format!(
                "workers must be at most {MAX_WORKERS}"
            )));
        }
        if self.top_k == 0 {
            return Err(SearchError::InvalidArgument("top_k must be at least 1".into()));
        }
        if self.stage_iteration_cap == Some(0) {
            return Err(SearchError::InvalidArgument(
                "stage_iteration_cap must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Score-cache sizing policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachePolicy {
    /// Share of all possible (variable, parent set) pairs to keep.
    pub target_fraction: f64,
    /// The cache may use `available memory / memory_divisor` bytes.
    pub memory_divisor: u64,
    /// Estimated footprint of one cached score.
    pub bytes_per_entry: u64,
    /// Overrides the probed available memory, in bytes.
    pub memory_budget: Option<u64>,
    /// Independently locked cache segments.
    pub shards: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            target_fraction: 0.1,
            memory_divisor: 3,
            bytes_per_entry: 220,
            memory_budget: None,
            shards: 16,
        }
    }
}

/// BDeu parameters and the parent-count bound.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreConfig {
    /// Parent sets of this size or larger score negative infinity.
    pub max_parents: usize,
    /// BDeu structure prior.
    pub structure_prior: f64,
    /// BDeu equivalent sample size.
    pub sample_prior: f64,
    /// Cache sizing.
    pub cache: CachePolicy,
}

impl Default for ScoreConfig {
    fn default() -> Self {
        Self {
            max_parents: 5,
            structure_prior: 0.001,
            sample_prior: 10.0,
            cache: CachePolicy::default(),
        }
    }
}

/// Top-level file layout: `[search]`, `[score]` and `[score.cache]` tables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PgesConfig {
    /// The `[search]` table.
    pub search: SearchConfig,
    /// The `[score]` table.
    pub score: ScoreConfig,
}

impl PgesConfig {
    /// Reads a TOML file; absent tables and keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text).map_err(|message| SearchError::Config {
            path: path.to_path_buf(),
            message,
        })
    }

    fn from_toml(text: &str) -> std::result::Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|e| e.to_string())?;
        config.search.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn presets_pick_their_algorithm() {
        assert_eq!(SearchConfig::parallel(4).workers, 4);
        assert_eq!(SearchConfig::ges().algorithm, Algorithm::Ges);
        assert_eq!(SearchConfig::hill_climbing().workers, 1);
        assert_eq!(SearchConfig::default().refresh, RefreshMode::Full);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nworkers = 4\nselection = \"randomized\"").unwrap();
        writeln!(file, "[score.cache]\nmemory_budget = 1048576").unwrap();
        let config = PgesConfig::load(file.path()).unwrap();
        assert_eq!(config.search.workers, 4);
        assert_eq!(config.search.selection, SelectionPolicy::Randomized);
        assert_eq!(config.search.top_k, 10);
        assert_eq!(config.score.max_parents, 5);
        assert_eq!(config.score.cache.memory_budget, Some(1 << 20));
    }

    #[test]
    fn validate_bounds_the_worker_count() {
        assert!(SearchConfig::parallel(MAX_WORKERS).validate().is_ok());
        assert!(matches!(
            SearchConfig::parallel(MAX_WORKERS + 1).validate(),
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(SearchConfig::parallel(0).validate().is_err());
    }

    #[test]
    fn bad_file_reports_its_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[search]\nworkers = 0").unwrap();
        match PgesConfig::load(file.path()) {
            Err(SearchError::Config { path, .. }) => assert_eq!(path, file.path()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
