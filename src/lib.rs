//! Parallel Greedy Equivalence Search for discrete Bayesian networks.
//!
//! The crate learns a DAG over a fixed set of discrete variables by searching
//! Markov-equivalence classes for the structure that maximizes a decomposable
//! score. The search fans the candidate-edge space out over worker threads,
//! reconciles their partial graphs through fusion, and alternates forward and
//! backward phases until the score stops improving.

#![warn(missing_docs)]

pub mod config;
pub mod data;
pub mod error;
pub mod graph;
pub mod logging;
pub mod partition;
pub mod rng;
pub mod score;
pub mod search;
pub mod types;

pub use config::{PgesConfig, ScoreConfig, SearchConfig};
pub use data::{Dataset, DiscreteDataset, Variable};
pub use error::{Result, SearchError};
pub use graph::Pdag;
pub use score::{BdeuScorer, LocalScorer, ParentSetKey, ScoreOracle};
pub use search::{Algorithm, CancelToken, SearchEngine, SearchReport};
pub use types::{Edge, VarId};
