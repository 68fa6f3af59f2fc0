#![allow(missing_docs)]

use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::thread;

use pges::config::{PartitionStrategy, SelectionPolicy};
use pges::data::NetworkSampler;
use pges::graph::structural_hamming_distance;
use pges::types::all_arcs;
use pges::{
    Dataset, DiscreteDataset, Edge, PgesConfig, Result, ScoreOracle, SearchConfig, SearchEngine,
};

fn cancer(rows: usize) -> Result<(NetworkSampler, DiscreteDataset)> {
    let network = NetworkSampler::cancer();
    let data = network.sample(rows, 2024)?;
    Ok((network, data))
}

fn to_csv(data: &DiscreteDataset) -> String {
    let mut out = String::new();
    let names: Vec<&str> = data.variables().iter().map(|v| v.name.as_str()).collect();
    out.push_str(&names.join(","));
    out.push('\n');
    for row in 0..data.num_rows() {
        let cells: Vec<&str> = data
            .variables()
            .iter()
            .enumerate()
            .map(|(i, v)| v.categories[data.column(i)[row] as usize].as_str())
            .collect();
        let _ = writeln!(out, "{}", cells.join(","));
    }
    out
}

#[test]
fn parallel_search_learns_a_better_than_empty_dag() -> Result<()> {
    let (network, data) = cancer(5000)?;
    let config = PgesConfig {
        search: SearchConfig::parallel(2),
        ..PgesConfig::default()
    };
    let engine = SearchEngine::new(&data, &config)?;
    let learned = engine.search()?;
    let report = engine.report();

    assert!(learned.is_dag());
    assert!(!report.interrupted);
    assert!(report.final_score > report.initial_score);
    assert!(report.score_history.windows(2).all(|w| w[1] >= w[0]));
    assert!(report.edges.iter().all(|e| e.contains(" -> ")));
    assert!(report.score_stats.cache_hits > 0);
    assert!(report.score_stats.non_cached_calls <= report.score_stats.total_calls);

    let shd = structural_hamming_distance(&network.dag(), &learned)?;
    assert!(shd <= 10);
    Ok(())
}

#[test]
fn one_round_on_seed_42_stays_within_the_universe() -> Result<()> {
    let network = NetworkSampler::cancer();
    let data = network.sample(2000, 42)?;
    let config = PgesConfig {
        search: SearchConfig {
            max_iterations: 1,
            seed: 42,
            ..SearchConfig::parallel(2)
        },
        ..PgesConfig::default()
    };
    let engine = SearchEngine::new(&data, &config)?;
    let graph = engine.search()?;
    assert_eq!(engine.iterations(), 1);
    assert!(engine.score() >= engine.oracle().empty_graph_score());

    let universe: HashSet<Edge> = all_arcs(data.num_variables()).into_iter().collect();
    for edge in graph.directed_edges() {
        assert!(universe.contains(&edge), "{edge}");
    }
    Ok(())
}

#[test]
fn every_algorithm_and_partitioner_produces_a_dag() -> Result<()> {
    let (_, data) = cancer(2000)?;
    let mut configs = vec![SearchConfig::ges(), SearchConfig::hill_climbing()];
    for partition in [
        PartitionStrategy::Random,
        PartitionStrategy::Hierarchical,
        PartitionStrategy::HierarchicalJoint,
    ] {
        configs.push(SearchConfig {
            partition,
            selection: SelectionPolicy::Randomized,
            ..SearchConfig::parallel(3)
        });
    }
    for search in configs {
        let config = PgesConfig {
            search,
            ..PgesConfig::default()
        };
        let engine = SearchEngine::new(&data, &config)?;
        let graph = engine.search()?;
        assert!(graph.is_dag(), "{:?}", config.search);
        assert!(engine.score() >= engine.report().initial_score);
    }
    Ok(())
}

#[test]
fn csv_round_trip_scores_identically() -> Result<()> {
    let (network, data) = cancer(1000)?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("cancer.csv");
    std::fs::write(&path, to_csv(&data))?;
    let loaded = DiscreteDataset::from_csv_path(&path)?;
    assert_eq!(loaded.num_rows(), data.num_rows());
    assert_eq!(loaded.num_variables(), 5);

    let config = PgesConfig::default();
    let direct = ScoreOracle::new(&data, &config.score)?;
    let from_file = ScoreOracle::new(&loaded, &config.score)?;
    let truth = network.dag();
    let a = direct.score_graph(&truth)?;
    let b = from_file.score_graph(&truth)?;
    assert!((a - b).abs() < 1e-6, "{a} vs {b}");
    Ok(())
}

#[test]
fn toml_config_drives_the_engine() -> Result<()> {
    let (_, data) = cancer(500)?;
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("pges.toml");
    std::fs::write(
        &path,
        "[search]\nalgorithm = \"ges\"\nworkers = 4\nmax_iterations = 2\n\n[score]\nmax_parents = 3\n",
    )?;
    let config = PgesConfig::load(&path)?;
    assert_eq!(config.score.max_parents, 3);
    let engine = SearchEngine::new(&data, &config)?;
    engine.search()?;
    let report = engine.report();
    assert_eq!(report.workers, 1);
    assert!(report.iterations <= 2);
    Ok(())
}

#[test]
fn search_can_be_cancelled_from_another_thread() -> Result<()> {
    let (_, data) = cancer(3000)?;
    let config = PgesConfig {
        search: SearchConfig {
            stage_iteration_cap: None,
            ..SearchConfig::parallel(4)
        },
        ..PgesConfig::default()
    };
    let engine = Arc::new(SearchEngine::new(&data, &config)?);
    let token = engine.cancel_token();
    let runner = {
        let engine = Arc::clone(&engine);
        thread::spawn(move || engine.search())
    };
    token.cancel();
    let graph = runner.join().expect("search thread panicked")?;
    assert!(graph.is_dag());
    let report = engine.report();
    if report.interrupted {
        assert_eq!(report.score_history.len(), report.iterations + 1);
    }
    Ok(())
}
