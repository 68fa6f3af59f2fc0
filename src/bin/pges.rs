//! Command-line front end for structure learning.
#![forbid(unsafe_code)]

use std::error::Error;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};
use pges::config::{PartitionStrategy, RefreshMode, SelectionPolicy};
use pges::data::NetworkSampler;
use pges::graph::structural_hamming_distance;
use pges::logging::init_logging;
use pges::score::ScoreStats;
use pges::{Algorithm, DiscreteDataset, Edge, Pdag, PgesConfig, ScoreOracle, SearchEngine, SearchReport};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(
    name = "pges",
    version,
    about = "Learn discrete Bayesian network structure with parallel GES",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "TOML file with [search] and [score] tables")]
    config: Option<PathBuf>,

    #[arg(
        long,
        global = true,
        env = "PGES_LOG",
        default_value = "warn",
        help = "Log filter, e.g. info or pges::search=debug"
    )]
    log_level: String,

    #[arg(
        long,
        global = true,
        value_enum,
        default_value_t = OutputFormat::Text,
        help = "Output format for reports"
    )]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Learn a network from a CSV file of category labels.
    Learn {
        #[arg(value_name = "CSV")]
        data: PathBuf,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Sample the cancer toy network and learn it back.
    Demo {
        #[arg(long, default_value_t = 5000, help = "Rows to sample")]
        rows: usize,
        #[command(flatten)]
        search: SearchArgs,
    },
    /// Score a DAG given as a list of edges.
    Score {
        #[arg(value_name = "CSV")]
        data: PathBuf,
        #[arg(long = "edge", value_name = "FROM:TO", help = "Directed edge, repeatable")]
        edges: Vec<String>,
    },
}

#[derive(Args, Debug, Default)]
struct SearchArgs {
    #[arg(long, value_enum, help = "Search algorithm")]
    algorithm: Option<Algorithm>,

    #[arg(long, help = "Worker threads per stage")]
    workers: Option<usize>,

    #[arg(long, help = "Maximum forward/backward rounds")]
    max_iterations: Option<usize>,

    #[arg(long, help = "Moves per worker and stage")]
    stage_iteration_cap: Option<usize>,

    #[arg(long, help = "Stop inserting once the graph has this many edges")]
    max_edges: Option<usize>,

    #[arg(long, value_enum, help = "How workers choose among their best moves")]
    selection: Option<SelectionPolicy>,

    #[arg(long, value_enum, help = "Candidate refresh after an insertion")]
    refresh: Option<RefreshMode>,

    #[arg(long, value_enum, help = "Edge partitioning strategy")]
    partition: Option<PartitionStrategy>,

    #[arg(long, help = "Random seed")]
    seed: Option<u64>,

    #[arg(long, help = "Parent sets of this size or larger are rejected")]
    max_parents: Option<usize>,

    #[arg(long, help = "Score candidate edges on the rayon pool")]
    parallel_scoring: bool,
}

impl SearchArgs {
    fn apply(&self, config: &mut PgesConfig) {
        let search = &mut config.search;
        if let Some(algorithm) = self.algorithm {
            search.algorithm = algorithm;
        }
        if let Some(workers) = self.workers {
            search.workers = workers;
        }
        if let Some(max) = self.max_iterations {
            search.max_iterations = max;
        }
        if self.stage_iteration_cap.is_some() {
            search.stage_iteration_cap = self.stage_iteration_cap;
        }
        if self.max_edges.is_some() {
            search.max_edges = self.max_edges;
        }
        if let Some(selection) = self.selection {
            search.selection = selection;
        }
        if let Some(refresh) = self.refresh {
            search.refresh = refresh;
        }
        if let Some(partition) = self.partition {
            search.partition = partition;
        }
        if let Some(seed) = self.seed {
            search.seed = seed;
        }
        if self.parallel_scoring {
            search.parallel_scoring = true;
        }
        if let Some(max_parents) = self.max_parents {
            config.score.max_parents = max_parents;
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Serialize)]
struct DemoReport {
    rows: usize,
    structural_hamming_distance: usize,
    search: SearchReport,
}

#[derive(Serialize)]
struct ScoreReport {
    score: f64,
    empty_graph_score: f64,
    edges: Vec<String>,
    stats: ScoreStats,
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;
    let mut config = match &cli.config {
        Some(path) => PgesConfig::load(path)?,
        None => PgesConfig::default(),
    };

    match &cli.command {
        Command::Learn { data, search } => {
            search.apply(&mut config);
            let dataset = DiscreteDataset::from_csv_path(data)?;
            let engine = SearchEngine::new(&dataset, &config)?;
            engine.search()?;
            let report = engine.report();
            emit(cli.format, &report, || print_search_text(&report))?;
        }
        Command::Demo { rows, search } => {
            search.apply(&mut config);
            let network = NetworkSampler::cancer();
            let dataset = network.sample(*rows, config.search.seed)?;
            let engine = SearchEngine::new(&dataset, &config)?;
            let learned = engine.search()?;
            let report = DemoReport {
                rows: *rows,
                structural_hamming_distance: structural_hamming_distance(
                    &network.dag(),
                    &learned,
                )?,
                search: engine.report(),
            };
            emit(cli.format, &report, || {
                print_search_text(&report.search);
                println!(
                    "rows={} structural_hamming_distance={}",
                    report.rows, report.structural_hamming_distance
                );
            })?;
        }
        Command::Score { data, edges } => {
            let dataset = DiscreteDataset::from_csv_path(data)?;
            let oracle = ScoreOracle::new(&dataset, &config.score)?;
            let graph = parse_graph(&oracle, edges)?;
            let report = ScoreReport {
                score: oracle.score_graph(&graph)?,
                empty_graph_score: oracle.empty_graph_score(),
                edges: edges.clone(),
                stats: oracle.stats(),
            };
            emit(cli.format, &report, || {
                println!("score={:.4} empty_graph_score={:.4}", report.score, report.empty_graph_score);
            })?;
        }
    }
    Ok(())
}

fn parse_graph(oracle: &ScoreOracle, specs: &[String]) -> Result<Pdag, Box<dyn Error>> {
    let lookup = |name: &str| {
        oracle
            .variable(name.trim())
            .ok_or_else(|| format!("unknown variable '{name}'"))
    };
    let mut edges = Vec::with_capacity(specs.len());
    for spec in specs {
        let (from, to) = spec
            .split_once(':')
            .ok_or_else(|| format!("edge '{spec}' must look like FROM:TO"))?;
        edges.push(Edge::new(lookup(from)?, lookup(to)?));
    }
    let graph = Pdag::from_edges(oracle.num_variables(), &edges);
    if !graph.is_dag() {
        return Err("edges do not form a DAG".into());
    }
    Ok(graph)
}

fn emit<T, F>(format: OutputFormat, value: &T, printer: F) -> Result<(), Box<dyn Error>>
where
    T: Serialize,
    F: Fn(),
{
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{json}");
        }
        OutputFormat::Text => printer(),
    }
    Ok(())
}

fn print_search_text(report: &SearchReport) {
    println!(
        "algorithm={:?} workers={} iterations={} elapsed_ms={} interrupted={}",
        report.algorithm, report.workers, report.iterations, report.elapsed_ms, report.interrupted
    );
    println!(
        "score: initial={:.4} final={:.4}",
        report.initial_score, report.final_score
    );
    println!(
        "cache: calls={} computed={} hits={} entries={}/{}",
        report.score_stats.total_calls,
        report.score_stats.non_cached_calls,
        report.score_stats.cache_hits,
        report.score_stats.cache_len,
        report.score_stats.cache_capacity
    );
    println!("edges ({}):", report.edges.len());
    for edge in &report.edges {
        println!("  {edge}");
    }
}
