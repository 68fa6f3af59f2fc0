#![allow(missing_docs)]

use std::collections::BTreeSet;

use pges::config::SearchConfig;
use pges::data::NetworkSampler;
use pges::partition::{EdgePartitioner, HierarchicalPartitioner, RandomPartitioner};
use pges::rng::SeededRng;
use pges::search::{
    CancelToken, ConsensusIntersection, ConsensusUnion, Fusion, FusionContext, GesDelete,
    GesInsert, StageRunner, WorkerSettings,
};
use pges::types::all_arcs;
use pges::{Dataset, DiscreteDataset, Edge, Pdag, Result, ScoreConfig, ScoreOracle};

fn data() -> Result<DiscreteDataset> {
    NetworkSampler::cancer().sample(4000, 99)
}

fn covered(partitions: &[BTreeSet<Edge>]) -> BTreeSet<Edge> {
    partitions.iter().flatten().copied().collect()
}

#[test]
fn partitioners_cover_the_universe() -> Result<()> {
    let data = data()?;
    let universe = all_arcs(data.variables().len());
    let expected: BTreeSet<Edge> = universe.iter().copied().collect();
    let mut rng = SeededRng::new(3);

    let random = RandomPartitioner.partition(&universe, 4, &mut rng);
    assert_eq!(random.len(), 4);
    assert_eq!(covered(&random), expected);
    assert_eq!(random.iter().map(BTreeSet::len).sum::<usize>(), universe.len());

    for joint in [false, true] {
        let mut hierarchical = HierarchicalPartitioner::from_dataset(&data, joint);
        let parts = hierarchical.partition(&universe, 2, &mut rng);
        assert_eq!(parts.len(), 2);
        assert_eq!(covered(&parts), expected);
    }
    Ok(())
}

#[test]
fn forward_then_backward_round_never_regresses() -> Result<()> {
    let data = data()?;
    let oracle = ScoreOracle::new(&data, &ScoreConfig::default())?;
    let n = oracle.num_variables();
    let settings = WorkerSettings::from(&SearchConfig::parallel(3));
    let cancel = CancelToken::new();
    let rng = SeededRng::new(17);
    let runner = StageRunner {
        oracle: &oracle,
        settings: &settings,
        cancel: &cancel,
        rng: &rng,
        round: 0,
    };
    let ctx = FusionContext {
        oracle: &oracle,
        cancel: &cancel,
        rng: rng.derive(1000),
    };

    let start = Pdag::new(n);
    let start_score = oracle.score_graph(&start)?;
    let mut partition_rng = rng.derive(2000);
    let partitions = RandomPartitioner.partition(&all_arcs(n), 3, &mut partition_rng);

    let forward = runner.run(&GesInsert { growth_cap: 1 }, &start, &partitions)?;
    assert_eq!(forward.graphs.len(), 3);
    assert!(forward.graphs.iter().all(Pdag::is_dag));
    let fused = ConsensusUnion.fuse(&ctx, &start, start_score, &forward.graphs)?;
    assert!(fused.graph.is_dag());
    assert!(fused.score >= start_score);
    assert_eq!(fused.score, oracle.score_graph(&fused.graph)?);
    if forward.changed {
        assert!(fused.score > start_score);
    }

    let edges = fused.graph.directed_edges();
    let backward_parts = vec![edges.iter().copied().collect::<BTreeSet<_>>()];
    let backward = runner.run(&GesDelete { growth_cap: 1 }, &fused.graph, &backward_parts)?;
    let pruned = ConsensusIntersection.fuse(&ctx, &fused.graph, fused.score, &backward.graphs)?;
    assert!(pruned.graph.is_dag());
    assert!(pruned.score >= fused.score);
    for edge in pruned.graph.directed_edges() {
        assert!(fused.graph.is_adjacent(edge.from, edge.to));
    }
    Ok(())
}

#[test]
fn stages_are_reproducible() -> Result<()> {
    let data = data()?;
    let oracle = ScoreOracle::new(&data, &ScoreConfig::default())?;
    let n = oracle.num_variables();
    let settings = WorkerSettings::from(&SearchConfig::parallel(2));
    let cancel = CancelToken::new();
    let run = |seed: u64| -> Result<Vec<Pdag>> {
        let rng = SeededRng::new(seed);
        let runner = StageRunner {
            oracle: &oracle,
            settings: &settings,
            cancel: &cancel,
            rng: &rng,
            round: 0,
        };
        let partitions = RandomPartitioner.partition(&all_arcs(n), 2, &mut rng.derive(1));
        Ok(runner.run(&GesInsert { growth_cap: 1 }, &Pdag::new(n), &partitions)?.graphs)
    };
    assert_eq!(run(5)?, run(5)?);
    Ok(())
}
