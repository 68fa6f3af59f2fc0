use tracing::trace;

use super::Pdag;
use crate::error::{Result, SearchError};
use crate::types::VarId;

/// Completes a PDAG to a consistent DAG extension (Dor and Tarsi).
///
/// Repeatedly removes a node that is a sink among the remaining nodes and
/// whose undirected neighbours are adjacent to everything else it is
/// adjacent to, orienting its undirected edges into it. Directed edges are
/// never reversed.
pub fn to_dag(pdag: &Pdag) -> Result<Pdag> {
    complete(pdag, false)
}

/// Completion that never fails followed by deletion of every directed edge
/// whose head still reaches its tail.
pub fn remove_inconsistencies(graph: &Pdag) -> Pdag {
    let mut dag = match complete(graph, true) {
        Ok(dag) => dag,
        Err(_) => graph.clone(),
    };
    for edge in dag.directed_edges() {
        if dag.has_directed_path(edge.to, edge.from) {
            trace!(edge = %edge, "graph.inconsistency.removed");
            dag.remove_edge(edge.from, edge.to);
        }
    }
    dag
}

fn complete(pdag: &Pdag, lenient: bool) -> Result<Pdag> {
    let mut dag = pdag.clone();
    let mut remaining = vec![true; pdag.num_nodes()];
    let mut left = pdag.num_nodes();
    while left > 0 {
        let live = |v: &VarId| remaining[v.index()];
        let strict = dag
            .nodes()
            .filter(live)
            .find(|&x| is_sink(&dag, x, &remaining) && neighbours_covered(&dag, x, &remaining));
        let chosen = match strict {
            Some(x) => x,
            None if lenient => {
                let fallback = dag
                    .nodes()
                    .filter(live)
                    .find(|&x| is_sink(&dag, x, &remaining))
                    .or_else(|| dag.nodes().find(live));
                match fallback {
                    Some(x) => x,
                    None => break,
                }
            }
            None => {
                return Err(SearchError::NoConsistentExtension(format!(
                    "no removable node among {left} remaining"
                )))
            }
        };
        for y in dag.neighbors(chosen) {
            if remaining[y.index()] {
                dag.add_directed(y, chosen);
            }
        }
        remaining[chosen.index()] = false;
        left -= 1;
    }
    Ok(dag)
}

fn is_sink(dag: &Pdag, x: VarId, remaining: &[bool]) -> bool {
    dag.children(x).iter().all(|c| !remaining[c.index()])
}

fn neighbours_covered(dag: &Pdag, x: VarId, remaining: &[bool]) -> bool {
    let adjacent: Vec<VarId> = dag
        .adjacent(x)
        .into_iter()
        .filter(|v| remaining[v.index()])
        .collect();
    dag.neighbors(x)
        .into_iter()
        .filter(|y| remaining[y.index()])
        .all(|y| adjacent.iter().all(|&z| z == y || dag.is_adjacent(y, z)))
}
