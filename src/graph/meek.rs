use std::collections::BTreeSet;

use super::Pdag;
use crate::types::VarId;

/// Keeps only the orientations that form unshielded colliders and makes
/// every other edge undirected.
pub fn basic_cpdag(graph: &mut Pdag) {
    let mut keep = BTreeSet::new();
    for c in graph.nodes() {
        let parents = graph.parents(c);
        for (i, &a) in parents.iter().enumerate() {
            for &b in &parents[i + 1..] {
                if !graph.is_adjacent(a, b) {
                    keep.insert((a, c));
                    keep.insert((b, c));
                }
            }
        }
    }
    for edge in graph.directed_edges() {
        if !keep.contains(&(edge.from, edge.to)) {
            graph.add_undirected(edge.from, edge.to);
        }
    }
}

/// Re-derives the CPDAG in place and returns every node whose incident
/// endpoint marks changed.
pub fn rebuild_cpdag(graph: &mut Pdag) -> BTreeSet<VarId> {
    let before = graph.clone();
    basic_cpdag(graph);
    apply_meek_rules(graph);
    let mut changed = BTreeSet::new();
    for a in graph.nodes() {
        for b in graph.nodes() {
            if before.mark(a, b) != graph.mark(a, b) {
                changed.insert(a);
                changed.insert(b);
            }
        }
    }
    changed
}

/// The CPDAG of `graph`'s equivalence class.
pub fn to_cpdag(graph: &Pdag) -> Pdag {
    let mut cpdag = graph.clone();
    rebuild_cpdag(&mut cpdag);
    cpdag
}

fn apply_meek_rules(graph: &mut Pdag) {
    loop {
        let mut progressed = false;
        for (a, b) in graph.undirected_edges() {
            for (x, y) in [(a, b), (b, a)] {
                if graph.is_undirected(x, y) && implied(graph, x, y) && orient(graph, x, y) {
                    progressed = true;
                }
            }
        }
        if !progressed {
            break;
        }
    }
}

/// Orients `x -> y` unless that closes a directed cycle.
fn orient(graph: &mut Pdag, x: VarId, y: VarId) -> bool {
    graph.remove_edge(x, y);
    if graph.has_directed_path(y, x) {
        graph.add_undirected(x, y);
        return false;
    }
    graph.add_directed(x, y);
    true
}

/// Whether one of the four Meek rules forces the undirected `x --- y` into
/// `x -> y`.
fn implied(graph: &Pdag, x: VarId, y: VarId) -> bool {
    let nodes: Vec<VarId> = graph.nodes().collect();
    // R1: w -> x --- y with w, y non-adjacent.
    let r1 = nodes
        .iter()
        .any(|&w| graph.is_parent_of(w, x) && !graph.is_adjacent(w, y));
    if r1 {
        return true;
    }
    // R2: x -> w -> y.
    let r2 = nodes
        .iter()
        .any(|&w| graph.is_parent_of(x, w) && graph.is_parent_of(w, y));
    if r2 {
        return true;
    }
    // R3: x --- c -> y and x --- d -> y with c, d non-adjacent.
    let kites: Vec<VarId> = nodes
        .iter()
        .copied()
        .filter(|&c| graph.is_undirected(x, c) && graph.is_parent_of(c, y))
        .collect();
    let r3 = kites.iter().enumerate().any(|(i, &c)| {
        kites[i + 1..]
            .iter()
            .any(|&d| !graph.is_adjacent(c, d))
    });
    if r3 {
        return true;
    }
    // R4: x --- c -> d -> y with x, d adjacent and c, y non-adjacent.
    nodes.iter().any(|&d| {
        graph.is_adjacent(x, d)
            && graph.is_parent_of(d, y)
            && nodes.iter().any(|&c| {
                graph.is_undirected(x, c) && graph.is_parent_of(c, d) && !graph.is_adjacent(c, y)
            })
    })
}
