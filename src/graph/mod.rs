//! Partially directed graphs over the variable set.
//!
//! An edge between `a` and `b` carries one endpoint mark at each end:
//! `a -> b` has a tail at `a` and an arrow at `b`, `a --- b` has tails at
//! both ends. A DAG is a PDAG with no undirected edges and no directed
//! cycle.

mod extension;
mod meek;

use std::collections::{BTreeSet, VecDeque};
use std::fmt;

use crate::error::{Result, SearchError};
use crate::types::{Edge, VarId};

pub use extension::{remove_inconsistencies, to_dag};
pub use meek::{basic_cpdag, rebuild_cpdag, to_cpdag};

/// Mark at one end of an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Plain end: `a --- b` or the tail of `a -> b`.
    Tail,
    /// Arrowhead.
    Arrow,
}

/// Dense PDAG: `marks[a * n + b]` is the mark at `b` of the edge `a`-`b`.
#[derive(Clone, PartialEq, Eq)]
pub struct Pdag {
    n: usize,
    marks: Vec<Option<Endpoint>>,
}

impl Pdag {
    /// Graph with `n` nodes and no edges.
    pub fn new(n: usize) -> Self {
        Self {
            n,
            marks: vec![None; n * n],
        }
    }

    /// DAG with the given directed edges; later duplicates overwrite earlier
    /// ones.
    pub fn from_edges<'a>(n: usize, edges: impl IntoIterator<Item = &'a Edge>) -> Self {
        let mut graph = Self::new(n);
        for edge in edges {
            graph.add_directed(edge.from, edge.to);
        }
        graph
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.n
    }

    /// Node ids in order.
    pub fn nodes(&self) -> impl Iterator<Item = VarId> {
        (0..self.n).map(VarId::from_index)
    }

    /// Number of adjacent pairs.
    pub fn num_edges(&self) -> usize {
        self.pairs().count()
    }

    fn idx(&self, a: VarId, b: VarId) -> usize {
        a.index() * self.n + b.index()
    }

    /// Mark at `b` of the edge between `a` and `b`.
    pub fn mark(&self, a: VarId, b: VarId) -> Option<Endpoint> {
        self.marks[self.idx(a, b)]
    }

    /// Whether any edge joins `a` and `b`.
    pub fn is_adjacent(&self, a: VarId, b: VarId) -> bool {
        self.mark(a, b).is_some()
    }

    /// True for a directed edge `a -> b`.
    pub fn is_parent_of(&self, a: VarId, b: VarId) -> bool {
        self.mark(a, b) == Some(Endpoint::Arrow) && self.mark(b, a) == Some(Endpoint::Tail)
    }

    /// Whether `a --- b` is present.
    pub fn is_undirected(&self, a: VarId, b: VarId) -> bool {
        self.mark(a, b) == Some(Endpoint::Tail) && self.mark(b, a) == Some(Endpoint::Tail)
    }

    /// Sets `a -> b`, replacing any edge between the two.
    pub fn add_directed(&mut self, a: VarId, b: VarId) {
        if a == b {
            return;
        }
        let (ab, ba) = (self.idx(a, b), self.idx(b, a));
        self.marks[ab] = Some(Endpoint::Arrow);
        self.marks[ba] = Some(Endpoint::Tail);
    }

    /// Sets `a --- b`, replacing any edge between the two.
    pub fn add_undirected(&mut self, a: VarId, b: VarId) {
        if a == b {
            return;
        }
        let (ab, ba) = (self.idx(a, b), self.idx(b, a));
        self.marks[ab] = Some(Endpoint::Tail);
        self.marks[ba] = Some(Endpoint::Tail);
    }

    /// Removes whatever edge joins `a` and `b`; returns whether one existed.
    pub fn remove_edge(&mut self, a: VarId, b: VarId) -> bool {
        let existed = self.is_adjacent(a, b);
        let (ab, ba) = (self.idx(a, b), self.idx(b, a));
        self.marks[ab] = None;
        self.marks[ba] = None;
        existed
    }

    /// Nodes with a directed edge into `v`.
    pub fn parents(&self, v: VarId) -> Vec<VarId> {
        self.nodes().filter(|&u| self.is_parent_of(u, v)).collect()
    }

    /// Nodes `v` points into.
    pub fn children(&self, v: VarId) -> Vec<VarId> {
        self.nodes().filter(|&u| self.is_parent_of(v, u)).collect()
    }

    /// Nodes joined to `v` by an undirected edge.
    pub fn neighbors(&self, v: VarId) -> Vec<VarId> {
        self.nodes().filter(|&u| self.is_undirected(v, u)).collect()
    }

    /// Every node adjacent to `v`.
    pub fn adjacent(&self, v: VarId) -> Vec<VarId> {
        self.nodes().filter(|&u| self.is_adjacent(v, u)).collect()
    }

    fn pairs(&self) -> impl Iterator<Item = (VarId, VarId)> + '_ {
        self.nodes().flat_map(move |a| {
            self.nodes()
                .skip(a.index() + 1)
                .filter(move |&b| self.is_adjacent(a, b))
                .map(move |b| (a, b))
        })
    }

    /// Directed edges ordered by tail, then head.
    pub fn directed_edges(&self) -> Vec<Edge> {
        self.nodes()
            .flat_map(|a| {
                self.nodes()
                    .filter(move |&b| self.is_parent_of(a, b))
                    .map(move |b| Edge::new(a, b))
            })
            .collect()
    }

    /// Undirected edges as `(low, high)` pairs.
    pub fn undirected_edges(&self) -> Vec<(VarId, VarId)> {
        self.pairs()
            .filter(|&(a, b)| self.is_undirected(a, b))
            .collect()
    }

    /// Adjacent pairs as `(low, high)` regardless of orientation.
    pub fn skeleton(&self) -> Vec<(VarId, VarId)> {
        self.pairs().collect()
    }

    /// Whether any edge is still undirected.
    pub fn has_undirected(&self) -> bool {
        self.pairs().any(|(a, b)| self.is_undirected(a, b))
    }

    /// True iff every pair of `nodes` is adjacent.
    pub fn is_clique(&self, nodes: &[VarId]) -> bool {
        nodes.iter().enumerate().all(|(i, &a)| {
            nodes[i + 1..]
                .iter()
                .all(|&b| a == b || self.is_adjacent(a, b))
        })
    }

    /// Whether `to` is reachable from `from` along directed edges. A node
    /// trivially reaches itself.
    pub fn has_directed_path(&self, from: VarId, to: VarId) -> bool {
        self.reaches(from, to, &[], |g, u, w| g.is_parent_of(u, w))
    }

    /// True iff every path from `from` to `to` made of undirected and
    /// forward-directed edges passes through `blocked`.
    pub fn is_semi_directed_blocked(&self, from: VarId, to: VarId, blocked: &[VarId]) -> bool {
        if blocked.contains(&from) {
            return true;
        }
        !self.reaches(from, to, blocked, |g, u, w| {
            g.is_parent_of(u, w) || g.is_undirected(u, w)
        })
    }

    fn reaches<F>(&self, from: VarId, to: VarId, blocked: &[VarId], step: F) -> bool
    where
        F: Fn(&Self, VarId, VarId) -> bool,
    {
        let mut seen = vec![false; self.n];
        let mut queue = VecDeque::from([from]);
        seen[from.index()] = true;
        while let Some(u) = queue.pop_front() {
            if u == to {
                return true;
            }
            for w in self.nodes() {
                if !seen[w.index()] && !blocked.contains(&w) && step(self, u, w) {
                    seen[w.index()] = true;
                    queue.push_back(w);
                }
            }
        }
        false
    }

    /// Kahn order over the directed edges; `None` when they contain a cycle.
    /// Undirected edges are ignored.
    pub fn topological_order(&self) -> Option<Vec<VarId>> {
        let mut indegree: Vec<usize> = self.nodes().map(|v| self.parents(v).len()).collect();
        let mut ready: VecDeque<VarId> = self
            .nodes()
            .filter(|v| indegree[v.index()] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.n);
        while let Some(u) = ready.pop_front() {
            order.push(u);
            for w in self.children(u) {
                indegree[w.index()] -= 1;
                if indegree[w.index()] == 0 {
                    ready.push_back(w);
                }
            }
        }
        (order.len() == self.n).then_some(order)
    }

    /// No directed cycle among the directed edges.
    pub fn is_acyclic(&self) -> bool {
        self.topological_order().is_some()
    }

    /// Fully directed and acyclic.
    pub fn is_dag(&self) -> bool {
        !self.has_undirected() && self.is_acyclic()
    }

    /// Parents, children, the children's other parents, and undirected
    /// neighbours of `v`.
    pub fn markov_blanket(&self, v: VarId) -> BTreeSet<VarId> {
        let mut blanket: BTreeSet<VarId> = self.parents(v).into_iter().collect();
        blanket.extend(self.neighbors(v));
        for child in self.children(v) {
            blanket.insert(child);
            blanket.extend(self.parents(child).into_iter().filter(|&p| p != v));
        }
        blanket
    }

    /// Skeleton plus an edge between every pair of co-parents.
    fn moral_adjacency(&self) -> Vec<bool> {
        let mut adjacency: Vec<bool> = self.marks.iter().map(Option::is_some).collect();
        for v in self.nodes() {
            let parents = self.parents(v);
            for (i, &a) in parents.iter().enumerate() {
                for &b in &parents[i + 1..] {
                    adjacency[self.idx(a, b)] = true;
                    adjacency[self.idx(b, a)] = true;
                }
            }
        }
        adjacency
    }

    /// Renders edges as `A --> B` / `A --- B` using `names`, falling back to
    /// indices for missing names.
    pub fn describe(&self, names: &[String]) -> String {
        let name = |v: VarId| {
            names
                .get(v.index())
                .cloned()
                .unwrap_or_else(|| v.to_string())
        };
        let mut lines = Vec::new();
        for (a, b) in self.pairs() {
            let line = if self.is_parent_of(a, b) {
                format!("{} --> {}", name(a), name(b))
            } else if self.is_parent_of(b, a) {
                format!("{} --> {}", name(b), name(a))
            } else {
                format!("{} --- {}", name(a), name(b))
            };
            lines.push(line);
        }
        lines.join("\n")
    }
}

impl fmt::Debug for Pdag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pdag")
            .field("nodes", &self.n)
            .field("directed", &self.directed_edges())
            .field("undirected", &self.undirected_edges())
            .finish()
    }
}

impl fmt::Display for Pdag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe(&[]))
    }
}

/// Structural Hamming distance between the moral graphs of two DAGs: the
/// number of pairs adjacent in exactly one of them.
pub fn structural_hamming_distance(a: &Pdag, b: &Pdag) -> Result<usize> {
    if a.n != b.n {
        return Err(SearchError::InvalidArgument(format!(
            "cannot compare graphs over {} and {} nodes",
            a.n, b.n
        )));
    }
    let (ma, mb) = (a.moral_adjacency(), b.moral_adjacency());
    let differing = a
        .nodes()
        .flat_map(|u| a.nodes().skip(u.index() + 1).map(move |w| (u, w)))
        .filter(|&(u, w)| ma[a.idx(u, w)] != mb[b.idx(u, w)])
        .count();
    Ok(differing)
}
