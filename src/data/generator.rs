//! Forward sampling from small hand-specified discrete Bayesian networks.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::{DiscreteDataset, Variable};
use crate::error::{Result, SearchError};
use crate::graph::Pdag;
use crate::types::{Edge, VarId};

#[derive(Clone, Debug)]
struct Node {
    variable: Variable,
    parents: Vec<usize>,
    /// One distribution per parent configuration, first parent most
    /// significant.
    table: Vec<Vec<f64>>,
}

/// A discrete network that can draw i.i.d. samples.
///
/// Nodes are added in topological order: a node's parents must already be
/// present.
#[derive(Clone, Debug, Default)]
pub struct NetworkSampler {
    nodes: Vec<Node>,
}

impl NetworkSampler {
    /// Creates an empty network.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node with its conditional probability table and returns its
    /// index.
    pub fn add_node(
        &mut self,
        name: &str,
        categories: &[&str],
        parents: &[usize],
        table: Vec<Vec<f64>>,
    ) -> Result<usize> {
        let index = self.nodes.len();
        if categories.is_empty() {
            return Err(SearchError::InvalidArgument(format!(
                "node {name} needs at least one category"
            )));
        }
        if let Some(&p) = parents.iter().find(|&&p| p >= index) {
            return Err(SearchError::InvalidArgument(format!(
                "parent {p} of {name} is not declared yet"
            )));
        }
        let configurations: usize = parents
            .iter()
            .map(|&p| self.nodes[p].variable.num_categories())
            .product();
        if table.len() != configurations {
            return Err(SearchError::InvalidArgument(format!(
                "{name} needs {configurations} table rows, got {}",
                table.len()
            )));
        }
        for row in &table {
            let sum: f64 = row.iter().sum();
            if row.len() != categories.len() || (sum - 1.0).abs() > 1e-9 {
                return Err(SearchError::InvalidArgument(format!(
                    "{name} has a malformed distribution {row:?}"
                )));
            }
        }
        self.nodes.push(Node {
            variable: Variable::new(name, categories.iter().map(|c| c.to_string()).collect()),
            parents: parents.to_vec(),
            table,
        });
        Ok(index)
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True when no node has been added.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The generating structure as a DAG.
    pub fn dag(&self) -> Pdag {
        let edges: Vec<Edge> = self
            .nodes
            .iter()
            .enumerate()
            .flat_map(|(child, node)| {
                node.parents
                    .iter()
                    .map(move |&p| Edge::new(VarId::from_index(p), VarId::from_index(child)))
            })
            .collect();
        Pdag::from_edges(self.nodes.len(), &edges)
    }

    /// Draws `rows` samples deterministically from `seed`.
    pub fn sample(&self, rows: usize, seed: u64) -> Result<DiscreteDataset> {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut columns: Vec<Vec<u32>> = vec![Vec::with_capacity(rows); self.nodes.len()];
        let mut row = vec![0u32; self.nodes.len()];
        for _ in 0..rows {
            for (index, node) in self.nodes.iter().enumerate() {
                let configuration = node.parents.iter().fold(0usize, |acc, &p| {
                    acc * self.nodes[p].variable.num_categories() + row[p] as usize
                });
                row[index] = draw(&node.table[configuration], &mut rng);
                columns[index].push(row[index]);
            }
        }
        let variables = self.nodes.iter().map(|n| n.variable.clone()).collect();
        DiscreteDataset::new(variables, columns)
    }

    /// The five-node cancer network (Korb and Nicholson): Pollution and
    /// Smoker cause Cancer, which causes Xray and Dyspnoea.
    pub fn cancer() -> Self {
        let mut net = Self::new();
        let build = |net: &mut Self| -> Result<()> {
            let pollution = net.add_node("Pollution", &["low", "high"], &[], vec![vec![0.9, 0.1]])?;
            let smoker = net.add_node("Smoker", &["True", "False"], &[], vec![vec![0.3, 0.7]])?;
            let cancer = net.add_node(
                "Cancer",
                &["True", "False"],
                &[pollution, smoker],
                vec![
                    vec![0.03, 0.97],
                    vec![0.001, 0.999],
                    vec![0.05, 0.95],
                    vec![0.02, 0.98],
                ],
            )?;
            net.add_node(
                "Xray",
                &["positive", "negative"],
                &[cancer],
                vec![vec![0.9, 0.1], vec![0.2, 0.8]],
            )?;
            net.add_node(
                "Dyspnoea",
                &["True", "False"],
                &[cancer],
                vec![vec![0.65, 0.35], vec![0.3, 0.7]],
            )?;
            Ok(())
        };
        // The tables above are well formed, so construction cannot fail.
        if build(&mut net).is_err() {
            net.nodes.clear();
        }
        net
    }
}

fn draw(distribution: &[f64], rng: &mut ChaCha8Rng) -> u32 {
    let target: f64 = rng.gen();
    let mut cumulative = 0.0;
    for (category, p) in distribution.iter().enumerate() {
        cumulative += p;
        if target < cumulative {
            return category as u32;
        }
    }
    (distribution.len() - 1) as u32
}
