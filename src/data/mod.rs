//! Discrete tabular data consumed by the score oracle and the clustering
//! partitioner.

mod loader;
pub mod generator;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

pub use generator::NetworkSampler;

/// A discrete variable: display name plus its ordered category labels.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    /// Column name.
    pub name: String,
    /// Category labels; a cell value `v` refers to `categories[v]`.
    pub categories: Vec<String>,
}

impl Variable {
    /// Creates a variable with the given labels.
    pub fn new(name: impl Into<String>, categories: Vec<String>) -> Self {
        Self {
            name: name.into(),
            categories,
        }
    }

    /// Number of distinct categories.
    pub fn num_categories(&self) -> usize {
        self.categories.len()
    }
}

/// Read-only view over a discrete dataset.
///
/// The score oracle consumes this once at construction; column slices must
/// contain category indices in `0..variables()[i].num_categories()`.
pub trait Dataset: Send + Sync {
    /// Number of rows (cases).
    fn num_rows(&self) -> usize;
    /// Ordered variable list.
    fn variables(&self) -> &[Variable];
    /// Category indices of column `index`, one per row.
    fn column(&self, index: usize) -> &[u32];

    /// Number of variables.
    fn num_variables(&self) -> usize {
        self.variables().len()
    }
}

/// Column-major in-memory dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscreteDataset {
    variables: Vec<Variable>,
    columns: Vec<Vec<u32>>,
    rows: usize,
}

impl DiscreteDataset {
    /// Builds a dataset from per-variable columns.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Data`] when the column count differs from the
    /// variable count, columns have different lengths, a variable has no
    /// categories, or a cell is out of its variable's category range.
    pub fn new(variables: Vec<Variable>, columns: Vec<Vec<u32>>) -> Result<Self> {
        if variables.len() != columns.len() {
            return Err(SearchError::Data(format!(
                "{} variables but {} columns",
                variables.len(),
                columns.len()
            )));
        }
        let rows = columns.first().map(Vec::len).unwrap_or(0);
        for (var, column) in variables.iter().zip(&columns) {
            if var.categories.is_empty() {
                return Err(SearchError::Data(format!(
                    "variable {} has no categories",
                    var.name
                )));
            }
            if column.len() != rows {
                return Err(SearchError::Data(format!(
                    "column {} has {} rows, expected {rows}",
                    var.name,
                    column.len()
                )));
            }
            let limit = var.num_categories() as u32;
            if let Some(bad) = column.iter().find(|&&v| v >= limit) {
                return Err(SearchError::Data(format!(
                    "column {} holds category {bad} outside 0..{limit}",
                    var.name
                )));
            }
        }
        Ok(Self {
            variables,
            columns,
            rows,
        })
    }

    /// Returns the index of the variable called `name`, ignoring ASCII case.
    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables
            .iter()
            .position(|v| v.name.eq_ignore_ascii_case(name))
    }
}

impl Dataset for DiscreteDataset {
    fn num_rows(&self) -> usize {
        self.rows
    }

    fn variables(&self) -> &[Variable] {
        &self.variables
    }

    fn column(&self, index: usize) -> &[u32] {
        &self.columns[index]
    }
}

/// Mutual information between two columns, in bits.
///
/// Only observed joint cells are visited, so zero counts never reach the
/// logarithm.
pub fn mutual_information(data: &dyn Dataset, a: usize, b: usize) -> f64 {
    let rows = data.num_rows();
    if rows == 0 {
        return 0.0;
    }
    let col_a = data.column(a);
    let col_b = data.column(b);
    let mut counts_a = vec![0u32; data.variables()[a].num_categories()];
    let mut counts_b = vec![0u32; data.variables()[b].num_categories()];
    let mut joint: FxHashMap<(u32, u32), u32> = FxHashMap::default();
    for (&va, &vb) in col_a.iter().zip(col_b) {
        counts_a[va as usize] += 1;
        counts_b[vb as usize] += 1;
        *joint.entry((va, vb)).or_insert(0) += 1;
    }
    let total = rows as f64;
    joint
        .iter()
        .map(|(&(va, vb), &count)| {
            let p_ab = f64::from(count) / total;
            let p_a = f64::from(counts_a[va as usize]) / total;
            let p_b = f64::from(counts_b[vb as usize]) / total;
            p_ab * (p_ab / (p_a * p_b)).log2()
        })
        .sum()
}

/// Symmetric pairwise mutual-information matrix with a zero diagonal.
pub fn mutual_information_matrix(data: &dyn Dataset) -> Vec<Vec<f64>> {
    let n = data.num_variables();
    let upper: Vec<Vec<f64>> = (0..n)
        .into_par_iter()
        .map(|i| {
            ((i + 1)..n)
                .map(|j| mutual_information(data, i, j))
                .collect()
        })
        .collect();
    let mut matrix = vec![vec![0.0; n]; n];
    for (i, row) in upper.into_iter().enumerate() {
        for (offset, value) in row.into_iter().enumerate() {
            let j = i + 1 + offset;
            matrix[i][j] = value;
            matrix[j][i] = value;
        }
    }
    matrix
}
