use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use statrs::function::gamma::ln_gamma;

use super::{LocalScorer, Priors};
use crate::data::Dataset;

/// Bayesian Dirichlet equivalent uniform local score over a discrete
/// dataset, with a binomial structure prior on the parent count.
pub struct BdeuScorer {
    columns: Vec<Vec<u32>>,
    cardinalities: Vec<usize>,
    rows: usize,
    priors: RwLock<Priors>,
}

impl BdeuScorer {
    /// Copies the dataset columns once; later scoring never touches `data`.
    pub fn new(data: &dyn Dataset, priors: Priors) -> Self {
        let n = data.num_variables();
        Self {
            columns: (0..n).map(|i| data.column(i).to_vec()).collect(),
            cardinalities: data
                .variables()
                .iter()
                .map(|v| v.num_categories())
                .collect(),
            rows: data.num_rows(),
            priors: RwLock::new(priors),
        }
    }

    fn structure_term(&self, parent_count: usize, structure_prior: f64) -> f64 {
        let others = self.cardinalities.len().saturating_sub(1);
        if others == 0 {
            return 0.0;
        }
        let p = structure_prior / others as f64;
        let k = parent_count as f64;
        k * p.ln() + (others as f64 - k) * (1.0 - p).ln()
    }

    /// Per-configuration child counts, keyed by a mixed-radix configuration
    /// index when it fits in 64 bits.
    fn counts(&self, var: usize, parents: &[usize]) -> Vec<Vec<u32>> {
        let r = self.cardinalities[var];
        let child = &self.columns[var];
        let radix_fits = parents
            .iter()
            .try_fold(1u64, |acc, &p| acc.checked_mul(self.cardinalities[p] as u64))
            .is_some();
        if radix_fits {
            let mut table: FxHashMap<u64, Vec<u32>> = FxHashMap::default();
            for row in 0..self.rows {
                let config = parents.iter().fold(0u64, |acc, &p| {
                    acc * self.cardinalities[p] as u64 + u64::from(self.columns[p][row])
                });
                table.entry(config).or_insert_with(|| vec![0; r])[child[row] as usize] += 1;
            }
            table.into_values().collect()
        } else {
            let mut table: FxHashMap<Vec<u32>, Vec<u32>> = FxHashMap::default();
            for row in 0..self.rows {
                let config: Vec<u32> = parents.iter().map(|&p| self.columns[p][row]).collect();
                table.entry(config).or_insert_with(|| vec![0; r])[child[row] as usize] += 1;
            }
            table.into_values().collect()
        }
    }
}

impl LocalScorer for BdeuScorer {
    fn local_score(&self, var: usize, parents: &[usize]) -> f64 {
        let priors = *self.priors.read();
        let r = self.cardinalities[var] as f64;
        let q: f64 = parents
            .iter()
            .map(|&p| self.cardinalities[p] as f64)
            .product();
        let alpha_j = priors.sample / q;
        let alpha_jk = priors.sample / (r * q);
        let ln_alpha_j = ln_gamma(alpha_j);
        let ln_alpha_jk = ln_gamma(alpha_jk);

        let mut score = self.structure_term(parents.len(), priors.structure);
        for config in self.counts(var, parents) {
            let n_j: u32 = config.iter().sum();
            if n_j == 0 {
                continue;
            }
            score += ln_alpha_j - ln_gamma(alpha_j + f64::from(n_j));
            for n_jk in config.into_iter().filter(|&c| c > 0) {
                score += ln_gamma(alpha_jk + f64::from(n_jk)) - ln_alpha_jk;
            }
        }
        score
    }

    fn priors(&self) -> Priors {
        *self.priors.read()
    }

    fn set_priors(&self, priors: Priors) {
        *self.priors.write() = priors;
    }
}
