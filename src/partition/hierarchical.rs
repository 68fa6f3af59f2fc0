use std::collections::BTreeSet;

use tracing::debug;

use super::EdgePartitioner;
use crate::data::{mutual_information_matrix, Dataset};
use crate::rng::SeededRng;
use crate::types::Edge;

/// Groups variables by average-linkage agglomerative clustering on pairwise
/// mutual information, then derives edge subsets from the clusters.
///
/// An edge whose endpoints share a cluster is replicated into every shared
/// cluster; an edge spanning clusters goes to whichever of its endpoints'
/// clusters currently holds the fewest edges. Clusters are reused while the
/// requested number of parts stays the same.
pub struct HierarchicalPartitioner {
    similarity: Vec<Vec<f64>>,
    joint: bool,
    clusters: Option<(usize, Vec<BTreeSet<usize>>)>,
}

impl HierarchicalPartitioner {
    /// Uses a precomputed symmetric similarity matrix.
    pub fn new(similarity: Vec<Vec<f64>>, joint: bool) -> Self {
        Self {
            similarity,
            joint,
            clusters: None,
        }
    }

    /// Similarity is pairwise mutual information of the dataset columns.
    pub fn from_dataset(data: &dyn Dataset, joint: bool) -> Self {
        Self::new(mutual_information_matrix(data), joint)
    }

    /// Variable clusters, computing them for `parts` groups if needed.
    pub fn clusters(&mut self, parts: usize) -> &[BTreeSet<usize>] {
        if !matches!(&self.clusters, Some((cached, _)) if *cached == parts) {
            let mut clusters = self.agglomerate(parts.max(1));
            if self.joint {
                self.share_boundary_variables(&mut clusters);
            }
            debug!(
                parts,
                sizes = ?clusters.iter().map(BTreeSet::len).collect::<Vec<_>>(),
                "partition.clusters.built"
            );
            self.clusters = Some((parts, clusters));
        }
        self.clusters
            .as_ref()
            .map(|(_, clusters)| clusters.as_slice())
            .unwrap_or_default()
    }

    fn linkage(&self, a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> f64 {
        let total: f64 = a
            .iter()
            .flat_map(|&i| b.iter().map(move |&j| (i, j)))
            .map(|(i, j)| self.similarity[i][j])
            .sum();
        total / (a.len() * b.len()) as f64
    }

    fn agglomerate(&self, parts: usize) -> Vec<BTreeSet<usize>> {
        let n = self.similarity.len();
        let cap = n.div_ceil(parts).max(1);
        let mut clusters: Vec<BTreeSet<usize>> = (0..n).map(|i| BTreeSet::from([i])).collect();
        while clusters.len() > parts {
            let mut best: Option<(f64, usize, usize)> = None;
            for i in 0..clusters.len() {
                for j in (i + 1)..clusters.len() {
                    if clusters[i].len() + clusters[j].len() > cap {
                        continue;
                    }
                    let score = self.linkage(&clusters[i], &clusters[j]);
                    if best.map_or(true, |(s, _, _)| score > s) {
                        best = Some((score, i, j));
                    }
                }
            }
            let (i, j) = match best {
                Some((_, i, j)) => (i, j),
                None => two_smallest(&clusters),
            };
            let merged = clusters.remove(j);
            clusters[i].extend(merged);
        }
        clusters.resize(parts, BTreeSet::new());
        clusters
    }

    /// Each variable also joins the foreign cluster it is most similar to,
    /// when that affinity is at least its affinity to its own cluster.
    fn share_boundary_variables(&self, clusters: &mut [BTreeSet<usize>]) {
        let snapshot: Vec<BTreeSet<usize>> = clusters.to_vec();
        for (home, members) in snapshot.iter().enumerate() {
            for &v in members {
                let single = BTreeSet::from([v]);
                let others: BTreeSet<usize> = members.iter().copied().filter(|&u| u != v).collect();
                let own = if others.is_empty() {
                    0.0
                } else {
                    self.linkage(&single, &others)
                };
                let foreign = snapshot
                    .iter()
                    .enumerate()
                    .filter(|(c, cluster)| *c != home && !cluster.is_empty())
                    .map(|(c, cluster)| (c, self.linkage(&single, cluster)))
                    .fold(None, |best: Option<(usize, f64)>, cand| match best {
                        Some(b) if b.1 >= cand.1 => Some(b),
                        _ => Some(cand),
                    });
                if let Some((c, affinity)) = foreign {
                    if affinity >= own {
                        clusters[c].insert(v);
                    }
                }
            }
        }
    }
}

fn two_smallest(clusters: &[BTreeSet<usize>]) -> (usize, usize) {
    let mut order: Vec<usize> = (0..clusters.len()).collect();
    order.sort_by_key(|&i| (clusters[i].len(), i));
    let (a, b) = (order[0], order[1]);
    (a.min(b), a.max(b))
}

impl EdgePartitioner for HierarchicalPartitioner {
    fn partition(
        &mut self,
        universe: &[Edge],
        parts: usize,
        _rng: &mut SeededRng,
    ) -> Vec<BTreeSet<Edge>> {
        let clusters = self.clusters(parts).to_vec();
        let mut membership: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); self.similarity.len()];
        for (c, cluster) in clusters.iter().enumerate() {
            for &v in cluster {
                membership[v].insert(c);
            }
        }
        let mut subsets: Vec<BTreeSet<Edge>> = vec![BTreeSet::new(); clusters.len()];
        for &edge in universe {
            let from = &membership[edge.from.index()];
            let to = &membership[edge.to.index()];
            for &c in from.intersection(to) {
                subsets[c].insert(edge);
            }
            let target = from
                .symmetric_difference(to)
                .copied()
                .min_by_key(|&c| (subsets[c].len(), c));
            if let Some(c) = target {
                subsets[c].insert(edge);
            }
        }
        subsets
    }

    fn name(&self) -> &'static str {
        if self.joint {
            "hierarchical_joint"
        } else {
            "hierarchical"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{all_arcs, VarId};

    /// Two tight blocks {0, 1} and {2, 3} with weak links between them.
    fn blocks() -> Vec<Vec<f64>> {
        let mut m = vec![vec![0.01; 4]; 4];
        for i in 0..4 {
            m[i][i] = 0.0;
        }
        m[0][1] = 0.9;
        m[1][0] = 0.9;
        m[2][3] = 0.8;
        m[3][2] = 0.8;
        m
    }

    #[test]
    fn clusters_follow_similarity() {
        let mut p = HierarchicalPartitioner::new(blocks(), false);
        let clusters = p.clusters(2).to_vec();
        assert_eq!(clusters.len(), 2);
        assert!(clusters.contains(&BTreeSet::from([0, 1])));
        assert!(clusters.contains(&BTreeSet::from([2, 3])));
    }

    #[test]
    fn inner_edges_stay_home_and_outer_edges_balance() {
        let mut p = HierarchicalPartitioner::new(blocks(), false);
        let universe = all_arcs(4);
        let parts = p.partition(&universe, 2, &mut SeededRng::default());
        let home = |a: u32, b: u32| {
            parts
                .iter()
                .filter(|s| s.contains(&Edge::new(VarId(a), VarId(b))))
                .count()
        };
        assert_eq!(home(0, 1), 1);
        assert_eq!(home(3, 2), 1);
        assert_eq!(home(0, 3), 1);
        let total: usize = parts.iter().map(BTreeSet::len).sum();
        assert_eq!(total, universe.len());
        assert_eq!(parts[0].len(), parts[1].len());
    }

    #[test]
    fn joint_mode_replicates_shared_edges() {
        let mut m = blocks();
        // variable 1 is as close to {2, 3} as to 0
        for j in [2, 3] {
            m[1][j] = 0.9;
            m[j][1] = 0.9;
        }
        let mut p = HierarchicalPartitioner::new(m, true);
        let universe = all_arcs(4);
        let parts = p.partition(&universe, 2, &mut SeededRng::default());
        let total: usize = parts.iter().map(BTreeSet::len).sum();
        assert!(total > universe.len());
        let union: BTreeSet<Edge> = parts.into_iter().flatten().collect();
        assert_eq!(union.len(), universe.len());
    }

    #[test]
    fn changing_the_part_count_rebuilds_clusters() {
        let mut p = HierarchicalPartitioner::new(blocks(), false);
        let universe = all_arcs(4);
        let mut rng = SeededRng::default();
        assert_eq!(p.partition(&universe, 2, &mut rng).len(), 2);

        let three = p.partition(&universe, 3, &mut rng);
        assert_eq!(three.len(), 3);
        let union: BTreeSet<Edge> = three.into_iter().flatten().collect();
        assert_eq!(union.len(), universe.len());

        assert_eq!(p.partition(&universe, 2, &mut rng).len(), 2);
        assert_eq!(p.clusters(2).len(), 2);
    }

    #[test]
    fn more_parts_than_variables_pads_with_empty_subsets() {
        let mut p = HierarchicalPartitioner::new(blocks(), false);
        let parts = p.partition(&all_arcs(4), 6, &mut SeededRng::default());
        assert_eq!(parts.len(), 6);
        assert!(parts[4].is_empty() && parts[5].is_empty());
    }
}
