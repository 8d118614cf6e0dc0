//! Average-linkage (UPGMA) agglomerative clustering over a precomputed
//! dissimilarity matrix.
//!
//! Leaves are numbered `0..n`; the cluster created by merge step `k` gets id
//! `n + k`. When several pairs share the minimum distance, the pair with the
//! lowest `(smaller id, larger id)` merges first.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Default fraction of the highest merge distance used as the cut height
pub const CUTOFF_FRACTION: f64 = 0.7;

/// One merge step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkageRecord {
    pub left: usize,
    pub right: usize,
    pub distance: f64,
    /// Number of leaves under the new cluster
    pub size: usize,
}

/// Merge history over `leaves` items, `leaves - 1` records once complete.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Linkage {
    pub leaves: usize,
    pub records: Vec<LinkageRecord>,
}

impl Linkage {
    /// Cluster the items of a symmetric dissimilarity matrix with UPGMA until
    /// a single cluster is left.
    pub fn average(matrix: &DMatrix<f64>) -> Self {
        let n = matrix.nrows();
        let mut linkage = Linkage {
            leaves: n,
            records: Vec::with_capacity(n.saturating_sub(1)),
        };

        // Active clusters, always sorted by id as new ids only grow
        let mut active_nodes: Vec<usize> = (0..n).collect();
        let mut cluster_sizes: Vec<usize> = vec![1; n];

        let mut dists = HashMap::new();
        for i in 0..n {
            for j in (i + 1)..n {
                dists.insert((i, j), matrix[(i, j)]);
            }
        }

        while active_nodes.len() > 1 {
            // 1. Find the closest pair, the first one wins ties
            let mut min_dist = f64::MAX;
            let mut pair = (0, 1);
            for i in 0..active_nodes.len() {
                for j in (i + 1)..active_nodes.len() {
                    let key = (active_nodes[i], active_nodes[j]);
                    if let Some(&d) = dists.get(&key) {
                        if d < min_dist {
                            min_dist = d;
                            pair = (i, j);
                        }
                    }
                }
            }

            // 2. Merge
            let (idx1, idx2) = pair;
            let id1 = active_nodes[idx1];
            let id2 = active_nodes[idx2];
            let new_node = n + linkage.records.len();

            let size1 = cluster_sizes[id1];
            let size2 = cluster_sizes[id2];
            let new_size = size1 + size2;
            cluster_sizes.push(new_size);

            linkage.records.push(LinkageRecord {
                left: id1,
                right: id2,
                distance: min_dist,
                size: new_size,
            });

            // 3. Distances to the new cluster are size-weighted means
            let mut new_dists = Vec::new();
            for (k_idx, &other_id) in active_nodes.iter().enumerate() {
                if k_idx == idx1 || k_idx == idx2 {
                    continue;
                }

                let d1 = dists[&(id1.min(other_id), id1.max(other_id))];
                let d2 = dists[&(id2.min(other_id), id2.max(other_id))];

                let d_new = (d1 * size1 as f64 + d2 * size2 as f64) / new_size as f64;
                new_dists.push((other_id, d_new));
            }

            // idx2 > idx1, remove the later one first
            active_nodes.remove(idx2);
            active_nodes.remove(idx1);

            active_nodes.push(new_node);
            for (other_id, d) in new_dists {
                dists.insert((other_id, new_node), d);
            }
        }

        linkage
    }

    pub fn max_distance(&self) -> f64 {
        self.records
            .iter()
            .map(|r| r.distance)
            .fold(0.0, f64::max)
    }

    /// Flat partition at `threshold`.
    ///
    /// Every merge at or above the threshold separates two clusters, so
    /// `n_clusters = #(distance >= threshold) + 1` and the partition comes
    /// from applying the first `leaves - n_clusters` merges. Cluster ids are
    /// numbered in order of first appearance among the leaves.
    pub fn cut(&self, threshold: f64) -> Vec<usize> {
        let n = self.leaves;
        let above = self.records.iter().filter(|r| r.distance >= threshold).count();
        let n_clusters = (above + 1).min(n);

        let mut parent: Vec<usize> = (0..(2 * n)).collect();
        for (step, record) in self.records.iter().take(n - n_clusters).enumerate() {
            parent[record.left] = n + step;
            parent[record.right] = n + step;
        }

        let mut ids: HashMap<usize, usize> = HashMap::new();
        (0..n)
            .map(|leaf| {
                let mut root = leaf;
                while parent[root] != root {
                    root = parent[root];
                }
                let next = ids.len();
                *ids.entry(root).or_insert(next)
            })
            .collect()
    }

    /// Newick text of the merge tree. Branch lengths are the difference
    /// between the merge distances of parent and child.
    ///
    /// ```
    /// use conformers::libs::linkage::Linkage;
    /// use nalgebra::DMatrix;
    /// let m = DMatrix::from_row_slice(3, 3, &[0.0, 2.0, 4.0, 2.0, 0.0, 4.0, 4.0, 4.0, 0.0]);
    /// let names = vec!["A".to_string(), "B".to_string(), "C".to_string()];
    /// let linkage = Linkage::average(&m);
    /// assert_eq!(linkage.to_newick(&names), "(C:4,(A:2,B:2):2);");
    /// ```
    pub fn to_newick(&self, names: &[String]) -> String {
        match (self.leaves, self.records.len()) {
            (0, _) => String::new(),
            (1, _) => format!("{};", self.newick_node(0, names)),
            // no merges, a star with zero-length branches
            (n, 0) => {
                let leaves = (0..n)
                    .map(|leaf| format!("{}:0", self.newick_node(leaf, names)))
                    .collect::<Vec<_>>();
                format!("({});", leaves.join(","))
            }
            (n, m) => format!("{};", self.newick_node(n + m - 1, names)),
        }
    }

    fn height(&self, node: usize) -> f64 {
        if node < self.leaves {
            0.0
        } else {
            self.records[node - self.leaves].distance
        }
    }

    fn newick_node(&self, node: usize, names: &[String]) -> String {
        if node < self.leaves {
            return names.get(node).cloned().unwrap_or_else(|| node.to_string());
        }

        let record = &self.records[node - self.leaves];
        let children = [record.left, record.right]
            .iter()
            .map(|&child| {
                format!(
                    "{}:{}",
                    self.newick_node(child, names),
                    record.distance - self.height(child)
                )
            })
            .collect::<Vec<_>>();
        format!("({})", children.join(","))
    }
}

/// Linkage plus the flat partition obtained from it.
#[derive(Debug, Clone, PartialEq)]
pub struct Clusters {
    pub linkage: Linkage,
    /// Cluster id per item, in matrix order
    pub labels: Vec<usize>,
    /// Distance at which the tree was cut
    pub threshold: f64,
}

/// Average-linkage clustering with the cut placed at `cutoff_fraction` of the
/// highest merge distance. An all-zero matrix is a single cluster with an
/// empty linkage.
pub fn cluster_agglomerative(scores: &DMatrix<f64>, cutoff_fraction: f64) -> Clusters {
    let n = scores.nrows();

    if scores.iter().all(|&v| v == 0.0) {
        log::info!("All zero score matrix");
        return Clusters {
            linkage: Linkage {
                leaves: n,
                records: vec![],
            },
            labels: vec![0; n],
            threshold: 0.0,
        };
    }

    log::info!("Non-zero score matrix");
    let linkage = Linkage::average(scores);
    let threshold = cutoff_fraction * linkage.max_distance();
    log::debug!(
        "Cutting at {} ({} of {})",
        threshold,
        cutoff_fraction,
        linkage.max_distance()
    );
    let labels = linkage.cut(threshold);

    Clusters {
        linkage,
        labels,
        threshold,
    }
}
