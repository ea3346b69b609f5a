//! Reference trees a sampled tree is compared against.
//!
//! A reference is either a fixed tree or a [`ClusterTree`] built from an
//! alignment. Cluster trees can be bootstrapped into several candidates;
//! candidates that are identical under the chosen metric are then dropped
//! so that each distinct topology is counted once.

use crate::bootstrap::bootstrap_trees;
use crate::cluster::ClusterTree;
use crate::distances::{pairwise_distances_parallel, MetricKind, TreeMetric};
use crate::error::Result;
use crate::snapshot::TreeSnapshot;
use phylotree::tree::Tree as PhyloTree;
use rand::Rng;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub enum ReferenceTree {
    Fixed(PhyloTree),
    Cluster(ClusterTree),
}

impl ReferenceTree {
    pub fn tree(&self) -> &PhyloTree {
        match self {
            ReferenceTree::Fixed(tree) => tree,
            ReferenceTree::Cluster(cluster) => cluster.tree(),
        }
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self, ReferenceTree::Cluster(_))
    }

    /// Candidate trees: `bootstraps` replicates for a cluster tree, the tree
    /// itself otherwise (or when `bootstraps` is 0).
    pub fn candidates<R: Rng + ?Sized>(
        &self,
        bootstraps: usize,
        proportion: f64,
        rng: &mut R,
    ) -> Result<Vec<PhyloTree>> {
        match self {
            ReferenceTree::Cluster(cluster) if bootstraps > 0 => {
                bootstrap_trees(cluster, bootstraps, proportion, rng)
            }
            _ => Ok(vec![self.tree().clone()]),
        }
    }
}

impl From<PhyloTree> for ReferenceTree {
    fn from(tree: PhyloTree) -> Self {
        ReferenceTree::Fixed(tree)
    }
}

impl From<ClusterTree> for ReferenceTree {
    fn from(cluster: ClusterTree) -> Self {
        ReferenceTree::Cluster(cluster)
    }
}

/// A reference tree together with its metric.
#[derive(Debug, Clone)]
pub struct ReferenceEntry {
    pub tree: PhyloTree,
    pub metric: TreeMetric,
}

/// Distinct reference trees, in generation order.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTreeSet {
    entries: Vec<ReferenceEntry>,
}

impl ReferenceTreeSet {
    /// Build a metric per candidate and drop duplicates.
    pub fn from_candidates(kind: MetricKind, candidates: Vec<PhyloTree>) -> Result<Self> {
        let entries = candidates
            .into_iter()
            .map(|tree| {
                let metric = TreeMetric::new(kind, &tree)?;
                Ok(ReferenceEntry { tree, metric })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ReferenceTreeSet {
            entries: deduplicate(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ReferenceEntry] {
        &self.entries
    }

    pub fn trees(&self) -> impl Iterator<Item = &PhyloTree> {
        self.entries.iter().map(|e| &e.tree)
    }

    /// Labelled symmetric matrix of distances between the references.
    pub fn pairwise_matrix(&self) -> (Vec<String>, Vec<Vec<f64>>) {
        let n = self.entries.len();
        let names = (0..n).map(|i| format!("ref{i}")).collect();
        let mut mat = vec![vec![0.0f64; n]; n];
        if let Some(first) = self.entries.first() {
            let snaps: Vec<TreeSnapshot> = self.entries.iter().map(|e| e.metric.reference().clone()).collect();
            for (i, j, d) in pairwise_distances_parallel(&snaps, first.metric.kind()) {
                mat[i][j] = d;
                mat[j][i] = d;
            }
        }
        (names, mat)
    }

    /// Distance from `snapshot` to every reference, in order.
    pub fn distances_to(&self, snapshot: &TreeSnapshot) -> Result<Vec<f64>> {
        self.entries
            .iter()
            .map(|e| e.metric.distance_to(snapshot))
            .collect()
    }
}

/// For each pair `i < j` with neither discarded, discard `j` if it is at
/// distance 0 from `i`. Keeps the first of every group of identical trees.
fn deduplicate(entries: Vec<ReferenceEntry>) -> Vec<ReferenceEntry> {
    if entries.len() < 2 {
        return entries;
    }
    let kind = entries[0].metric.kind();
    let snaps: Vec<TreeSnapshot> = entries.iter().map(|e| e.metric.reference().clone()).collect();

    // Pairs arrive in row-major order, which is the scan order below.
    let mut discarded: HashSet<usize> = HashSet::new();
    for (i, j, d) in pairwise_distances_parallel(&snaps, kind) {
        if discarded.contains(&i) || discarded.contains(&j) {
            continue;
        }
        if d == 0.0 {
            discarded.insert(j);
        }
    }

    entries
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| !discarded.contains(idx))
        .map(|(_, entry)| entry)
        .collect()
}
