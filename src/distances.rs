//! Tree distance metrics over bitset snapshots.
//!
//! 1. **Robinson-Foulds (RF)**: number of splits found in only one of the two
//!    trees. Raw count, not normalised. For two rooted trees whose root
//!    clades differ, 2 is added: the root edge is a clade of its own in a
//!    rooted tree.
//!
//! 2. **Weighted Robinson-Foulds**: like RF but uses branch lengths. Shared
//!    splits add |length_a - length_b|, unshared ones their full length.
//!
//! 3. **Kuhner-Felsenstein (Branch Score)**: sqrt(Σ(length_a - length_b)²)
//!    over the same pairing.
//!
//! All three are zero for a tree compared with itself.

use crate::error::{Result, TreeDistanceError};
use crate::snapshot::TreeSnapshot;
use phylotree::tree::Tree as PhyloTree;
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MetricKind {
    #[default]
    RobinsonFoulds,
    WeightedRobinsonFoulds,
    KuhnerFelsenstein,
}

impl MetricKind {
    /// Distance between two snapshots. Taxon sets are not checked here.
    pub fn between(self, a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
        match self {
            MetricKind::RobinsonFoulds => rf_from_snapshots(a, b) as f64,
            MetricKind::WeightedRobinsonFoulds => weighted_rf_from_snapshots(a, b),
            MetricKind::KuhnerFelsenstein => kf_from_snapshots(a, b),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            MetricKind::RobinsonFoulds => "RF",
            MetricKind::WeightedRobinsonFoulds => "Weighted",
            MetricKind::KuhnerFelsenstein => "KF",
        };
        f.write_str(label)
    }
}

impl FromStr for MetricKind {
    type Err = TreeDistanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rf" | "robinson-foulds" | "robinsonfoulds" => Ok(MetricKind::RobinsonFoulds),
            "weighted" | "wrf" | "weighted-rf" => Ok(MetricKind::WeightedRobinsonFoulds),
            "kf" | "branch-score" | "kuhner-felsenstein" => Ok(MetricKind::KuhnerFelsenstein),
            _ => Err(TreeDistanceError::UnknownOption {
                kind: "metric",
                name: s.to_string(),
            }),
        }
    }
}

/// A distance metric bound to one reference tree.
///
/// The reference is fixed when the metric is created; afterwards only
/// [`distance`](TreeMetric::distance) is called, once per sampled tree.
#[derive(Debug, Clone)]
pub struct TreeMetric {
    kind: MetricKind,
    reference: TreeSnapshot,
}

impl TreeMetric {
    /// Bind a metric of the given kind to `reference`.
    pub fn new(kind: MetricKind, reference: &PhyloTree) -> Result<Self> {
        Ok(Self::from_snapshot(kind, TreeSnapshot::from_tree(reference)?))
    }

    pub fn from_snapshot(kind: MetricKind, reference: TreeSnapshot) -> Self {
        TreeMetric { kind, reference }
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    pub fn reference(&self) -> &TreeSnapshot {
        &self.reference
    }

    /// Distance from the reference to `tree`.
    ///
    /// # Errors
    /// [`TreeDistanceError::TaxonMismatch`] if `tree` is over other taxa than
    /// the reference.
    pub fn distance(&self, tree: &PhyloTree) -> Result<f64> {
        self.distance_to(&TreeSnapshot::from_tree(tree)?)
    }

    /// Same as [`distance`](TreeMetric::distance) for an already built snapshot.
    pub fn distance_to(&self, snapshot: &TreeSnapshot) -> Result<f64> {
        self.reference.check_same_taxa(snapshot)?;
        Ok(self.kind.between(&self.reference, snapshot))
    }
}

/// Compute Robinson-Foulds distance between two trees.
///
/// # Algorithm
/// RF = |A| + |B| - 2|A ∩ B|
///
/// where A and B are the split sets of each tree.
///
/// # Example
/// ```text
/// Tree 1:  ((A,B),(C,(D,E)))     Splits: {A,B}, {D,E}
/// Tree 2:  ((A,C),(B,(D,E)))     Splits: {A,C}, {D,E}
///
/// Shared: {D,E}
/// RF = 2 + 2 - 2*1 = 2, plus 2 for the different root clades
/// ```
///
/// When both trees are rooted and their root clades differ, the root
/// position adds exactly 2, however many clades the two rootings disagree
/// on. `(A,(B,(C,D)))` and `(((A,B),C),D)` share the split {A,B}|{C,D} and
/// are at distance 2.
pub fn robinson_foulds(tree_a: &PhyloTree, tree_b: &PhyloTree) -> Result<usize> {
    let snap_a = TreeSnapshot::from_tree(tree_a)?;
    let snap_b = TreeSnapshot::from_tree(tree_b)?;
    snap_a.check_same_taxa(&snap_b)?;

    Ok(rf_from_snapshots(&snap_a, &snap_b))
}

/// Robinson-Foulds distance from two pre-computed snapshots.
///
/// Differing root clades of two rooted trees count as 2.
pub fn rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> usize {
    let inter = a.parts.intersection(&b.parts).count();
    let rf = a.parts.len() + b.parts.len() - 2 * inter;
    let same_root = a.root_children == b.root_children;
    if a.rooted && b.rooted && !same_root { rf + 2 } else { rf }
}

/// Weighted Robinson-Foulds distance from two pre-computed snapshots.
pub fn weighted_rf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut distance = 0.0;

    for part in &a.parts {
        let length_a = a.lengths.get(part).unwrap_or(&0.0);
        match b.lengths.get(part) {
            Some(length_b) => distance += (length_a - length_b).abs(),
            None => distance += length_a,
        }
    }

    for part in b.parts.difference(&a.parts) {
        distance += b.lengths.get(part).unwrap_or(&0.0);
    }

    distance
}

/// Kuhner-Felsenstein distance from two pre-computed snapshots.
pub fn kf_from_snapshots(a: &TreeSnapshot, b: &TreeSnapshot) -> f64 {
    let mut sum_squared = 0.0;

    for part in &a.parts {
        let length_a = a.lengths.get(part).unwrap_or(&0.0);
        let diff = match b.lengths.get(part) {
            Some(length_b) => length_a - length_b,
            None => *length_a,
        };
        sum_squared += diff * diff;
    }

    for part in b.parts.difference(&a.parts) {
        let length_b = b.lengths.get(part).unwrap_or(&0.0);
        sum_squared += length_b * length_b;
    }

    sum_squared.sqrt()
}

/// Distances for every pair `i < j` of snapshots, computed in parallel.
///
/// Returns `(i, j, d)` triples in row-major order.
pub fn pairwise_distances_parallel(
    snaps: &[TreeSnapshot],
    kind: MetricKind,
) -> Vec<(usize, usize, f64)> {
    let n = snaps.len();
    (0..n)
        .into_par_iter()
        .flat_map_iter(|i| (i + 1..n).map(move |j| (i, j)))
        .map(|(i, j)| (i, j, kind.between(&snaps[i], &snaps[j])))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use itertools::Itertools;

    fn tree(newick: &str) -> PhyloTree {
        PhyloTree::from_newick(newick).unwrap()
    }

    // All branches are 0.1 long, so weighted RF = 0.1 * RF and the branch
    // score = 0.1 * sqrt(RF).
    const TREEDIST_TREES: [&str; 12] = [
        "(A:0.1,(B:0.1,(H:0.1,(D:0.1,(J:0.1,(((G:0.1,E:0.1):0.1,(F:0.1,I:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(D:0.1,((J:0.1,H:0.1):0.1,(((G:0.1,E:0.1):0.1,(F:0.1,I:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(D:0.1,(H:0.1,(J:0.1,(((G:0.1,E:0.1):0.1,(F:0.1,I:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,(G:0.1,((F:0.1,I:0.1):0.1,((J:0.1,(H:0.1,D:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,(G:0.1,((F:0.1,I:0.1):0.1,(((J:0.1,H:0.1):0.1,D:0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,((F:0.1,I:0.1):0.1,(G:0.1,((J:0.1,(H:0.1,D:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,((F:0.1,I:0.1):0.1,(G:0.1,(((J:0.1,H:0.1):0.1,D:0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,((G:0.1,(F:0.1,I:0.1):0.1):0.1,((J:0.1,(H:0.1,D:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,((G:0.1,(F:0.1,I:0.1):0.1):0.1,(((J:0.1,H:0.1):0.1,D:0.1):0.1,C:0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,(G:0.1,((F:0.1,I:0.1):0.1,((J:0.1,(H:0.1,D:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(D:0.1,(H:0.1,(J:0.1,(((G:0.1,E:0.1):0.1,(F:0.1,I:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1):0.1);",
        "(A:0.1,(B:0.1,(E:0.1,((G:0.1,(F:0.1,I:0.1):0.1):0.1,((J:0.1,(H:0.1,D:0.1):0.1):0.1,C:0.1):0.1):0.1):0.1):0.1);",
    ];

    const TREEDIST_RF: [[usize; 12]; 12] = [
        [0, 4, 2, 10, 10, 10, 10, 10, 10, 10, 2, 10],
        [4, 0, 2, 10, 8, 10, 8, 10, 8, 10, 2, 10],
        [2, 2, 0, 10, 10, 10, 10, 10, 10, 10, 0, 10],
        [10, 10, 10, 0, 2, 2, 4, 2, 4, 0, 10, 2],
        [10, 8, 10, 2, 0, 4, 2, 4, 2, 2, 10, 4],
        [10, 10, 10, 2, 4, 0, 2, 2, 4, 2, 10, 2],
        [10, 8, 10, 4, 2, 2, 0, 4, 2, 4, 10, 4],
        [10, 10, 10, 2, 4, 2, 4, 0, 2, 2, 10, 0],
        [10, 8, 10, 4, 2, 4, 2, 2, 0, 4, 10, 2],
        [10, 10, 10, 0, 2, 2, 4, 2, 4, 0, 10, 2],
        [2, 2, 0, 10, 10, 10, 10, 10, 10, 10, 0, 10],
        [10, 10, 10, 2, 4, 2, 4, 0, 2, 2, 10, 0],
    ];

    #[test]
    // Robinson foulds distances according to
    // https://evolution.genetics.washington.edu/phylip/doc/treedist.html
    fn robinson_foulds_treedist() {
        for (i0, i1) in (0..TREEDIST_TREES.len()).tuple_combinations() {
            let t0 = tree(TREEDIST_TREES[i0]);
            let t1 = tree(TREEDIST_TREES[i1]);
            assert_eq!(robinson_foulds(&t0, &t1).unwrap(), TREEDIST_RF[i0][i1], "[{i0}, {i1}]");
        }
    }

    #[test]
    fn branch_length_metrics_treedist() {
        let snaps: Vec<TreeSnapshot> = TREEDIST_TREES
            .iter()
            .map(|nwk| TreeSnapshot::from_tree(&tree(nwk)).unwrap())
            .collect();

        for (i0, i1) in (0..snaps.len()).tuple_combinations() {
            let rf = TREEDIST_RF[i0][i1] as f64;
            let (a, b) = (&snaps[i0], &snaps[i1]);
            assert_relative_eq!(weighted_rf_from_snapshots(a, b), 0.1 * rf, epsilon = 1e-12);
            assert_relative_eq!(kf_from_snapshots(a, b), 0.1 * rf.sqrt(), epsilon = 1e-12);
        }
    }

    #[test]
    fn every_metric_is_zero_against_its_reference() {
        for kind in [
            MetricKind::RobinsonFoulds,
            MetricKind::WeightedRobinsonFoulds,
            MetricKind::KuhnerFelsenstein,
        ] {
            for nwk in TREEDIST_TREES {
                let t = tree(nwk);
                let metric = TreeMetric::new(kind, &t).unwrap();
                assert_eq!(metric.distance(&t).unwrap(), 0.0, "{kind} on {nwk}");
            }
        }
    }

    #[test]
    fn metric_is_symmetric() {
        let a = tree(TREEDIST_TREES[0]);
        let b = tree(TREEDIST_TREES[4]);
        let ab = TreeMetric::new(MetricKind::RobinsonFoulds, &a).unwrap().distance(&b).unwrap();
        let ba = TreeMetric::new(MetricKind::RobinsonFoulds, &b).unwrap().distance(&a).unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab, 10.0);
    }

    #[test]
    fn rooted_trees_differing_only_in_root() {
        // Same unrooted topology, different root position.
        let a = tree("((A,B),(C,D));");
        let b = tree("(A,(B,(C,D)));");
        assert_eq!(robinson_foulds(&a, &b).unwrap(), 2);
    }

    #[test]
    fn root_position_counts_as_two() {
        // The rootings disagree on {B,C,D} and {A,B,C}, still only 2.
        let a = tree("(A,(B,(C,D)));");
        let b = tree("(((A,B),C),D);");
        assert_eq!(robinson_foulds(&a, &b).unwrap(), 2);

        let unrooted = tree("(A,B,(C,D));");
        assert_eq!(robinson_foulds(&a, &unrooted).unwrap(), 0);
        assert_eq!(robinson_foulds(&b, &unrooted).unwrap(), 0);
    }

    #[test]
    fn rooted_example_from_docs() {
        let a = tree("((A,B),(C,(D,E)));");
        let b = tree("((A,C),(B,(D,E)));");
        assert_eq!(robinson_foulds(&a, &b).unwrap(), 4);
    }

    #[test]
    fn mismatched_taxa_are_fatal() {
        let reference = tree("((A,B),(C,D));");
        let other = tree("((A,B),(C,X));");
        let metric = TreeMetric::new(MetricKind::RobinsonFoulds, &reference).unwrap();
        assert!(matches!(
            metric.distance(&other),
            Err(TreeDistanceError::TaxonMismatch { .. })
        ));

        let bigger = tree("((A,B),(C,(D,E)));");
        assert!(matches!(
            robinson_foulds(&reference, &bigger),
            Err(TreeDistanceError::TaxonMismatch { expected: 4, found: 5, .. })
        ));
    }

    #[test]
    fn pairwise_matches_direct_computation() {
        let snaps: Vec<TreeSnapshot> = TREEDIST_TREES[..5]
            .iter()
            .map(|nwk| TreeSnapshot::from_tree(&tree(nwk)).unwrap())
            .collect();
        let pairs = pairwise_distances_parallel(&snaps, MetricKind::RobinsonFoulds);

        assert_eq!(pairs.len(), 10);
        for (i, j, d) in pairs {
            assert!(i < j);
            assert_eq!(d, TREEDIST_RF[i][j] as f64);
        }
    }

    #[test]
    fn metric_kind_parsing() {
        assert_eq!("RF".parse::<MetricKind>().unwrap(), MetricKind::RobinsonFoulds);
        assert_eq!("kf".parse::<MetricKind>().unwrap(), MetricKind::KuhnerFelsenstein);
        assert!("euclid".parse::<MetricKind>().is_err());
    }
}
