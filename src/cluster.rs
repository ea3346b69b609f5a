//! Distance-based tree construction from an alignment.
//!
//! Pairwise sequence distances are computed first (in parallel), then taxa
//! are merged agglomeratively. Linkage methods (single, average/UPGMA,
//! complete) give ultrametric trees with node heights of half the merge
//! distance; neighbour joining gives additive branch lengths and is rooted
//! where the last two clusters meet.
//!
//! Ties are broken by scan order, so the same alignment always gives the
//! same tree.

use crate::alignment::{Alignment, DataType};
use crate::error::{Result, TreeDistanceError};
use log::debug;
use phylotree::tree::{Node, Tree as PhyloTree};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Upper bound for corrected distances when the correction is undefined.
pub const MAX_DISTANCE: f64 = 5.0;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum ClusterType {
    Single,
    /// UPGMA
    #[default]
    Average,
    Complete,
    NeighborJoining,
}

impl FromStr for ClusterType {
    type Err = TreeDistanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "single" => Ok(ClusterType::Single),
            "average" | "upgma" => Ok(ClusterType::Average),
            "complete" => Ok(ClusterType::Complete),
            "neighborjoining" | "neighbor-joining" | "nj" => Ok(ClusterType::NeighborJoining),
            _ => Err(TreeDistanceError::UnknownOption {
                kind: "cluster type",
                name: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for ClusterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ClusterType::Single => "single",
            ClusterType::Average => "upgma",
            ClusterType::Complete => "complete",
            ClusterType::NeighborJoining => "neighborjoining",
        })
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DistanceMeasure {
    /// Proportion of differing sites (p-distance)
    Hamming,
    #[default]
    JukesCantor,
}

impl FromStr for DistanceMeasure {
    type Err = TreeDistanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "hamming" | "p-distance" | "p" => Ok(DistanceMeasure::Hamming),
            "jc69" | "jukescantor" | "jukes-cantor" | "jc" => Ok(DistanceMeasure::JukesCantor),
            _ => Err(TreeDistanceError::UnknownOption {
                kind: "distance measure",
                name: s.to_string(),
            }),
        }
    }
}

impl DistanceMeasure {
    /// Distance between two aligned rows. Only sites where both states are
    /// informative are compared; without any such site the distance is 0.
    pub fn between(self, a: &[u8], b: &[u8], data_type: DataType) -> f64 {
        let mut valid = 0usize;
        let mut diffs = 0usize;
        for (&x, &y) in a.iter().zip(b) {
            if !data_type.is_informative(x) || !data_type.is_informative(y) {
                continue;
            }
            valid += 1;
            if normalize_state(x) != normalize_state(y) {
                diffs += 1;
            }
        }
        if valid == 0 {
            return 0.0;
        }

        let p = diffs as f64 / valid as f64;
        match self {
            DistanceMeasure::Hamming => p,
            DistanceMeasure::JukesCantor => {
                let k = data_type.state_count() as f64;
                let b = (k - 1.0) / k;
                let arg = 1.0 - p / b;
                if arg <= 0.0 {
                    MAX_DISTANCE
                } else {
                    (-b * arg.ln()).min(MAX_DISTANCE)
                }
            }
        }
    }
}

#[inline]
fn normalize_state(b: u8) -> u8 {
    match b.to_ascii_uppercase() {
        b'U' => b'T',
        other => other,
    }
}

/// How a cluster tree is built: method, distance and clock rate.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ClusterSettings {
    pub cluster_type: ClusterType,
    pub distance: DistanceMeasure,
    /// Branch lengths are divided by this rate.
    pub clock_rate: f64,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        ClusterSettings {
            cluster_type: ClusterType::default(),
            distance: DistanceMeasure::default(),
            clock_rate: 1.0,
        }
    }
}

impl ClusterSettings {
    pub fn with_cluster_type(mut self, cluster_type: ClusterType) -> Self {
        self.cluster_type = cluster_type;
        self
    }

    pub fn with_distance(mut self, distance: DistanceMeasure) -> Self {
        self.distance = distance;
        self
    }

    pub fn with_clock_rate(mut self, clock_rate: f64) -> Self {
        self.clock_rate = clock_rate;
        self
    }
}

/// Anything that turns an alignment into a tree.
pub trait TreeBuilder {
    fn build_tree(&self, alignment: &Alignment) -> Result<PhyloTree>;
}

impl TreeBuilder for ClusterSettings {
    fn build_tree(&self, alignment: &Alignment) -> Result<PhyloTree> {
        if !(self.clock_rate.is_finite() && self.clock_rate > 0.0) {
            return Err(TreeDistanceError::InvalidClockRate(self.clock_rate));
        }
        let dist = distance_matrix(alignment, self.distance);
        debug!(
            "Building {} tree for '{}' ({} taxa, {} sites)",
            self.cluster_type,
            alignment.id(),
            alignment.taxon_count(),
            alignment.site_count()
        );
        cluster(&dist, self.cluster_type, self.clock_rate)
    }
}

/// A reference tree built by clustering an alignment.
///
/// Keeps the alignment and settings so that the same construction can be
/// repeated on resampled data.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    alignment: Alignment,
    settings: ClusterSettings,
    tree: PhyloTree,
}

impl ClusterTree {
    pub fn new(alignment: Alignment, settings: ClusterSettings) -> Result<Self> {
        let tree = settings.build_tree(&alignment)?;
        Ok(ClusterTree {
            alignment,
            settings,
            tree,
        })
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub fn settings(&self) -> &ClusterSettings {
        &self.settings
    }

    pub fn tree(&self) -> &PhyloTree {
        &self.tree
    }

    pub fn into_tree(self) -> PhyloTree {
        self.tree
    }
}

/// Square symmetric matrix of pairwise distances with taxon labels.
#[derive(Debug, Clone)]
pub struct DistanceMatrix {
    labels: Vec<String>,
    data: Vec<f64>,
    n: usize,
}

impl DistanceMatrix {
    /// `data` is row-major and must hold `labels.len()²` values.
    pub fn new(labels: Vec<String>, data: Vec<f64>) -> Result<Self> {
        let n = labels.len();
        if data.len() != n * n {
            return Err(TreeDistanceError::MatrixShape {
                labels: n,
                values: data.len(),
                expected: n * n,
            });
        }
        Ok(DistanceMatrix { labels, data, n })
    }

    pub fn n(&self) -> usize {
        self.n
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[i * self.n + j]
    }

    /// Rows of the matrix, for writing it out.
    pub fn rows(&self) -> Vec<Vec<f64>> {
        self.data.chunks(self.n.max(1)).map(<[f64]>::to_vec).collect()
    }
}

/// Pairwise distances between all sequences of `alignment`.
pub fn distance_matrix(alignment: &Alignment, measure: DistanceMeasure) -> DistanceMatrix {
    let seqs = alignment.sequences();
    let n = seqs.len();
    let data_type = alignment.data_type();

    let pairs: Vec<(usize, usize)> = (0..n)
        .flat_map(|i| ((i + 1)..n).map(move |j| (i, j)))
        .collect();
    let results: Vec<(usize, usize, f64)> = pairs
        .par_iter()
        .map(|&(i, j)| (i, j, measure.between(&seqs[i].data, &seqs[j].data, data_type)))
        .collect();

    let mut data = vec![0.0f64; n * n];
    for (i, j, d) in results {
        data[i * n + j] = d;
        data[j * n + i] = d;
    }

    DistanceMatrix {
        labels: seqs.iter().map(|s| s.taxon.clone()).collect(),
        data,
        n,
    }
}

#[derive(Debug, Clone)]
struct ClusterNode {
    label: Option<String>,
    branch_length: f64,
    children: Vec<usize>,
}

/// Build a rooted tree from a distance matrix.
pub fn cluster(dist: &DistanceMatrix, cluster_type: ClusterType, clock_rate: f64) -> Result<PhyloTree> {
    let n = dist.n();
    if n < 2 {
        return Err(TreeDistanceError::TooFewTaxa { n });
    }
    let (nodes, root) = match cluster_type {
        ClusterType::NeighborJoining => neighbor_joining(dist),
        linkage_type => linkage(dist, linkage_type),
    };
    to_phylo_tree(&nodes, root, clock_rate)
}

fn leaf_nodes(dist: &DistanceMatrix) -> Vec<ClusterNode> {
    dist.labels()
        .iter()
        .map(|label| ClusterNode {
            label: Some(label.clone()),
            branch_length: 0.0,
            children: Vec::new(),
        })
        .collect()
}

/// Working copy of the distances, sized for the internal nodes to come.
fn working_matrix(dist: &DistanceMatrix, cap: usize) -> Vec<f64> {
    let n = dist.n();
    let mut d = vec![0.0f64; cap * cap];
    for i in 0..n {
        for j in 0..n {
            d[i * cap + j] = dist.get(i, j);
        }
    }
    d
}

fn linkage(dist: &DistanceMatrix, cluster_type: ClusterType) -> (Vec<ClusterNode>, usize) {
    let n = dist.n();
    let cap = 2 * n - 1;
    let mut nodes = leaf_nodes(dist);
    let mut d = working_matrix(dist, cap);

    let mut active: Vec<usize> = (0..n).collect();
    let mut cluster_size = vec![1usize; cap];
    let mut heights = vec![0.0f64; cap];

    while active.len() > 1 {
        let mut min_d = f64::INFINITY;
        let (mut min_i, mut min_j) = (active[0], active[1]);
        for (ai, &i) in active.iter().enumerate() {
            for &j in &active[(ai + 1)..] {
                if d[i * cap + j] < min_d {
                    min_d = d[i * cap + j];
                    min_i = i;
                    min_j = j;
                }
            }
        }

        let u = nodes.len();
        let h = min_d / 2.0;
        heights[u] = h;
        nodes[min_i].branch_length = (h - heights[min_i]).max(0.0);
        nodes[min_j].branch_length = (h - heights[min_j]).max(0.0);
        nodes.push(ClusterNode {
            label: None,
            branch_length: 0.0,
            children: vec![min_i, min_j],
        });

        let si = cluster_size[min_i] as f64;
        let sj = cluster_size[min_j] as f64;
        cluster_size[u] = cluster_size[min_i] + cluster_size[min_j];

        for &k in &active {
            if k == min_i || k == min_j {
                continue;
            }
            let (dik, djk) = (d[min_i * cap + k], d[min_j * cap + k]);
            let duk = match cluster_type {
                ClusterType::Single => dik.min(djk),
                ClusterType::Complete => dik.max(djk),
                _ => (dik * si + djk * sj) / (si + sj),
            };
            d[u * cap + k] = duk;
            d[k * cap + u] = duk;
        }

        active.retain(|&x| x != min_i && x != min_j);
        active.push(u);
    }

    (nodes, active[0])
}

fn neighbor_joining(dist: &DistanceMatrix) -> (Vec<ClusterNode>, usize) {
    let n = dist.n();
    let cap = 2 * n - 1;
    let mut nodes = leaf_nodes(dist);
    let mut d = working_matrix(dist, cap);
    let mut active: Vec<usize> = (0..n).collect();

    while active.len() > 2 {
        let r = active.len() as f64;

        let mut row_sum = vec![0.0f64; cap];
        for &i in &active {
            for &j in &active {
                row_sum[i] += d[i * cap + j];
            }
        }

        let mut min_q = f64::INFINITY;
        let (mut min_i, mut min_j) = (active[0], active[1]);
        for (ai, &i) in active.iter().enumerate() {
            for &j in &active[(ai + 1)..] {
                let q = (r - 2.0) * d[i * cap + j] - row_sum[i] - row_sum[j];
                if q < min_q {
                    min_q = q;
                    min_i = i;
                    min_j = j;
                }
            }
        }

        let dij = d[min_i * cap + min_j];
        let li = dij / 2.0 + (row_sum[min_i] - row_sum[min_j]) / (2.0 * (r - 2.0));
        let lj = dij - li;

        let u = nodes.len();
        nodes[min_i].branch_length = li;
        nodes[min_j].branch_length = lj;
        nodes.push(ClusterNode {
            label: None,
            branch_length: 0.0,
            children: vec![min_i, min_j],
        });

        for &k in &active {
            if k == min_i || k == min_j {
                continue;
            }
            let duk = (d[min_i * cap + k] + d[min_j * cap + k] - dij) / 2.0;
            d[u * cap + k] = duk;
            d[k * cap + u] = duk;
        }

        active.retain(|&x| x != min_i && x != min_j);
        active.push(u);
    }

    // Root between the last two clusters.
    let (a, b) = (active[0], active[1]);
    let dab = d[a * cap + b];
    let root = nodes.len();
    nodes[a].branch_length = dab / 2.0;
    nodes[b].branch_length = dab / 2.0;
    nodes.push(ClusterNode {
        label: None,
        branch_length: 0.0,
        children: vec![a, b],
    });

    (nodes, root)
}

fn to_phylo_tree(nodes: &[ClusterNode], root: usize, clock_rate: f64) -> Result<PhyloTree> {
    let mut tree = PhyloTree::new();
    let root_id = tree.add(new_node(&nodes[root]));

    let mut stack: Vec<(usize, usize)> = nodes[root]
        .children
        .iter()
        .rev()
        .map(|&child| (child, root_id))
        .collect();
    while let Some((idx, parent_id)) = stack.pop() {
        let node = &nodes[idx];
        let id = tree.add_child(new_node(node), parent_id, Some(node.branch_length / clock_rate))?;
        stack.extend(node.children.iter().rev().map(|&child| (child, id)));
    }

    Ok(tree)
}

fn new_node(node: &ClusterNode) -> Node {
    match &node.label {
        Some(label) => Node::new_named(label),
        None => Node::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::Sequence;
    use crate::snapshot::TreeSnapshot;
    use approx::assert_relative_eq;

    fn matrix(labels: &[&str], rows: &[&[f64]]) -> DistanceMatrix {
        let data = rows.iter().flat_map(|r| r.iter().copied()).collect();
        DistanceMatrix::new(labels.iter().map(|s| s.to_string()).collect(), data).unwrap()
    }

    fn parent_edge(tree: &PhyloTree, name: &str) -> f64 {
        tree.get_by_name(name).unwrap().parent_edge.unwrap()
    }

    #[test]
    fn test_upgma_three_taxa() {
        let dist = matrix(
            &["A", "B", "C"],
            &[&[0.0, 2.0, 4.0], &[2.0, 0.0, 4.0], &[4.0, 4.0, 0.0]],
        );
        let tree = cluster(&dist, ClusterType::Average, 1.0).unwrap();

        let root = tree.get_root().unwrap();
        assert_eq!(tree.get(&root).unwrap().children.len(), 2);
        assert_relative_eq!(parent_edge(&tree, "C"), 2.0);
        assert_relative_eq!(parent_edge(&tree, "A"), 1.0);
        assert_relative_eq!(parent_edge(&tree, "B"), 1.0);

        let snap = TreeSnapshot::from_tree(&tree).unwrap();
        let expected = TreeSnapshot::from_tree(&PhyloTree::from_newick("((A,B),C);").unwrap()).unwrap();
        assert_eq!(snap.root_children, expected.root_children);
    }

    #[test]
    fn test_clock_rate_scales_branches() {
        let dist = matrix(
            &["A", "B", "C"],
            &[&[0.0, 2.0, 4.0], &[2.0, 0.0, 4.0], &[4.0, 4.0, 0.0]],
        );
        let tree = cluster(&dist, ClusterType::Average, 2.0).unwrap();
        assert_relative_eq!(parent_edge(&tree, "C"), 1.0);
        assert_relative_eq!(parent_edge(&tree, "A"), 0.5);
    }

    #[test]
    fn test_single_and_complete_linkage_heights() {
        let dist = matrix(
            &["A", "B", "C", "D"],
            &[
                &[0.0, 1.0, 9.0, 3.0],
                &[1.0, 0.0, 9.0, 9.0],
                &[9.0, 9.0, 0.0, 2.0],
                &[3.0, 9.0, 2.0, 0.0],
            ],
        );
        let single = cluster(&dist, ClusterType::Single, 1.0).unwrap();
        let complete = cluster(&dist, ClusterType::Complete, 1.0).unwrap();

        // Both give ((A,B),(C,D)) but merge the two pairs at different heights.
        for tree in [&single, &complete] {
            let snap = TreeSnapshot::from_tree(tree).unwrap();
            assert_eq!(snap.parts.len(), 1);
        }
        let ab_edge = |tree: &PhyloTree| {
            let a = tree.get_by_name("A").unwrap();
            tree.get(&a.parent.unwrap()).unwrap().parent_edge.unwrap()
        };
        assert_relative_eq!(ab_edge(&single), 1.0);
        assert_relative_eq!(ab_edge(&complete), 4.0);
    }

    /// Textbook example: (a,b) and (d,e) are cherries, c sits between them.
    #[test]
    fn test_neighbor_joining_topology() {
        let dist = matrix(
            &["a", "b", "c", "d", "e"],
            &[
                &[0.0, 5.0, 9.0, 9.0, 8.0],
                &[5.0, 0.0, 10.0, 10.0, 9.0],
                &[9.0, 10.0, 0.0, 8.0, 7.0],
                &[9.0, 10.0, 8.0, 0.0, 3.0],
                &[8.0, 9.0, 7.0, 3.0, 0.0],
            ],
        );
        let tree = cluster(&dist, ClusterType::NeighborJoining, 1.0).unwrap();
        assert!(tree.is_rooted().unwrap());

        let snap = TreeSnapshot::from_tree(&tree).unwrap();
        let expected = TreeSnapshot::from_tree(&PhyloTree::from_newick("((a,b),c,(d,e));").unwrap()).unwrap();
        assert_eq!(snap.parts, expected.parts);

        assert_relative_eq!(parent_edge(&tree, "a"), 2.0, epsilon = 1e-12);
        assert_relative_eq!(parent_edge(&tree, "b"), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_distance_measures() {
        let dt = DataType::Nucleotide;
        // 5 comparable sites (the gap/N column is skipped), 1 difference.
        let a = b"ACGT-A";
        let b = b"ACGANA";
        assert_relative_eq!(DistanceMeasure::Hamming.between(a, b, dt), 0.2);

        let p: f64 = 0.2;
        let jc = -0.75 * (1.0 - 4.0 * p / 3.0).ln();
        assert_relative_eq!(DistanceMeasure::JukesCantor.between(a, b, dt), jc, epsilon = 1e-12);

        // Saturated and empty comparisons.
        assert_eq!(DistanceMeasure::JukesCantor.between(b"AC", b"CA", dt), MAX_DISTANCE);
        assert_eq!(DistanceMeasure::Hamming.between(b"--", b"AC", dt), 0.0);
        assert_eq!(DistanceMeasure::Hamming.between(b"ACGU", b"ACGT", dt), 0.0);
    }

    #[test]
    fn test_cluster_tree_from_alignment() {
        let aln = Alignment::new(
            "aln",
            DataType::Nucleotide,
            vec![
                Sequence::new("A", "AAAAAAAAAA"),
                Sequence::new("B", "AAAAAAAAAC"),
                Sequence::new("C", "CCCCCAAAAA"),
                Sequence::new("D", "CCCCCAAAAC"),
            ],
        )
        .unwrap();
        let ct = ClusterTree::new(aln, ClusterSettings::default()).unwrap();
        assert_eq!(ct.tree().n_leaves(), 4);
        assert_eq!(ct.settings().cluster_type, ClusterType::Average);

        let snap = TreeSnapshot::from_tree(ct.tree()).unwrap();
        let expected = TreeSnapshot::from_tree(&PhyloTree::from_newick("((A,B),(C,D));").unwrap()).unwrap();
        assert_eq!(snap.parts, expected.parts);
        assert_eq!(snap.root_children, expected.root_children);
    }

    #[test]
    fn test_invalid_inputs() {
        let aln = Alignment::new("one", DataType::Nucleotide, vec![Sequence::new("A", "ACGT")]).unwrap();
        assert!(matches!(
            ClusterTree::new(aln.clone(), ClusterSettings::default()),
            Err(TreeDistanceError::TooFewTaxa { n: 1 })
        ));
        assert!(matches!(
            ClusterSettings::default().with_clock_rate(0.0).build_tree(&aln),
            Err(TreeDistanceError::InvalidClockRate(_))
        ));
        assert!("ward".parse::<ClusterType>().is_err());
        assert_eq!("nj".parse::<ClusterType>().unwrap(), ClusterType::NeighborJoining);
        assert_eq!("hamming".parse::<DistanceMeasure>().unwrap(), DistanceMeasure::Hamming);
    }

    #[test]
    fn test_matrix_shape_is_checked() {
        let labels = vec!["A".to_string(), "B".to_string()];
        let res = DistanceMatrix::new(labels.clone(), vec![0.0, 1.0, 1.0]);
        assert!(matches!(
            res,
            Err(TreeDistanceError::MatrixShape {
                labels: 2,
                values: 3,
                expected: 4
            })
        ));
        assert!(res.unwrap_err().to_string().starts_with("distance matrix over 2 labels"));

        let dist = DistanceMatrix::new(labels, vec![0.0, 1.0, 1.0, 0.0]).unwrap();
        assert_eq!(dist.get(0, 1), 1.0);
    }
}
