//! Bipartition snapshots of phylogenetic trees.
//!
//! A [`TreeSnapshot`] records every non-trivial bipartition (split) of a tree
//! together with the branch length that induces it. Snapshots are immutable,
//! so a reference snapshot is built once and compared against every sampled
//! tree.
//!
//! Leaves are indexed by their position in the alphabetically sorted list of
//! taxon names, never by node id: node ids depend on parse order and differ
//! between trees over the same taxa.
//!
//! ```text
//!      root
//!     /    \
//!   {A,B}  {C,D}   one split: {A,B} | {C,D}
//! ```

use crate::bitset::Bitset;
use crate::error::{Result, TreeDistanceError};
use phylotree::tree::Tree as PhyloTree;
use std::collections::{HashMap, HashSet};

/// Immutable view of the splits of a tree.
///
/// # Canonical form
/// A split {A,B}|{C,D} can be written from either side. The stored side is
/// always the one that does NOT contain leaf 0 (the alphabetically first
/// taxon), so the same split gets the same bitset in every tree.
///
/// Splits that separate a single leaf from the rest are trivial and skipped;
/// every tree over the same taxa has all of them.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    /// Taxon names, sorted. Index `i` is bit `i` of every bitset.
    pub taxa: Vec<String>,

    /// Canonical non-trivial splits.
    pub parts: HashSet<Bitset>,

    /// Branch length per split. The two edges below a bifurcating root
    /// induce the same split, so their lengths are summed.
    pub lengths: HashMap<Bitset, f64>,

    /// Clades directly below the root, sorted. Used to tell apart rooted
    /// trees that share all splits but not the root position.
    pub root_children: Vec<Bitset>,

    /// Number of u64 words in each bitset
    pub words: usize,

    pub rooted: bool,
}

impl TreeSnapshot {
    /// Extract a snapshot from a phylogenetic tree.
    ///
    /// # Algorithm
    /// 1. Collect leaf names, sort them, map each leaf node to its index
    /// 2. Walk the tree in post-order, OR-ing child clades into their parent
    /// 3. Canonicalize every non-root clade and drop trivial splits
    ///
    /// # Errors
    /// Fails if a leaf has no name, two leaves share a name, or the tree has
    /// no root.
    pub fn from_tree(tree: &PhyloTree) -> Result<Self> {
        let rooted = tree.is_rooted()?;
        let root_id = tree.get_root()?;

        let mut leaves: Vec<(usize, String)> = Vec::new();
        for leaf_id in tree.get_leaves() {
            let name = tree
                .get(&leaf_id)?
                .name
                .clone()
                .ok_or(TreeDistanceError::UnnamedLeaf)?;
            leaves.push((leaf_id, name));
        }
        leaves.sort_by(|a, b| a.1.cmp(&b.1));

        if let Some(pair) = leaves.windows(2).find(|w| w[0].1 == w[1].1) {
            return Err(TreeDistanceError::DuplicateLeaf(pair[0].1.clone()));
        }

        let num_leaves = leaves.len();
        let words = Bitset::words_for(num_leaves);
        let leaf_index: HashMap<usize, usize> = leaves
            .iter()
            .enumerate()
            .map(|(idx, &(node_id, _))| (node_id, idx))
            .collect();

        let clades = Self::compute_clades(tree, root_id, &leaf_index, words)?;

        let mut parts = HashSet::new();
        let mut lengths: HashMap<Bitset, f64> = HashMap::new();
        for (&node_id, clade) in &clades {
            if node_id == root_id {
                continue;
            }
            let canonical = Self::canonicalize(clade, num_leaves);
            let size = canonical.count_ones();
            if size <= 1 || size + 1 >= num_leaves {
                continue;
            }
            let length = tree.get(&node_id)?.parent_edge.unwrap_or(0.0);
            *lengths.entry(canonical.clone()).or_insert(0.0) += length;
            parts.insert(canonical);
        }

        let mut root_children: Vec<Bitset> = tree
            .get(&root_id)?
            .children
            .iter()
            .filter_map(|child_id| clades.get(child_id).cloned())
            .collect();
        root_children.sort_unstable();

        Ok(TreeSnapshot {
            taxa: leaves.into_iter().map(|(_, name)| name).collect(),
            parts,
            lengths,
            root_children,
            words,
            rooted,
        })
    }

    pub fn num_leaves(&self) -> usize {
        self.taxa.len()
    }

    /// Fails with [`TreeDistanceError::TaxonMismatch`] unless both snapshots
    /// cover exactly the same taxa.
    pub fn check_same_taxa(&self, other: &TreeSnapshot) -> Result<()> {
        if self.taxa == other.taxa {
            return Ok(());
        }
        let ours: HashSet<&String> = self.taxa.iter().collect();
        let theirs: HashSet<&String> = other.taxa.iter().collect();
        let taxon = ours
            .symmetric_difference(&theirs)
            .min()
            .map(|t| t.to_string())
            .unwrap_or_default();
        Err(TreeDistanceError::TaxonMismatch {
            expected: self.taxa.len(),
            found: other.taxa.len(),
            taxon,
        })
    }

    /// Leaf set below every node, keyed by node id.
    fn compute_clades(
        tree: &PhyloTree,
        root_id: usize,
        leaf_index: &HashMap<usize, usize>,
        words: usize,
    ) -> Result<HashMap<usize, Bitset>> {
        let mut clades: HashMap<usize, Bitset> = HashMap::new();

        // Post-order guarantees children are done before their parent.
        for node_id in tree.postorder(&root_id)? {
            let node = tree.get(&node_id)?;
            let mut clade = Bitset::zeros(words);
            if node.children.is_empty() {
                if let Some(&idx) = leaf_index.get(&node_id) {
                    clade.set(idx);
                }
            } else {
                for child_id in &node.children {
                    if let Some(child) = clades.get(child_id) {
                        clade.or_assign(child);
                    }
                }
            }
            clades.insert(node_id, clade);
        }

        Ok(clades)
    }

    /// Store the side of the split without leaf 0.
    ///
    /// Leaves: A=0, B=1, C=2, D=3
    /// {A,B} `0b0011` has leaf 0 → flip to {C,D} `0b1100`
    /// {C,D} `0b1100` has no leaf 0 → keep
    fn canonicalize(clade: &Bitset, num_leaves: usize) -> Bitset {
        if num_leaves > 0 && clade.contains(0) {
            clade.complement(num_leaves)
        } else {
            clade.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phylotree::tree::Node;

    fn snapshot(newick: &str) -> TreeSnapshot {
        TreeSnapshot::from_tree(&PhyloTree::from_newick(newick).unwrap()).unwrap()
    }

    fn bits(idx: &[usize], words: usize) -> Bitset {
        let mut bs = Bitset::zeros(words);
        for &i in idx {
            bs.set(i);
        }
        bs
    }

    #[test]
    fn test_taxa_sorted_by_name() {
        let snap = snapshot("((Human,Chimp),(Gorilla,Orang));");
        assert_eq!(snap.taxa, vec!["Chimp", "Gorilla", "Human", "Orang"]);
        assert!(snap.rooted);
    }

    /// ```text
    ///              root
    ///             /    \
    ///         node1     E
    ///         /   \
    ///     node2    D
    ///     /   \
    ///    A    node3
    ///         /   \
    ///        B     C
    /// ```
    ///
    /// node3 {B,C} is kept, node2 {A,B,C} flips to {D,E},
    /// node1 {A,B,C,D} flips to {E} and is trivial.
    #[test]
    fn test_asymmetric_tree_splits() {
        let snap = snapshot("(((A,(B,C)),D),E);");
        let expected: HashSet<Bitset> = [bits(&[1, 2], 1), bits(&[3, 4], 1)].into_iter().collect();
        assert_eq!(snap.parts, expected);
    }

    #[test]
    fn test_root_edges_merge_into_one_split() {
        // Both root edges induce {A,B}|{C,D}; lengths add up.
        let snap = snapshot("((A:1,B:1):0.25,(C:1,D:1):0.5);");
        let cd = bits(&[2, 3], 1);
        assert_eq!(snap.parts.len(), 1);
        assert!(snap.parts.contains(&cd));
        assert!((snap.lengths[&cd] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_same_split_from_different_sides() {
        let a = snapshot("((A,B),(C,D));");
        let b = snapshot("((D,C),(B,A));");
        assert_eq!(a.parts, b.parts);
        assert_eq!(a.root_children, b.root_children);
    }

    #[test]
    fn test_unrooted_tree() {
        let snap = snapshot("(A,B,(C,D));");
        assert!(!snap.rooted);
        assert_eq!(snap.parts.len(), 1);
        assert!(snap.parts.contains(&bits(&[2, 3], 1)));
    }

    #[test]
    fn test_unnamed_leaf_is_rejected() {
        let mut tree = PhyloTree::new();
        let root = tree.add(Node::new());
        tree.add_child(Node::new_named("A"), root, None).unwrap();
        tree.add_child(Node::new(), root, None).unwrap();
        assert!(matches!(
            TreeSnapshot::from_tree(&tree),
            Err(TreeDistanceError::UnnamedLeaf)
        ));
    }

    #[test]
    fn test_duplicate_leaf_is_rejected() {
        let tree = PhyloTree::from_newick("((A,B),(A,C));").unwrap();
        match TreeSnapshot::from_tree(&tree) {
            Err(TreeDistanceError::DuplicateLeaf(name)) => assert_eq!(name, "A"),
            other => panic!("expected duplicate leaf error, got {other:?}"),
        }
    }

    #[test]
    fn test_check_same_taxa() {
        let a = snapshot("((A,B),(C,D));");
        let b = snapshot("((A,C),(B,D));");
        let c = snapshot("((A,B),(C,E));");

        assert!(a.check_same_taxa(&b).is_ok());
        match a.check_same_taxa(&c) {
            Err(TreeDistanceError::TaxonMismatch { expected, found, taxon }) => {
                assert_eq!((expected, found), (4, 4));
                assert_eq!(taxon, "D");
            }
            other => panic!("expected taxon mismatch, got {other:?}"),
        }
    }

    #[test]
    fn test_many_leaves_span_words() {
        let names: Vec<String> = (0..70).map(|i| format!("t{i:02}")).collect();
        let newick = format!("(({},{}),({}));", names[0], names[1], names[2..].join(","));
        let snap = snapshot(&newick);
        assert_eq!(snap.words, 2);
        assert_eq!(snap.num_leaves(), 70);
        // The only non-trivial split is {t00,t01} | rest, stored as the rest.
        assert_eq!(snap.parts.len(), 1);
        assert_eq!(snap.parts.iter().next().unwrap().count_ones(), 68);
    }
}
