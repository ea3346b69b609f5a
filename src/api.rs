//! Python binding layer.
//!
//! Exposes the distance logger over a BEAST tree file, bootstrap reference
//! tree construction and a plain RF distance between two Newick trees.

use phylotree::tree::Tree as PhyloTree;
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::alignment::DataType;
use crate::bootstrap::random_number_generator;
use crate::cluster::{ClusterSettings, ClusterTree, ClusterType, DistanceMeasure};
use crate::distances::{self, MetricKind};
use crate::error::TreeDistanceError;
use crate::io::{read_beast_trees, read_fasta_alignment, read_newick};
use crate::logger::{LoggerConfig, TreeDistanceLogger};
use crate::reference::{ReferenceTree, ReferenceTreeSet};

fn to_py_err(e: TreeDistanceError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn cluster_reference(
    alignment: &str,
    cluster_type: &str,
    distance: &str,
    clock_rate: f64,
    data_type: &str,
) -> Result<ClusterTree, TreeDistanceError> {
    let settings = ClusterSettings::default()
        .with_cluster_type(cluster_type.parse::<ClusterType>()?)
        .with_distance(distance.parse::<DistanceMeasure>()?)
        .with_clock_rate(clock_rate);
    let alignment = read_fasta_alignment(alignment, data_type.parse::<DataType>()?)?;
    ClusterTree::new(alignment, settings)
}

/// Distance of every tree in a BEAST run to the reference tree(s).
///
/// Args:
///     path: BEAST/NEXUS tree file
///     reference: Newick file with a fixed reference tree
///     alignment: FASTA file to build the reference tree from (ignored when
///         `reference` is given)
///     bootstraps: number of bootstrap reference trees (alignment only)
///     psites: proportion of sites per bootstrap, 0 for a random count
///     metric: "rf", "weighted" or "kf"
///
/// Without `reference` and `alignment` the first tree is the reference.
///
/// Returns:
///     (states, mean distances, variances or None with a single reference)
#[pyfunction]
#[pyo3(signature = (
    path,
    reference=None,
    alignment=None,
    bootstraps=0,
    psites=1.0,
    metric="rf",
    cluster_type="upgma",
    distance="jc69",
    clock_rate=1.0,
    data_type="nucleotide",
    seed=None,
    burnin_trees=0,
    burnin_states=0,
    use_real_taxa=false
))]
#[allow(clippy::too_many_arguments)]
fn tree_distance_trace(
    path: String,
    reference: Option<String>,
    alignment: Option<String>,
    bootstraps: usize,
    psites: f64,
    metric: &str,
    cluster_type: &str,
    distance: &str,
    clock_rate: f64,
    data_type: &str,
    seed: Option<u64>,
    burnin_trees: usize,
    burnin_states: u64,
    use_real_taxa: bool,
) -> PyResult<(Vec<u64>, Vec<f64>, Option<Vec<f64>>)> {
    let run = read_beast_trees(&path, burnin_trees, burnin_states, use_real_taxa).map_err(to_py_err)?;

    let reference = match (reference, alignment) {
        (Some(newick), _) => Some(ReferenceTree::Fixed(read_newick(newick).map_err(to_py_err)?)),
        (None, Some(fasta)) => Some(ReferenceTree::Cluster(
            cluster_reference(&fasta, cluster_type, distance, clock_rate, data_type).map_err(to_py_err)?,
        )),
        (None, None) => None,
    };

    let config = LoggerConfig::default()
        .with_bootstraps(bootstraps)
        .with_psites(psites)
        .with_metric(metric.parse::<MetricKind>().map_err(to_py_err)?);
    let mut rng = random_number_generator(seed);
    let mut logger =
        TreeDistanceLogger::new(config, &run.trees[0].tree, reference, &mut rng).map_err(to_py_err)?;

    let mut states = Vec::with_capacity(run.trees.len());
    let mut means = Vec::with_capacity(run.trees.len());
    let mut variances = Vec::with_capacity(run.trees.len());
    for sampled in &run.trees {
        // Logging into a sink sets up the lazy reference on the first tree.
        logger
            .log(sampled.state, &sampled.tree, &mut std::io::sink())
            .map_err(to_py_err)?;
        states.push(sampled.state);
        means.push(logger.get_distance(&sampled.tree).map_err(to_py_err)?);
        variances.push(logger.get_distance_variance(&sampled.tree).map_err(to_py_err)?);
    }

    let variances = (logger.get_dimension() > 1).then_some(variances);
    Ok((states, means, variances))
}

/// Unique bootstrap reference trees for an alignment, as Newick strings.
#[pyfunction]
#[pyo3(signature = (
    alignment,
    bootstraps,
    psites=1.0,
    metric="rf",
    cluster_type="upgma",
    distance="jc69",
    clock_rate=1.0,
    data_type="nucleotide",
    seed=None
))]
#[allow(clippy::too_many_arguments)]
fn bootstrap_reference_trees(
    alignment: String,
    bootstraps: usize,
    psites: f64,
    metric: &str,
    cluster_type: &str,
    distance: &str,
    clock_rate: f64,
    data_type: &str,
    seed: Option<u64>,
) -> PyResult<Vec<String>> {
    let cluster = cluster_reference(&alignment, cluster_type, distance, clock_rate, data_type).map_err(to_py_err)?;
    let kind = metric.parse::<MetricKind>().map_err(to_py_err)?;
    let mut rng = random_number_generator(seed);

    let candidates = ReferenceTree::Cluster(cluster)
        .candidates(bootstraps, psites, &mut rng)
        .map_err(to_py_err)?;
    let set = ReferenceTreeSet::from_candidates(kind, candidates).map_err(to_py_err)?;

    set.trees()
        .map(|t| t.to_newick().map_err(|e| to_py_err(e.into())))
        .collect()
}

/// Robinson-Foulds distance between two Newick trees.
#[pyfunction]
fn robinson_foulds(newick_a: &str, newick_b: &str) -> PyResult<usize> {
    let a = PhyloTree::from_newick(newick_a).map_err(|e| to_py_err(e.into()))?;
    let b = PhyloTree::from_newick(newick_b).map_err(|e| to_py_err(e.into()))?;
    distances::robinson_foulds(&a, &b).map_err(to_py_err)
}

/// Python module definition
#[pymodule]
fn tree_distance_logger(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(tree_distance_trace, m)?)?;
    m.add_function(wrap_pyfunction!(bootstrap_reference_trees, m)?)?;
    m.add_function(wrap_pyfunction!(robinson_foulds, m)?)?;
    Ok(())
}
