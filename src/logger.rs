//! Per-sample tree distance logging.
//!
//! A [`TreeDistanceLogger`] holds a set of distinct reference trees and, for
//! each logged tree, reports the mean distance to them and (with more than
//! one reference) the population variance of those distances.
//!
//! Output is tab separated, every value followed by a tab:
//!
//! ```text
//! tree.treeDistance	tree.treeDistanceVar
//! 4	2.6666666666666665
//! ```

use crate::distances::MetricKind;
use crate::error::{Result, TreeDistanceError};
use crate::reference::{ReferenceTree, ReferenceTreeSet};
use crate::snapshot::TreeSnapshot;
use log::{info, warn};
use phylotree::tree::Tree as PhyloTree;
use rand::Rng;
use std::io::Write;

#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    /// Column name prefix.
    pub id: String,
    /// Number of bootstrap reference trees; 0 uses the reference as is.
    pub bootstraps: usize,
    /// Proportion of sites per bootstrap; 0 or less draws a random count.
    pub psites: f64,
    pub metric: MetricKind,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            id: "tree".to_string(),
            bootstraps: 0,
            psites: 1.0,
            metric: MetricKind::default(),
        }
    }
}

impl LoggerConfig {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_bootstraps(mut self, bootstraps: usize) -> Self {
        self.bootstraps = bootstraps;
        self
    }

    pub fn with_psites(mut self, psites: f64) -> Self {
        self.psites = psites;
        self
    }

    pub fn with_metric(mut self, metric: MetricKind) -> Self {
        self.metric = metric;
        self
    }
}

#[derive(Debug, Clone)]
pub struct TreeDistanceLogger {
    config: LoggerConfig,
    references: ReferenceTreeSet,
}

impl TreeDistanceLogger {
    /// Resolve, check and deduplicate the reference trees.
    ///
    /// Without a reference, the first tree passed to [`log`](Self::log)
    /// becomes the reference.
    ///
    /// # Errors
    /// - [`TreeDistanceError::InvalidSampleProportion`] if `psites` is NaN
    /// - [`TreeDistanceError::TaxonMismatch`] if a reference does not cover
    ///   the same taxa as `tree`
    /// - any error from building bootstrap trees
    pub fn new<R: Rng + ?Sized>(
        config: LoggerConfig,
        tree: &PhyloTree,
        reference: Option<ReferenceTree>,
        rng: &mut R,
    ) -> Result<Self> {
        if config.psites.is_nan() {
            return Err(TreeDistanceError::InvalidSampleProportion(config.psites));
        }

        let references = match reference {
            None => ReferenceTreeSet::default(),
            Some(reference) => {
                if config.bootstraps > 0 {
                    if reference.is_cluster() {
                        info!("Calculating reference tree across {} bootstraps", config.bootstraps);
                    } else {
                        warn!(
                            "Bootstrapping needs a reference built from an alignment; using the fixed reference tree"
                        );
                    }
                }
                let candidates = reference.candidates(config.bootstraps, config.psites, rng)?;

                let tracked = TreeSnapshot::from_tree(tree)?;
                for candidate in &candidates {
                    tracked.check_same_taxa(&TreeSnapshot::from_tree(candidate)?)?;
                }

                let set = ReferenceTreeSet::from_candidates(config.metric, candidates)?;
                warn!("Total number of unique reference trees: {}", set.len());
                set
            }
        };

        Ok(TreeDistanceLogger { config, references })
    }

    /// Logger over an already deduplicated reference set.
    pub fn with_references(config: LoggerConfig, references: ReferenceTreeSet) -> Self {
        TreeDistanceLogger { config, references }
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.config
    }

    pub fn references(&self) -> &ReferenceTreeSet {
        &self.references
    }

    pub fn reference_count(&self) -> usize {
        self.references.len()
    }

    fn has_variance(&self) -> bool {
        self.references.len() > 1
    }

    /// Column names.
    pub fn header(&self) -> Vec<String> {
        let mut cols = vec![format!("{}.treeDistance", self.config.id)];
        if self.has_variance() {
            cols.push(format!("{}.treeDistanceVar", self.config.id));
        }
        cols
    }

    pub fn init<W: Write>(&self, out: &mut W) -> Result<()> {
        for col in self.header() {
            write!(out, "{col}\t")?;
        }
        Ok(())
    }

    /// Write the values for one sample.
    pub fn log<W: Write>(&mut self, _sample: u64, tree: &PhyloTree, out: &mut W) -> Result<()> {
        if self.references.is_empty() {
            self.references = ReferenceTreeSet::from_candidates(self.config.metric, vec![tree.clone()])?;
        }

        let distances = self.distances(tree)?;
        write!(out, "{}\t", mean(&distances))?;
        if self.has_variance() {
            write!(out, "{}\t", population_variance(&distances))?;
        }
        Ok(())
    }

    pub fn close<W: Write>(&mut self, _out: &mut W) -> Result<()> {
        Ok(())
    }

    /// Mean distance from `tree` to the references.
    ///
    /// 0 before any reference exists.
    pub fn get_distance(&self, tree: &PhyloTree) -> Result<f64> {
        Ok(mean(&self.distances(tree)?))
    }

    /// Population variance of the distances from `tree` to the references.
    pub fn get_distance_variance(&self, tree: &PhyloTree) -> Result<f64> {
        Ok(population_variance(&self.distances(tree)?))
    }

    pub fn get_dimension(&self) -> usize {
        if self.has_variance() { 2 } else { 1 }
    }

    pub fn get_array_value(&self, tree: &PhyloTree) -> Result<f64> {
        self.get_distance(tree)
    }

    fn distances(&self, tree: &PhyloTree) -> Result<Vec<f64>> {
        if self.references.is_empty() {
            return Ok(Vec::new());
        }
        self.references.distances_to(&TreeSnapshot::from_tree(tree)?)
    }
}

/// Arithmetic mean, 0 for no values.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance dividing by the number of values, 0 for no values.
pub fn population_variance(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64
}
