//! Bootstrap replicates of an alignment and the trees built from them.
//!
//! Each replicate samples alignment columns with replacement and re-runs
//! the clustering of the source [`ClusterTree`]. Randomness comes from the
//! caller's generator: per replicate, the site count is drawn first (only
//! when the proportion is not positive), then each site index in order.

use crate::alignment::Alignment;
use crate::cluster::{ClusterTree, TreeBuilder};
use crate::error::{Result, TreeDistanceError};
use log::debug;
use phylotree::tree::Tree as PhyloTree;
use rand::{Rng, SeedableRng};
use rand_isaac::Isaac64Rng;

/// Seeded generator for reproducible replicates, or one seeded from the OS.
pub fn random_number_generator(seed: Option<u64>) -> Isaac64Rng {
    match seed {
        None => Isaac64Rng::from_entropy(),
        Some(seed) => Isaac64Rng::seed_from_u64(seed),
    }
}

/// A replicate holds at most this many times the sites of its alignment.
pub const MAX_SITE_FACTOR: usize = 1000;

/// Number of sites in one replicate.
///
/// A positive `proportion` gives `ceil(proportion * total)`; zero or a
/// negative value draws a count uniformly in `[1, total]`.
///
/// # Errors
/// [`TreeDistanceError::InvalidSampleProportion`] if `proportion` is not
/// finite or asks for more than [`MAX_SITE_FACTOR`] times `total` sites.
pub fn sample_site_count<R: Rng + ?Sized>(total: usize, proportion: f64, rng: &mut R) -> Result<usize> {
    if !proportion.is_finite() {
        return Err(TreeDistanceError::InvalidSampleProportion(proportion));
    }
    if total == 0 {
        return Ok(0);
    }
    if proportion <= 0.0 {
        return Ok(rng.gen_range(1..=total));
    }
    let count = (proportion * total as f64).ceil();
    if count > total.saturating_mul(MAX_SITE_FACTOR) as f64 {
        return Err(TreeDistanceError::InvalidSampleProportion(proportion));
    }
    Ok(count as usize)
}

/// `count` column indices drawn uniformly from `[0, total)` with replacement.
pub fn sample_sites<R: Rng + ?Sized>(total: usize, count: usize, rng: &mut R) -> Vec<usize> {
    (0..count).map(|_| rng.gen_range(0..total)).collect()
}

/// Replicate `index` of `template`, identified as `bootstrap{index}`.
///
/// # Errors
/// Fails with [`TreeDistanceError::DegenerateBootstrap`] if no site would
/// be sampled.
pub fn resample_alignment<R: Rng + ?Sized>(
    template: &Alignment,
    index: usize,
    proportion: f64,
    rng: &mut R,
) -> Result<Alignment> {
    let total = template.site_count();
    let count = sample_site_count(total, proportion, rng)?;
    if count == 0 {
        return Err(TreeDistanceError::DegenerateBootstrap {
            index,
            site_count: total,
        });
    }
    let sites = sample_sites(total, count, rng);
    let rows = template.select_sites(&sites)?;
    Alignment::from_template(template, format!("bootstrap{index}"), rows)
}

/// `n` trees built from independent replicates of the source alignment,
/// in generation order. The source is left untouched.
pub fn bootstrap_trees<R: Rng + ?Sized>(
    source: &ClusterTree,
    n: usize,
    proportion: f64,
    rng: &mut R,
) -> Result<Vec<PhyloTree>> {
    let mut trees = Vec::with_capacity(n);
    for i in 0..n {
        let replicate = resample_alignment(source.alignment(), i, proportion, rng)?;
        debug!("{}: {} sites", replicate.id(), replicate.site_count());
        trees.push(source.settings().build_tree(&replicate)?);
    }
    Ok(trees)
}
