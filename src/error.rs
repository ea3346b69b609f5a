use phylotree::tree::{NewickParseError, TreeError};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeDistanceError {
    #[error(
        "trees have different taxon sets (reference has {expected} taxa, tree has {found}; \
         first mismatching taxon: '{taxon}')"
    )]
    TaxonMismatch {
        expected: usize,
        found: usize,
        taxon: String,
    },

    #[error("all leaves must be named to compare trees")]
    UnnamedLeaf,

    #[error("leaf name '{0}' occurs more than once")]
    DuplicateLeaf(String),

    #[error("tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("could not parse newick tree: {0}")]
    Newick(#[from] NewickParseError),

    #[error("no trees found in {path}")]
    NoTrees { path: String },

    #[error("alignment '{id}' has no sequences")]
    EmptyAlignment { id: String },

    #[error("sequence '{taxon}' has length {len}, expected {expected}")]
    SequenceLengthMismatch {
        taxon: String,
        len: usize,
        expected: usize,
    },

    #[error("alignment '{id}' needs {taxa} rows of sequence data, got {rows}")]
    RowCountMismatch { id: String, rows: usize, taxa: usize },

    #[error("distance matrix over {labels} labels needs {expected} values, got {values}")]
    MatrixShape {
        labels: usize,
        values: usize,
        expected: usize,
    },

    #[error("taxon '{0}' occurs more than once in the alignment")]
    DuplicateTaxon(String),

    #[error("site index {site} out of range (alignment has {site_count} sites)")]
    SiteOutOfRange { site: usize, site_count: usize },

    #[error("need at least 2 taxa to build a cluster tree, got {n}")]
    TooFewTaxa { n: usize },

    #[error("bootstrap {index} sampled no sites from an alignment with {site_count} sites")]
    DegenerateBootstrap { index: usize, site_count: usize },

    #[error("invalid proportion of sites to sample: {0}")]
    InvalidSampleProportion(f64),

    #[error("clock rate must be positive and finite, got {0}")]
    InvalidClockRate(f64),

    #[error("unknown {kind} '{name}'")]
    UnknownOption { kind: &'static str, name: String },


    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, TreeDistanceError>;
