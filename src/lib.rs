//! Crate root: module orchestration and public re-exports.
//!
//! Modules:
//! - `bitset`: compact bitset representation for tree partitions.
//! - `snapshot`: bipartition snapshot of a tree, built once per tree.
//! - `distances`: RF / weighted RF / KF metrics bound to a reference tree.
//! - `alignment`: sequence alignments, templated copies and pruning.
//! - `cluster`: distance-based tree construction (UPGMA, single, complete, NJ).
//! - `bootstrap`: resampled alignments and the trees built from them.
//! - `reference`: reference trees and their deduplicated set.
//! - `logger`: the per-sample tree distance logger.
//! - `io`: BEAST/NEXUS, Newick and FASTA input, TSV output.
//! - `logging`: `env_logger` setup for the binary.
//! - `api`: Python bindings via `pyo3` (gated behind "python" feature).

pub mod alignment;
pub mod bitset;
pub mod bootstrap;
pub mod cluster;
pub mod distances;
pub mod error;
pub mod io;
pub mod logger;
pub mod logging;
pub mod reference;
pub mod snapshot;

#[cfg(feature = "python")]
pub mod api;

// Re-export frequently used types & functions
pub use alignment::{Alignment, DataType, Sequence};
pub use bitset::Bitset;
pub use cluster::{ClusterSettings, ClusterTree, ClusterType, DistanceMeasure, TreeBuilder};
pub use distances::{MetricKind, TreeMetric};
pub use error::{Result, TreeDistanceError};
pub use io::{read_beast_trees, write_matrix_tsv};
pub use logger::{LoggerConfig, TreeDistanceLogger};
pub use reference::{ReferenceTree, ReferenceTreeSet};
pub use snapshot::TreeSnapshot;
