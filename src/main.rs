use clap::{ArgAction, Parser, ValueEnum};
use log::info;
use phylotree::tree::Tree as PhyloTree;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tree_distance_logger::alignment::DataType;
use tree_distance_logger::bootstrap::random_number_generator;
use tree_distance_logger::cluster::{ClusterSettings, ClusterTree, ClusterType, DistanceMeasure};
use tree_distance_logger::distances::MetricKind;
use tree_distance_logger::error::Result;
use tree_distance_logger::io::{open_writer, read_beast_trees, read_fasta_alignment, read_newick, write_matrix_tsv};
use tree_distance_logger::logger::{LoggerConfig, TreeDistanceLogger};
use tree_distance_logger::logging::{setup_logger, verbosity_filter};
use tree_distance_logger::reference::ReferenceTree;

/// Replay the trees of a BEAST run through the tree distance logger and
/// write one line per sampled state: mean distance to the reference trees
/// and, with several references, the variance.
#[derive(Parser, Debug)]
#[command(name = "tree-distance-logger", version, about = "Distance of sampled trees to reference trees")]
struct Args {
    /// Path to BEAST .trees (NEXUS) file, optionally gzipped
    #[arg(short = 'i', long = "input")]
    input: PathBuf,

    /// Output log; `-` for stdout, `.gz` for gzip
    #[arg(short = 'o', long = "output", default_value = "-")]
    output: PathBuf,

    /// Fixed reference tree (Newick)
    #[arg(long = "ref", conflicts_with = "alignment")]
    reference: Option<PathBuf>,

    /// Aligned FASTA file to build the reference tree from
    #[arg(long = "alignment")]
    alignment: Option<PathBuf>,

    #[arg(long = "data-type", value_enum, default_value_t = DataTypeArg::Nucleotide)]
    data_type: DataTypeArg,

    #[arg(long = "cluster-type", value_enum, default_value_t = ClusterArg::Upgma)]
    cluster_type: ClusterArg,

    #[arg(long = "distance", value_enum, default_value_t = DistanceArg::Jc69)]
    distance: DistanceArg,

    /// Branch lengths of the cluster tree are divided by this rate
    #[arg(long = "clock-rate", default_value_t = 1.0)]
    clock_rate: f64,

    /// Number of bootstrap reference trees (0: use the reference as is)
    #[arg(short = 'b', long = "bootstraps", default_value_t = 0)]
    bootstraps: usize,

    /// Proportion of sites per bootstrap; 0 draws a random number of sites
    #[arg(long = "psites", default_value_t = 1.0, allow_negative_numbers = true)]
    psites: f64,

    /// Random seed for bootstrapping
    #[arg(long = "seed")]
    seed: Option<u64>,

    /// Distance metric: rf | weighted | kf
    #[arg(long = "metric", value_enum, default_value_t = MetricArg::Rf)]
    metric: MetricArg,

    /// Column name prefix
    #[arg(long = "id", default_value = "tree")]
    id: String,

    /// Burn-in by number of trees (drop first N trees)
    #[arg(short = 't', long = "burnin-trees", default_value_t = 0)]
    burnin_trees: usize,

    /// Burn-in by state (keep trees with STATE_ > value)
    #[arg(short = 's', long = "burnin-states", default_value_t = 0)]
    burnin_states: u64,

    /// Use TRANSLATE block to map taxon IDs to labels when available
    #[arg(long = "use-real-taxa", default_value_t = false)]
    use_real_taxa: bool,

    /// Also write the pairwise distances between the unique reference trees
    #[arg(long = "reference-matrix")]
    reference_matrix: Option<PathBuf>,

    /// More log messages (repeat for more)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// No log messages
    #[arg(short = 'q', long = "quiet", default_value_t = false)]
    quiet: bool,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum MetricArg {
    Rf,
    Weighted,
    Kf,
}

impl From<MetricArg> for MetricKind {
    fn from(arg: MetricArg) -> Self {
        match arg {
            MetricArg::Rf => MetricKind::RobinsonFoulds,
            MetricArg::Weighted => MetricKind::WeightedRobinsonFoulds,
            MetricArg::Kf => MetricKind::KuhnerFelsenstein,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ClusterArg {
    Single,
    Upgma,
    Complete,
    Nj,
}

impl From<ClusterArg> for ClusterType {
    fn from(arg: ClusterArg) -> Self {
        match arg {
            ClusterArg::Single => ClusterType::Single,
            ClusterArg::Upgma => ClusterType::Average,
            ClusterArg::Complete => ClusterType::Complete,
            ClusterArg::Nj => ClusterType::NeighborJoining,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DistanceArg {
    Hamming,
    Jc69,
}

impl From<DistanceArg> for DistanceMeasure {
    fn from(arg: DistanceArg) -> Self {
        match arg {
            DistanceArg::Hamming => DistanceMeasure::Hamming,
            DistanceArg::Jc69 => DistanceMeasure::JukesCantor,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum DataTypeArg {
    Nucleotide,
    AminoAcid,
}

impl From<DataTypeArg> for DataType {
    fn from(arg: DataTypeArg) -> Self {
        match arg {
            DataTypeArg::Nucleotide => DataType::Nucleotide,
            DataTypeArg::AminoAcid => DataType::AminoAcid,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    setup_logger(verbosity_filter(args.verbose, args.quiet));

    let t0 = Instant::now();
    let run = match read_beast_trees(&args.input, args.burnin_trees, args.burnin_states, args.use_real_taxa) {
        Ok(run) => run,
        Err(e) => {
            eprintln!("Failed to read trees from {:?}: {e}", args.input);
            return ExitCode::from(2);
        }
    };
    info!(
        "Read {} trees ({} translated taxa) in {:.3}s",
        run.trees.len(),
        run.taxa.len(),
        t0.elapsed().as_secs_f64()
    );

    let t1 = Instant::now();
    let mut logger = match build_logger(&args, &run.trees[0].tree) {
        Ok(logger) => logger,
        Err(e) => {
            eprintln!("Failed to set up reference trees: {e}");
            return ExitCode::from(3);
        }
    };
    info!(
        "Set up {} reference tree(s) in {:.3}s",
        logger.reference_count(),
        t1.elapsed().as_secs_f64()
    );

    let t2 = Instant::now();
    let trees = run.trees.iter().map(|t| (t.state, &t.tree));
    if let Err(e) = write_log(&args, &mut logger, trees) {
        eprintln!("Failed to log trees to {:?}: {e}", args.output);
        return ExitCode::from(4);
    }
    if args.output.as_os_str() == "-" {
        info!("Writing to stdout {:.3}s", t2.elapsed().as_secs_f64());
    } else {
        info!("Writing to output {:.3}s", t2.elapsed().as_secs_f64());
    }

    ExitCode::SUCCESS
}

fn build_logger(args: &Args, first_tree: &PhyloTree) -> Result<TreeDistanceLogger> {
    let reference = if let Some(path) = &args.reference {
        Some(ReferenceTree::Fixed(read_newick(path)?))
    } else if let Some(path) = &args.alignment {
        let alignment = read_fasta_alignment(path, args.data_type.into())?;
        let settings = ClusterSettings::default()
            .with_cluster_type(args.cluster_type.into())
            .with_distance(args.distance.into())
            .with_clock_rate(args.clock_rate);
        info!(
            "Clustering {} taxa over {} sites ({})",
            alignment.taxon_count(),
            alignment.site_count(),
            settings.cluster_type
        );
        Some(ReferenceTree::Cluster(ClusterTree::new(alignment, settings)?))
    } else {
        None
    };

    let config = LoggerConfig::default()
        .with_id(args.id.clone())
        .with_bootstraps(args.bootstraps)
        .with_psites(args.psites)
        .with_metric(args.metric.into());
    let mut rng = random_number_generator(args.seed);
    let logger = TreeDistanceLogger::new(config, first_tree, reference, &mut rng)?;

    if let Some(path) = &args.reference_matrix {
        let (names, mat) = logger.references().pairwise_matrix();
        write_matrix_tsv(path, &names, &mat)?;
    }
    Ok(logger)
}

fn write_log<'a>(
    args: &Args,
    logger: &mut TreeDistanceLogger,
    trees: impl Iterator<Item = (u64, &'a PhyloTree)>,
) -> Result<()> {
    let mut out = open_writer(&args.output)?;

    write!(out, "Sample\t")?;
    logger.init(&mut out)?;
    writeln!(out)?;

    for (state, tree) in trees {
        write!(out, "{state}\t")?;
        logger.log(state, tree, &mut out)?;
        writeln!(out)?;
    }

    logger.close(&mut out)?;
    out.flush()?;
    Ok(())
}
