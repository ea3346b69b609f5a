use crate::alignment::{Alignment, DataType, Sequence};
use crate::error::{Result, TreeDistanceError};
use log::{debug, warn};
use phylotree::tree::Tree;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// One tree of a BEAST run.
#[derive(Debug, Clone)]
pub struct SampledTree {
    /// `<file stem>_tree_STATE<state>`
    pub name: String,
    pub state: u64,
    pub tree: Tree,
}

#[derive(Debug, Clone, Default)]
pub struct BeastTrees {
    /// TRANSLATE block: taxon id -> label
    pub taxa: HashMap<String, String>,
    pub trees: Vec<SampledTree>,
}

/// Decode file content, gunzipping it if it starts with the gzip magic bytes.
fn decode_text(bytes: Vec<u8>) -> Result<String> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut text = String::new();
        GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
        Ok(text)
    } else {
        String::from_utf8(bytes).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e).into())
    }
}

fn read_text<P: AsRef<Path>>(path: P) -> Result<String> {
    decode_text(fs::read(path.as_ref())?)
}

/// Strip BEAST annotations from Newick strings.
///
/// `:[&rate=0.123]2.45` becomes `:2.45`. Plain comments (`[...]` without
/// `&`) are left to the Newick parser.
fn strip_beast_annotations(newick: &str) -> String {
    let mut result = String::with_capacity(newick.len());
    let mut in_annotation = false;
    let mut chars = newick.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '[' if chars.peek() == Some(&'&') => in_annotation = true,
            ']' if in_annotation => in_annotation = false,
            _ if !in_annotation => result.push(ch),
            _ => {}
        }
    }

    result
}

/// Read the trees of a BEAST `.trees` (NEXUS) file, gzipped or not.
///
/// Burn-in: with both values 0 every tree is kept; otherwise a tree is kept
/// if its index is at least `burnin_trees` (when set) or its state is above
/// `burnin_states` (when set). Trees that fail to parse are skipped with a
/// warning.
///
/// # Errors
/// I/O errors, or [`TreeDistanceError::NoTrees`] if nothing is left.
pub fn read_beast_trees<P: AsRef<Path>>(
    path: P,
    burnin_trees: usize,
    burnin_states: u64,
    use_real_taxa: bool,
) -> Result<BeastTrees> {
    let path = path.as_ref();
    let content = read_text(path)?;

    let base_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".gz").trim_end_matches(".trees"))
        .unwrap_or("unknown");

    let parsed = parse_beast_trees(&content, base_name, burnin_trees, burnin_states, use_real_taxa);
    if parsed.trees.is_empty() {
        return Err(TreeDistanceError::NoTrees {
            path: path.display().to_string(),
        });
    }
    Ok(parsed)
}

fn parse_beast_trees(
    content: &str,
    base_name: &str,
    burnin_trees: usize,
    burnin_states: u64,
    use_real_taxa: bool,
) -> BeastTrees {
    let taxa = parse_taxon_block(content);

    let trees = collect_tree_blocks(content)
        .into_iter()
        .enumerate()
        .filter(|(idx, block)| {
            (burnin_trees == 0 && burnin_states == 0)
                || (burnin_trees > 0 && *idx >= burnin_trees)
                || (burnin_states > 0 && extract_state(block.header) > burnin_states)
        })
        .filter_map(|(idx, block)| {
            let state = extract_state(block.header);
            let newick = strip_beast_annotations(&block.body);
            let mut tree = match Tree::from_newick(&newick) {
                Ok(t) => t,
                Err(e) => {
                    warn!("Skipping tree {idx} (STATE_{state}) of {base_name}: {e}");
                    return None;
                }
            };
            if use_real_taxa {
                rename_leaf_nodes(&mut tree, &taxa);
            }
            Some(SampledTree {
                name: format!("{base_name}_tree_STATE{state}"),
                state,
                tree,
            })
        })
        .collect::<Vec<_>>();

    debug!("Parsed {} trees and {} taxa from {base_name}", trees.len(), taxa.len());
    BeastTrees { taxa, trees }
}

fn extract_state(header: &str) -> u64 {
    header
        .to_ascii_uppercase()
        .find("STATE_")
        .and_then(|start| {
            header[start + 6..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect::<String>()
                .parse::<u64>()
                .ok()
        })
        .unwrap_or(0)
}

struct TreeBlock<'a> {
    header: &'a str,
    body: String,
}

fn collect_tree_blocks(content: &str) -> Vec<TreeBlock<'_>> {
    content
        .lines()
        .skip_while(|line| !line.trim_start().to_ascii_uppercase().starts_with("TREE "))
        .take_while(|line| !line.trim().to_ascii_uppercase().starts_with("END;"))
        .filter_map(|line| {
            let (header, body) = line.split_once('=')?;
            Some(TreeBlock {
                header: header.trim(),
                body: body.trim().to_string(),
            })
        })
        .collect()
}

/// ```text
/// Translate
///     1 '1959.M.CD.59.ZR59',
///     2 '1960.DRC60A'
/// ;
/// ```
fn parse_taxon_block(content: &str) -> HashMap<String, String> {
    content
        .lines()
        .skip_while(|line| !line.trim().to_ascii_uppercase().starts_with("TRANSLATE"))
        .skip(1)
        .take_while(|line| !line.trim().starts_with(';'))
        .filter_map(|line| {
            let line = line.trim().trim_end_matches([',', ';']);
            let mut parts = line.split_whitespace();
            let id = parts.next()?.to_string();
            let label = parts.next()?.trim_matches('\'').to_string();
            Some((id, label))
        })
        .collect()
}

/// Replace translated leaf ids by their labels. Leaves without a
/// translation keep their name.
pub fn rename_leaf_nodes(tree: &mut Tree, translate: &HashMap<String, String>) {
    for leaf_id in tree.get_leaves() {
        if let Ok(node) = tree.get_mut(&leaf_id) {
            if let Some(label) = node.name.as_ref().and_then(|n| translate.get(n)) {
                node.name = Some(label.clone());
            }
        }
    }
}

/// First tree of a Newick file.
pub fn read_newick<P: AsRef<Path>>(path: P) -> Result<Tree> {
    let content = read_text(path.as_ref())?;
    let newick = content
        .split_inclusive(';')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .ok_or_else(|| TreeDistanceError::NoTrees {
            path: path.as_ref().display().to_string(),
        })?;
    Ok(Tree::from_newick(&strip_beast_annotations(newick))?)
}

/// Alignment rows from FASTA records, one per definition line. Taxa are
/// named by the first word of the definition.
pub fn read_fasta_alignment_from_reader<R: BufRead>(
    reader: R,
    id: &str,
    data_type: DataType,
) -> Result<Alignment> {
    let mut fa_in = noodles_fasta::io::Reader::new(reader);

    let mut sequences = Vec::new();
    for result in fa_in.records() {
        let record = result?;
        let name = String::from_utf8(record.name().into())
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let data: &[u8] = record.sequence().as_ref();
        sequences.push(Sequence::new(name, data));
    }
    debug!("Read {} sequences for alignment '{}'", sequences.len(), id);

    Alignment::new(id, data_type, sequences)
}

/// Read an aligned FASTA file (optionally gzipped). The alignment is named
/// after the file stem.
pub fn read_fasta_alignment<P: AsRef<Path>>(path: P, data_type: DataType) -> Result<Alignment> {
    let path = path.as_ref();
    let id = path
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.trim_end_matches(".gz"))
        .map(|s| s.rsplit_once('.').map_or(s, |(stem, _)| stem))
        .unwrap_or("alignment");
    let text = read_text(path)?;
    read_fasta_alignment_from_reader(BufReader::new(text.as_bytes()), id, data_type)
}

/// Output sink: stdout for `-`, gzip for `*.gz`, a plain file otherwise.
pub fn open_writer<P: AsRef<Path>>(path: P) -> Result<Box<dyn Write>> {
    let p = path.as_ref();
    if p.as_os_str() == "-" {
        return Ok(Box::new(BufWriter::new(io::stdout().lock())));
    }
    let f = File::create(p)?;
    if p.to_string_lossy().ends_with(".gz") {
        Ok(Box::new(BufWriter::new(GzEncoder::new(f, Compression::default()))))
    } else {
        Ok(Box::new(BufWriter::new(f)))
    }
}

/// Write a labelled square matrix as TSV.
pub fn write_matrix<W: Write + ?Sized, T: Display>(out: &mut W, names: &[String], mat: &[Vec<T>]) -> Result<()> {
    for name in names {
        write!(out, "\t{name}")?;
    }
    writeln!(out)?;

    for (name, row) in names.iter().zip(mat) {
        write!(out, "{name}")?;
        for val in row {
            write!(out, "\t{val}")?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// [`write_matrix`] to a path, see [`open_writer`].
pub fn write_matrix_tsv<P: AsRef<Path>, T: Display>(path: P, names: &[String], mat: &[Vec<T>]) -> Result<()> {
    let mut out = open_writer(path)?;
    write_matrix(&mut out, names, mat)?;
    out.flush()?;
    Ok(())
}
