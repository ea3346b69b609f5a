//! Multiple sequence alignments: one row per taxon, one column per site.
//!
//! Alignments are immutable once built. Derived alignments (bootstrap
//! replicates, pruned sub-alignments) are built from a template with
//! [`Alignment::from_template`], which carries over the data type and the
//! per-sequence metadata and only swaps the sequence data.

use crate::error::{Result, TreeDistanceError};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DataType {
    #[default]
    Nucleotide,
    AminoAcid,
}

impl DataType {
    /// Number of unambiguous states.
    pub fn state_count(self) -> usize {
        match self {
            DataType::Nucleotide => 4,
            DataType::AminoAcid => 20,
        }
    }

    /// True if `b` codes exactly one state. Gaps, `?`, `N`/`X` and IUPAC
    /// ambiguity codes are not informative.
    #[inline]
    pub fn is_informative(self, b: u8) -> bool {
        let b = b.to_ascii_uppercase();
        match self {
            DataType::Nucleotide => matches!(b, b'A' | b'C' | b'G' | b'T' | b'U'),
            DataType::AminoAcid => matches!(
                b,
                b'A' | b'R' | b'N' | b'D' | b'C' | b'Q' | b'E' | b'G' | b'H' | b'I'
                    | b'L' | b'K' | b'M' | b'F' | b'P' | b'S' | b'T' | b'W' | b'Y' | b'V'
            ),
        }
    }
}

impl FromStr for DataType {
    type Err = TreeDistanceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "nucleotide" | "dna" | "nt" => Ok(DataType::Nucleotide),
            "aminoacid" | "protein" | "aa" => Ok(DataType::AminoAcid),
            _ => Err(TreeDistanceError::UnknownOption {
                kind: "data type",
                name: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub taxon: String,
    pub data: Vec<u8>,
    /// Total number of states the sequence may take, if it differs from
    /// the data type's default.
    pub total_count: Option<usize>,
}

impl Sequence {
    pub fn new(taxon: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Sequence {
            taxon: taxon.into(),
            data: data.into(),
            total_count: None,
        }
    }

    pub fn with_total_count(mut self, total_count: usize) -> Self {
        self.total_count = Some(total_count);
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    id: String,
    data_type: DataType,
    sequences: Vec<Sequence>,
    site_count: usize,
}

impl Alignment {
    /// Build an alignment, checking that taxa are unique and all sequences
    /// have the same length.
    pub fn new(id: impl Into<String>, data_type: DataType, sequences: Vec<Sequence>) -> Result<Self> {
        let id = id.into();
        let Some(first) = sequences.first() else {
            return Err(TreeDistanceError::EmptyAlignment { id });
        };
        let site_count = first.len();

        let mut seen = HashSet::with_capacity(sequences.len());
        for seq in &sequences {
            if seq.len() != site_count {
                return Err(TreeDistanceError::SequenceLengthMismatch {
                    taxon: seq.taxon.clone(),
                    len: seq.len(),
                    expected: site_count,
                });
            }
            if !seen.insert(seq.taxon.as_str()) {
                return Err(TreeDistanceError::DuplicateTaxon(seq.taxon.clone()));
            }
        }

        Ok(Alignment {
            id,
            data_type,
            sequences,
            site_count,
        })
    }

    /// New alignment with the same taxa (in the same order), data type and
    /// per-sequence metadata as `template`, holding `rows` as sequence data.
    ///
    /// `rows[k]` replaces the data of the k-th sequence of the template.
    pub fn from_template(template: &Alignment, id: impl Into<String>, rows: Vec<Vec<u8>>) -> Result<Self> {
        let id = id.into();
        if rows.len() != template.taxon_count() {
            return Err(TreeDistanceError::RowCountMismatch {
                id,
                rows: rows.len(),
                taxa: template.taxon_count(),
            });
        }
        let sequences = template
            .sequences
            .iter()
            .zip(rows)
            .map(|(seq, data)| Sequence {
                taxon: seq.taxon.clone(),
                data,
                total_count: seq.total_count,
            })
            .collect();
        Alignment::new(id, template.data_type, sequences)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn taxon_count(&self) -> usize {
        self.sequences.len()
    }

    pub fn site_count(&self) -> usize {
        self.site_count
    }

    pub fn sequences(&self) -> &[Sequence] {
        &self.sequences
    }

    pub fn taxa_names(&self) -> Vec<&str> {
        self.sequences.iter().map(|s| s.taxon.as_str()).collect()
    }

    pub fn sequence_by_taxon(&self, taxon: &str) -> Option<&Sequence> {
        self.sequences.iter().find(|s| s.taxon == taxon)
    }

    /// Rows holding only the given columns, in the given order. Columns may
    /// repeat.
    pub fn select_sites(&self, sites: &[usize]) -> Result<Vec<Vec<u8>>> {
        if let Some(&site) = sites.iter().find(|&&s| s >= self.site_count) {
            return Err(TreeDistanceError::SiteOutOfRange {
                site,
                site_count: self.site_count,
            });
        }
        Ok(self
            .sequences
            .iter()
            .map(|seq| sites.iter().map(|&s| seq.data[s]).collect())
            .collect())
    }

    /// Sub-alignment with some taxa and/or sites removed.
    ///
    /// - `sites`: columns to keep (default: all).
    /// - `taxa`: taxa to drop. Without it, taxa whose kept columns are all
    ///   ambiguous are dropped.
    ///
    /// # Errors
    /// Fails on out-of-range sites, or if no taxon is left.
    pub fn prune(&self, taxa: Option<&HashSet<String>>, sites: Option<&[usize]>) -> Result<Alignment> {
        let all_sites: Vec<usize>;
        let sites = match sites {
            Some(sites) => sites,
            None => {
                all_sites = (0..self.site_count).collect();
                &all_sites
            }
        };
        let rows = self.select_sites(sites)?;

        let data_type = self.data_type;
        let sequences: Vec<Sequence> = self
            .sequences
            .iter()
            .zip(rows)
            .filter(|(seq, row)| match taxa {
                Some(drop) => !drop.contains(&seq.taxon),
                None => row.iter().any(|&b| data_type.is_informative(b)),
            })
            .map(|(seq, data)| Sequence {
                taxon: seq.taxon.clone(),
                data,
                total_count: seq.total_count,
            })
            .collect();

        Alignment::new(format!("{}.pruned", self.id), data_type, sequences)
    }
}

impl fmt::Display for Alignment {
    /// FASTA rendering.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seq in &self.sequences {
            writeln!(f, ">{}", seq.taxon)?;
            writeln!(f, "{}", String::from_utf8_lossy(&seq.data))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Alignment {
        Alignment::new(
            "aln",
            DataType::Nucleotide,
            vec![
                Sequence::new("A", "ACGTA").with_total_count(4),
                Sequence::new("B", "AC-TT"),
                Sequence::new("C", "??N--"),
                Sequence::new("D", "GCGTA"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dimensions() {
        let aln = sample();
        assert_eq!(aln.taxon_count(), 4);
        assert_eq!(aln.site_count(), 5);
        assert_eq!(aln.taxa_names(), vec!["A", "B", "C", "D"]);
        assert_eq!(aln.sequence_by_taxon("D").unwrap().data, b"GCGTA");
    }

    #[test]
    fn test_ragged_alignment_is_rejected() {
        let res = Alignment::new(
            "bad",
            DataType::Nucleotide,
            vec![Sequence::new("A", "ACGT"), Sequence::new("B", "ACG")],
        );
        assert!(matches!(
            res,
            Err(TreeDistanceError::SequenceLengthMismatch { len: 3, expected: 4, .. })
        ));
    }

    #[test]
    fn test_duplicate_taxon_is_rejected() {
        let res = Alignment::new(
            "dup",
            DataType::Nucleotide,
            vec![Sequence::new("A", "AC"), Sequence::new("A", "GT")],
        );
        assert!(matches!(res, Err(TreeDistanceError::DuplicateTaxon(t)) if t == "A"));
        assert!(matches!(
            Alignment::new("empty", DataType::Nucleotide, vec![]),
            Err(TreeDistanceError::EmptyAlignment { .. })
        ));
    }

    #[test]
    fn test_from_template_keeps_metadata() {
        let aln = sample();
        let rows = aln.select_sites(&[4, 4, 0]).unwrap();
        let derived = Alignment::from_template(&aln, "bootstrap0", rows).unwrap();

        assert_eq!(derived.id(), "bootstrap0");
        assert_eq!(derived.site_count(), 3);
        assert_eq!(derived.taxa_names(), aln.taxa_names());
        assert_eq!(derived.sequences()[0].data, b"AAA");
        assert_eq!(derived.sequences()[0].total_count, Some(4));
        assert_eq!(derived.sequences()[1].total_count, None);
        assert_eq!(derived.data_type(), DataType::Nucleotide);
    }

    #[test]
    fn test_select_out_of_range() {
        assert!(matches!(
            sample().select_sites(&[5]),
            Err(TreeDistanceError::SiteOutOfRange { site: 5, site_count: 5 })
        ));
    }

    #[test]
    fn test_prune_non_informative_taxa() {
        let pruned = sample().prune(None, None).unwrap();
        assert_eq!(pruned.taxa_names(), vec!["A", "B", "D"]);
        assert_eq!(pruned.site_count(), 5);
    }

    #[test]
    fn test_prune_with_sites_decides_informativeness_on_kept_sites() {
        // On column 2 only, B holds a gap and C an N.
        let pruned = sample().prune(None, Some(&[2])).unwrap();
        assert_eq!(pruned.taxa_names(), vec!["A", "D"]);
        assert_eq!(pruned.sequences()[0].data, b"G");
    }

    #[test]
    fn test_prune_explicit_taxa() {
        let drop: HashSet<String> = ["A".to_string(), "D".to_string()].into_iter().collect();
        let pruned = sample().prune(Some(&drop), Some(&[0, 1])).unwrap();
        assert_eq!(pruned.taxa_names(), vec!["B", "C"]);
        assert_eq!(pruned.sequences()[1].data, b"??");
    }

    #[test]
    fn test_fasta_display() {
        let aln = Alignment::new("x", DataType::Nucleotide, vec![Sequence::new("t1", "AC")]).unwrap();
        assert_eq!(aln.to_string(), ">t1\nAC\n");
    }

    #[test]
    fn test_amino_acid_informative() {
        assert!(DataType::AminoAcid.is_informative(b'w'));
        assert!(!DataType::AminoAcid.is_informative(b'X'));
        assert!(!DataType::Nucleotide.is_informative(b'R'));
        assert_eq!("protein".parse::<DataType>().unwrap(), DataType::AminoAcid);
    }
}
