//! Read-to-gene assignment with featureCounts rules.

use crate::count::features::FeatureIndex;
use crate::count::summary::{AssignmentSummary, ReadStatus, SampleCounts};
use crate::genomic::Strand;
use serde::{Deserialize, Serialize};

/// Library strandedness (featureCounts `-s 0/1/2`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strandedness {
    #[default]
    Unstranded,
    /// Read strand matches the gene strand.
    Forward,
    /// Read strand is opposite the gene strand (dUTP protocols).
    Reverse,
}

/// Counting options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CountConfig {
    pub strandedness: Strandedness,
    /// Reads below this MAPQ are not counted.
    pub min_mapq: u8,
    /// Skip reads flagged as PCR/optical duplicates.
    pub ignore_duplicates: bool,
    /// Count fragments: only the first segment of a pair is considered.
    pub paired_end: bool,
    /// GTF feature type to count over.
    pub feature_type: String,
    /// GTF attribute grouping features into genes.
    pub attribute: String,
}

impl Default for CountConfig {
    fn default() -> Self {
        Self {
            strandedness: Strandedness::Unstranded,
            min_mapq: 0,
            ignore_duplicates: false,
            paired_end: false,
            feature_type: "exon".to_string(),
            attribute: "gene_id".to_string(),
        }
    }
}

/// CIGAR operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CigarOp {
    Match,
    Insertion,
    Deletion,
    Skip,
    SoftClip,
    HardClip,
    Pad,
    SequenceMatch,
    SequenceMismatch,
}

impl CigarOp {
    pub fn from_char(c: char) -> Option<Self> {
        Some(match c {
            'M' => Self::Match,
            'I' => Self::Insertion,
            'D' => Self::Deletion,
            'N' => Self::Skip,
            'S' => Self::SoftClip,
            'H' => Self::HardClip,
            'P' => Self::Pad,
            '=' => Self::SequenceMatch,
            'X' => Self::SequenceMismatch,
            _ => return None,
        })
    }
}

/// Parse a CIGAR string such as `50M1000N50M`.
pub fn parse_cigar(cigar: &str) -> Option<Vec<(CigarOp, u64)>> {
    if cigar == "*" {
        return Some(Vec::new());
    }
    let mut ops = Vec::new();
    let mut len: u64 = 0;
    let mut has_digits = false;
    for c in cigar.chars() {
        if let Some(d) = c.to_digit(10) {
            len = len.checked_mul(10)?.checked_add(u64::from(d))?;
            has_digits = true;
        } else {
            if !has_digits {
                return None;
            }
            ops.push((CigarOp::from_char(c)?, len));
            len = 0;
            has_digits = false;
        }
    }
    if has_digits {
        return None;
    }
    Some(ops)
}

/// Reference blocks `[start, end)` covered by an alignment.
///
/// M, =, X and D extend the current block; N closes it and starts a new one
/// after the skipped region. I, S, H and P consume no reference.
pub fn cigar_blocks(start: u64, ops: &[(CigarOp, u64)]) -> Vec<(u64, u64)> {
    let mut blocks = Vec::new();
    let mut pos = start;
    let mut block_start = start;
    for &(op, len) in ops {
        match op {
            CigarOp::Match | CigarOp::SequenceMatch | CigarOp::SequenceMismatch | CigarOp::Deletion => {
                pos += len;
            }
            CigarOp::Skip => {
                if pos > block_start {
                    blocks.push((block_start, pos));
                }
                pos += len;
                block_start = pos;
            }
            CigarOp::Insertion | CigarOp::SoftClip | CigarOp::HardClip | CigarOp::Pad => {}
        }
    }
    if pos > block_start {
        blocks.push((block_start, pos));
    }
    blocks
}

/// SAM flag bits relevant to counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadFlags {
    pub unmapped: bool,
    pub secondary: bool,
    pub supplementary: bool,
    pub duplicate: bool,
    pub paired: bool,
    pub first_in_pair: bool,
}

impl ReadFlags {
    /// Decode from the numeric SAM FLAG field.
    pub fn from_bits(bits: u16) -> Self {
        Self {
            paired: bits & 0x1 != 0,
            unmapped: bits & 0x4 != 0,
            first_in_pair: bits & 0x40 != 0,
            secondary: bits & 0x100 != 0,
            duplicate: bits & 0x400 != 0,
            supplementary: bits & 0x800 != 0,
        }
    }
}

/// An aligned read reduced to what assignment needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Reference name; `None` when unmapped.
    pub chrom: Option<String>,
    /// Aligned reference blocks, 0-based half-open.
    pub blocks: Vec<(u64, u64)>,
    pub strand: Strand,
    /// 255 when unavailable.
    pub mapq: u8,
    pub flags: ReadFlags,
}

impl Alignment {
    /// A mapped single-end read starting at 0-based `start`.
    pub fn mapped(chrom: impl Into<String>, start: u64, ops: &[(CigarOp, u64)], strand: Strand) -> Self {
        Self {
            chrom: Some(chrom.into()),
            blocks: cigar_blocks(start, ops),
            strand,
            mapq: 255,
            flags: ReadFlags::default(),
        }
    }

    pub fn unmapped() -> Self {
        Self {
            chrom: None,
            blocks: Vec::new(),
            strand: Strand::Unknown,
            mapq: 0,
            flags: ReadFlags {
                unmapped: true,
                ..ReadFlags::default()
            },
        }
    }

    pub fn with_mapq(mut self, mapq: u8) -> Self {
        self.mapq = mapq;
        self
    }

    pub fn with_flags(mut self, flags: ReadFlags) -> Self {
        self.flags = flags;
        self
    }
}

/// Result of assigning one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignment {
    /// Index of the gene in the [`FeatureIndex`].
    Gene(usize),
    Unassigned(ReadStatus),
}

impl Assignment {
    pub fn status(&self) -> ReadStatus {
        match self {
            Assignment::Gene(_) => ReadStatus::Assigned,
            Assignment::Unassigned(status) => *status,
        }
    }
}

/// Whether a read on `read` strand may count towards a feature on `feature`.
fn strand_compatible(strandedness: Strandedness, read: Strand, feature: Strand) -> bool {
    if feature == Strand::Unknown || read == Strand::Unknown {
        return true;
    }
    match strandedness {
        Strandedness::Unstranded => true,
        Strandedness::Forward => read == feature,
        Strandedness::Reverse => read == feature.opposite(),
    }
}

/// Assign one read to a gene.
///
/// Filters apply in order: unmapped, secondary, supplementary, MAPQ,
/// duplicate. Surviving reads are assigned when their blocks overlap exons of
/// exactly one gene.
pub fn assign(alignment: &Alignment, index: &FeatureIndex, config: &CountConfig) -> Assignment {
    let flags = &alignment.flags;
    let chrom = match &alignment.chrom {
        Some(chrom) if !flags.unmapped => chrom,
        _ => return Assignment::Unassigned(ReadStatus::Unmapped),
    };
    if flags.secondary {
        return Assignment::Unassigned(ReadStatus::Secondary);
    }
    if flags.supplementary {
        return Assignment::Unassigned(ReadStatus::Supplementary);
    }
    if alignment.mapq < config.min_mapq {
        return Assignment::Unassigned(ReadStatus::MappingQuality);
    }
    if config.ignore_duplicates && flags.duplicate {
        return Assignment::Unassigned(ReadStatus::Duplicate);
    }

    let mut genes = Vec::new();
    for &(start, end) in &alignment.blocks {
        index.genes_overlapping(
            chrom,
            start,
            end,
            |feature| strand_compatible(config.strandedness, alignment.strand, feature),
            &mut genes,
        );
    }
    genes.sort_unstable();
    genes.dedup();

    match genes.as_slice() {
        [] => Assignment::Unassigned(ReadStatus::NoFeatures),
        [gene] => Assignment::Gene(*gene),
        _ => Assignment::Unassigned(ReadStatus::Ambiguity),
    }
}

/// Whether a read is skipped entirely in fragment mode (the mate of a pair
/// already represented by its first segment).
pub(crate) fn is_mate_record(alignment: &Alignment, config: &CountConfig) -> bool {
    config.paired_end && alignment.flags.paired && !alignment.flags.first_in_pair
}

/// Accumulates assignments into gene counts.
#[derive(Debug)]
pub struct Counter<'a> {
    index: &'a FeatureIndex,
    config: &'a CountConfig,
    counts: Vec<u64>,
    summary: AssignmentSummary,
}

impl<'a> Counter<'a> {
    pub fn new(index: &'a FeatureIndex, config: &'a CountConfig) -> Self {
        Self {
            index,
            config,
            counts: vec![0; index.n_genes()],
            summary: AssignmentSummary::default(),
        }
    }

    pub fn add(&mut self, alignment: &Alignment) {
        if is_mate_record(alignment, self.config) {
            return;
        }
        let assignment = assign(alignment, self.index, self.config);
        if let Assignment::Gene(gene) = assignment {
            self.counts[gene] += 1;
        }
        self.summary.record(assignment.status());
    }

    pub fn finish(self, sample_id: impl Into<String>) -> SampleCounts {
        SampleCounts {
            sample_id: sample_id.into(),
            gene_ids: self.index.gene_ids().to_vec(),
            counts: self.counts,
            summary: self.summary,
        }
    }
}

/// Count in-memory alignments.
pub fn count_alignments<'b, I>(
    sample_id: &str,
    alignments: I,
    index: &FeatureIndex,
    config: &CountConfig,
) -> SampleCounts
where
    I: IntoIterator<Item = &'b Alignment>,
{
    let mut counter = Counter::new(index, config);
    for alignment in alignments {
        counter.add(alignment);
    }
    counter.finish(sample_id)
}
