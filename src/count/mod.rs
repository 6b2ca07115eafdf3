//! Read-count extraction: aligned reads to per-gene counts.
//!
//! Reads are assigned to genes following featureCounts conventions: a read
//! counts towards a gene when its aligned blocks overlap the exons of exactly
//! one gene. Everything else is tallied in an [`AssignmentSummary`].

mod bam_input;
mod features;
mod reads;
mod summary;

pub use bam_input::count_bam;
pub use features::FeatureIndex;
pub use reads::{
    assign, cigar_blocks, count_alignments, parse_cigar, Alignment, Assignment, CigarOp,
    CountConfig, Counter, ReadFlags, Strandedness,
};
pub use summary::{AssignmentSummary, ReadStatus, SampleCounts};
