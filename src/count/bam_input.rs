//! BAM input for read counting.

use crate::count::features::FeatureIndex;
use crate::count::reads::{Alignment, CigarOp, CountConfig, Counter, ReadFlags};
use crate::count::summary::SampleCounts;
use crate::error::{DgeError, Result};
use crate::genomic::Strand;
use log::{debug, info};
use noodles::bam;
use noodles::sam;
use noodles::sam::alignment::record::cigar::op::Kind as CigarKind;
use std::fs::File;
use std::path::Path;

fn cigar_op(kind: CigarKind) -> CigarOp {
    match kind {
        CigarKind::Match => CigarOp::Match,
        CigarKind::Insertion => CigarOp::Insertion,
        CigarKind::Deletion => CigarOp::Deletion,
        CigarKind::Skip => CigarOp::Skip,
        CigarKind::SoftClip => CigarOp::SoftClip,
        CigarKind::HardClip => CigarOp::HardClip,
        CigarKind::Pad => CigarOp::Pad,
        CigarKind::SequenceMatch => CigarOp::SequenceMatch,
        CigarKind::SequenceMismatch => CigarOp::SequenceMismatch,
    }
}

/// Reference names in header order.
fn reference_names(header: &sam::Header) -> Vec<String> {
    header
        .reference_sequences()
        .keys()
        .map(|name| {
            let bytes: &[u8] = name.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        })
        .collect()
}

/// Convert a BAM record into an [`Alignment`].
fn to_alignment(record: &bam::Record, references: &[String]) -> Result<Alignment> {
    let flags = record.flags();
    let read_flags = ReadFlags {
        unmapped: flags.is_unmapped(),
        secondary: flags.is_secondary(),
        supplementary: flags.is_supplementary(),
        duplicate: flags.is_duplicate(),
        paired: flags.is_segmented(),
        first_in_pair: flags.is_first_segment(),
    };

    let reference_id = record.reference_sequence_id().transpose()?;
    let start = record.alignment_start().transpose()?;
    let (Some(reference_id), Some(start)) = (reference_id, start) else {
        return Ok(Alignment::unmapped().with_flags(ReadFlags {
            unmapped: true,
            ..read_flags
        }));
    };
    let chrom = references.get(reference_id).cloned().ok_or_else(|| {
        DgeError::Alignment(format!("reference id {} not in header", reference_id))
    })?;

    let mut ops = Vec::new();
    for op in record.cigar().iter() {
        let op = op?;
        ops.push((cigar_op(op.kind()), op.len() as u64));
    }

    let strand = if flags.is_reverse_complemented() {
        Strand::Reverse
    } else {
        Strand::Forward
    };
    let mapq = record.mapping_quality().map(u8::from).unwrap_or(255);

    // Alignment start is 1-based
    let start0 = usize::from(start) as u64 - 1;
    Ok(Alignment::mapped(chrom, start0, &ops, strand)
        .with_mapq(mapq)
        .with_flags(read_flags))
}

/// Count reads of one BAM file against the feature index.
pub fn count_bam<P: AsRef<Path>>(
    path: P,
    sample_id: &str,
    index: &FeatureIndex,
    config: &CountConfig,
) -> Result<SampleCounts> {
    let path = path.as_ref();
    let file = File::open(path)
        .map_err(|e| DgeError::Alignment(format!("{}: {}", path.display(), e)))?;
    let mut reader = bam::io::Reader::new(file);
    let header = reader
        .read_header()
        .map_err(|e| DgeError::Alignment(format!("failed to read BAM header of {}: {}", path.display(), e)))?;
    let references = reference_names(&header);
    debug!("{}: {} reference sequences", path.display(), references.len());

    let mut counter = Counter::new(index, config);
    let mut record = bam::Record::default();
    let mut n_records: u64 = 0;
    loop {
        match reader.read_record(&mut record) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(DgeError::Alignment(format!(
                    "error reading record {} of {}: {}",
                    n_records + 1,
                    path.display(),
                    e
                )))
            }
        }
        n_records += 1;
        counter.add(&to_alignment(&record, &references)?);
    }

    let counts = counter.finish(sample_id);
    info!(
        "{}: {} records, {} assigned ({:.1}%)",
        sample_id,
        n_records,
        counts.total_assigned(),
        100.0 * counts.summary.assigned_fraction()
    );
    Ok(counts)
}
