//! Promoter windows around transcription start sites.

use crate::data::GeneAnnotation;
use crate::error::Result;
use crate::genomic::{ucsc_chrom, GenomicInterval, IntervalSet, Strand};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Promoter window size around the TSS, in bases.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromoterWindow {
    pub upstream: u64,
    pub downstream: u64,
}

impl Default for PromoterWindow {
    fn default() -> Self {
        Self {
            upstream: 2000,
            downstream: 200,
        }
    }
}

/// Promoter interval of a single TSS.
///
/// On the forward strand the window is `[tss - upstream, tss + downstream)`;
/// on the reverse strand upstream lies to the right, giving
/// `[tss + 1 - downstream, tss + 1 + upstream)`. The start is clipped at 0.
pub fn promoter_window(
    chrom: &str,
    tss: u64,
    strand: Strand,
    window: PromoterWindow,
) -> Result<GenomicInterval> {
    let (start, end) = match strand {
        Strand::Reverse => (
            (tss + 1).saturating_sub(window.downstream),
            tss + 1 + window.upstream,
        ),
        _ => (tss.saturating_sub(window.upstream), tss + window.downstream),
    };
    GenomicInterval::new(ucsc_chrom(chrom), start, end, strand)
}

/// Promoter regions of the given genes.
///
/// Genes are looked up with and without their version suffix. Genes that
/// are missing from the annotation or carry no coordinates are skipped.
pub fn promoters(
    annotation: &GeneAnnotation,
    genes: &[String],
    upstream: u64,
    downstream: u64,
) -> Result<IntervalSet> {
    let window = PromoterWindow {
        upstream,
        downstream,
    };
    let mut intervals = Vec::with_capacity(genes.len());
    let mut n_missing = 0;

    for gene in genes {
        let located = annotation
            .lookup(gene, true)
            .and_then(|record| record.location.as_ref().zip(record.tss()));
        match located {
            Some((loc, tss)) => intervals.push(promoter_window(&loc.chrom, tss, loc.strand, window)?),
            None => n_missing += 1,
        }
    }

    if n_missing > 0 {
        warn!("{} of {} genes have no annotated location", n_missing, genes.len());
    }
    debug!("Built {} promoter windows", intervals.len());
    Ok(IntervalSet::new(intervals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::GeneRecord;

    fn gene(id: &str, chrom: &str, start: u64, end: u64, strand: Strand) -> GeneRecord {
        GeneRecord {
            gene_id: id.to_string(),
            symbol: id.to_string(),
            location: Some(GenomicInterval::new(chrom, start, end, strand).unwrap()),
        }
    }

    #[test]
    fn test_strand_aware_windows() {
        let annotation = GeneAnnotation::new(vec![
            gene("ENSG01", "1", 10_000, 20_000, Strand::Forward),
            gene("ENSG02", "1", 50_000, 60_000, Strand::Reverse),
        ]);
        let set = promoters(&annotation, &["ENSG01".into(), "ENSG02".into()], 2000, 200).unwrap();
        let ivs = set.intervals();

        assert_eq!(ivs[0].chrom, "chr1");
        assert_eq!((ivs[0].start, ivs[0].end), (8_000, 10_200));
        // TSS of a reverse-strand gene is its last base, 59_999
        assert_eq!((ivs[1].start, ivs[1].end), (59_800, 62_000));
    }

    #[test]
    fn test_window_clipped_at_zero() {
        let iv = promoter_window("chr2", 500, Strand::Forward, PromoterWindow::default()).unwrap();
        assert_eq!((iv.start, iv.end), (0, 700));
    }

    #[test]
    fn test_missing_and_versioned_genes() {
        let annotation = GeneAnnotation::new(vec![
            gene("ENSG01", "chrX", 10_000, 20_000, Strand::Forward),
            GeneRecord {
                gene_id: "ENSG03".to_string(),
                symbol: "NOLOC".to_string(),
                location: None,
            },
        ]);
        let genes = vec!["ENSG01.7".to_string(), "ENSG03".to_string(), "ENSG99".to_string()];
        let set = promoters(&annotation, &genes, 1000, 100).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(set.intervals()[0].chrom, "chrX");
    }
}
