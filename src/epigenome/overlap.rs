//! Fraction of promoters overlapping histone-mark peaks.

use crate::error::Result;
use crate::genomic::IntervalSet;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Promoters of one gene set against one peak set.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlapSummary {
    pub n_promoters: usize,
    /// Promoters sharing at least one base with a peak.
    pub n_overlapping: usize,
    /// `n_overlapping / n_promoters`; NaN without promoters.
    pub fraction: f64,
}

/// Count promoters that overlap any peak. Strand is ignored.
pub fn overlap_fraction(promoters: &IntervalSet, peaks: &IntervalSet) -> OverlapSummary {
    let n_promoters = promoters.len();
    let n_overlapping = promoters
        .intervals()
        .iter()
        .filter(|p| peaks.overlaps_any(p))
        .count();
    let fraction = if n_promoters == 0 {
        f64::NAN
    } else {
        n_overlapping as f64 / n_promoters as f64
    };
    OverlapSummary {
        n_promoters,
        n_overlapping,
        fraction,
    }
}

/// Overlap of DEG and background promoters with one category's peaks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryOverlap {
    pub category: String,
    pub epigenome_id: Option<String>,
    pub n_peaks: usize,
    /// Promoters of significant genes.
    pub deg: OverlapSummary,
    /// Promoters of all tested genes.
    pub background: OverlapSummary,
}

impl CategoryOverlap {
    pub fn new(
        category: impl Into<String>,
        epigenome_id: Option<String>,
        deg_promoters: &IntervalSet,
        background_promoters: &IntervalSet,
        peaks: &IntervalSet,
    ) -> Self {
        Self {
            category: category.into(),
            epigenome_id,
            n_peaks: peaks.len(),
            deg: overlap_fraction(deg_promoters, peaks),
            background: overlap_fraction(background_promoters, peaks),
        }
    }

    /// DEG overlap fraction relative to the background fraction.
    pub fn enrichment(&self) -> f64 {
        self.deg.fraction / self.background.fraction
    }
}

/// Write overlap rows as TSV, one row per category.
pub fn write_overlap_tsv<P: AsRef<Path>>(rows: &[CategoryOverlap], path: P) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(
        writer,
        "category\tepigenome\tn_peaks\tdeg_promoters\tdeg_overlapping\tdeg_fraction\tbackground_promoters\tbackground_overlapping\tbackground_fraction\tenrichment"
    )?;
    for row in rows {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{:.4}\t{}\t{}\t{:.4}\t{:.4}",
            row.category,
            row.epigenome_id.as_deref().unwrap_or("NA"),
            row.n_peaks,
            row.deg.n_promoters,
            row.deg.n_overlapping,
            row.deg.fraction,
            row.background.n_promoters,
            row.background.n_overlapping,
            row.background.fraction,
            row.enrichment()
        )?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genomic::{GenomicInterval, Strand};
    use approx::assert_relative_eq;
    use tempfile::NamedTempFile;

    fn set(ivs: &[(&str, u64, u64)]) -> IntervalSet {
        IntervalSet::new(
            ivs.iter()
                .map(|&(c, s, e)| GenomicInterval::new(c, s, e, Strand::Unknown).unwrap())
                .collect(),
        )
    }

    #[test]
    fn test_overlap_fraction() {
        let promoters = set(&[("chr1", 0, 100), ("chr1", 500, 600), ("chr2", 0, 100), ("chr3", 0, 10)]);
        let peaks = set(&[("chr1", 90, 120), ("chr2", 50, 60), ("chr1", 600, 700)]);

        let summary = overlap_fraction(&promoters, &peaks);
        // chr1:500-600 only touches the peak at 600 (half-open)
        assert_eq!(summary.n_promoters, 4);
        assert_eq!(summary.n_overlapping, 2);
        assert_relative_eq!(summary.fraction, 0.5);
    }

    #[test]
    fn test_no_promoters() {
        let summary = overlap_fraction(&IntervalSet::default(), &set(&[("chr1", 0, 10)]));
        assert_eq!(summary.n_overlapping, 0);
        assert!(summary.fraction.is_nan());
    }

    #[test]
    fn test_category_overlap_and_tsv() {
        let deg = set(&[("chr1", 0, 100), ("chr1", 1000, 1100)]);
        let background = set(&[("chr1", 0, 100), ("chr1", 1000, 1100), ("chr1", 5000, 5100), ("chr1", 9000, 9100)]);
        let peaks = set(&[("chr1", 50, 60)]);

        let row = CategoryOverlap::new("FetalBrain", Some("E081".into()), &deg, &background, &peaks);
        assert_relative_eq!(row.deg.fraction, 0.5);
        assert_relative_eq!(row.background.fraction, 0.25);
        assert_relative_eq!(row.enrichment(), 2.0);

        let file = NamedTempFile::new().unwrap();
        write_overlap_tsv(&[row], file.path()).unwrap();
        let content = std::fs::read_to_string(file.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("FetalBrain\tE081\t1\t2\t1\t0.5000"));
    }
}
