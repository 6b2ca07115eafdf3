//! Table assembly: merged counts, annotation, filtering and sample metadata.

mod annotate;
mod filter;
mod merge;

pub use annotate::{join_annotation, AnnotatedCounts};
pub use filter::{filter_cpm, filter_mean_count, ExpressionFilter};
pub use merge::{merge_counts, merge_sample_counts, read_sample_counts};

use crate::data::{CountMatrix, SampleTable};
use crate::error::{DgeError, Result};
use log::warn;

/// Align the sample table to the count matrix' column order.
///
/// Every count column must have a metadata row; extra metadata rows are
/// dropped.
pub fn attach_samples(counts: &CountMatrix, samples: &SampleTable) -> Result<SampleTable> {
    let missing: Vec<&str> = counts
        .sample_ids()
        .iter()
        .filter(|s| !samples.has_sample(s))
        .map(|s| s.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(DgeError::SampleMismatch(format!(
            "No metadata for samples: {}",
            missing.join(", ")
        )));
    }
    let extra = samples.n_samples().saturating_sub(counts.n_samples());
    if extra > 0 {
        warn!("Ignoring {} metadata rows without counts", extra);
    }
    samples.align_to(counts.sample_ids())
}

/// Counts, per-sample metadata and per-gene symbols for one experiment.
#[derive(Debug, Clone)]
pub struct ExpressionSet {
    counts: CountMatrix,
    samples: SampleTable,
    symbols: Vec<String>,
}

impl ExpressionSet {
    /// Bundle the three tables; samples are aligned to the count columns.
    pub fn new(counts: CountMatrix, samples: &SampleTable, symbols: Vec<String>) -> Result<Self> {
        if symbols.len() != counts.n_genes() {
            return Err(DgeError::DimensionMismatch {
                expected: counts.n_genes(),
                actual: symbols.len(),
            });
        }
        let samples = attach_samples(&counts, samples)?;
        Ok(Self {
            counts,
            samples,
            symbols,
        })
    }

    pub fn counts(&self) -> &CountMatrix {
        &self.counts
    }

    pub fn samples(&self) -> &SampleTable {
        &self.samples
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Restrict to the given gene rows.
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let symbols = indices
            .iter()
            .map(|&i| {
                self.symbols.get(i).cloned().ok_or_else(|| {
                    DgeError::InvalidParameter(format!("Gene index {} out of bounds", i))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            counts: self.counts.subset_genes(indices)?,
            samples: self.samples.clone(),
            symbols,
        })
    }

    /// Apply a low-expression filter to the genes.
    pub fn filter(&self, filter: &ExpressionFilter) -> Result<Self> {
        let keep = filter.keep_indices(&self.counts)?;
        if keep.is_empty() {
            return Err(DgeError::EmptyData(format!(
                "No genes pass the expression filter {:?}",
                filter
            )));
        }
        self.subset_genes(&keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn samples() -> SampleTable {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tage_group").unwrap();
        writeln!(file, "S3\tadult").unwrap();
        writeln!(file, "S1\tfetal").unwrap();
        writeln!(file, "S2\tfetal").unwrap();
        file.flush().unwrap();
        SampleTable::from_tsv(file.path()).unwrap()
    }

    fn counts() -> CountMatrix {
        CountMatrix::from_columns(
            vec!["g1".into(), "g2".into()],
            vec!["S1".into(), "S3".into()],
            &[vec![50, 1], vec![40, 30]],
        )
        .unwrap()
    }

    #[test]
    fn test_attach_samples_aligns_order() {
        let aligned = attach_samples(&counts(), &samples()).unwrap();
        assert_eq!(aligned.sample_ids(), &["S1", "S3"]);
        assert_eq!(aligned.labels("age_group").unwrap(), vec!["fetal", "adult"]);
    }

    #[test]
    fn test_attach_samples_missing_metadata() {
        let counts = CountMatrix::from_columns(
            vec!["g1".into()],
            vec!["S1".into(), "S9".into()],
            &[vec![1], vec![2]],
        )
        .unwrap();
        assert!(matches!(
            attach_samples(&counts, &samples()),
            Err(DgeError::SampleMismatch(_))
        ));
    }

    #[test]
    fn test_expression_set_filter_keeps_symbols_in_step() {
        let set = ExpressionSet::new(counts(), &samples(), vec!["A".into(), "B".into()]).unwrap();
        let filtered = set
            .filter(&ExpressionFilter::MeanCount { min_mean: 20.0 })
            .unwrap();
        assert_eq!(filtered.counts().gene_ids(), &["g1"]);
        assert_eq!(filtered.symbols(), &["A"]);
    }
}
