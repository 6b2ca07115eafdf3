//! Low-expression gene filters.

use crate::data::CountMatrix;
use crate::error::{DgeError, Result};
use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which low-expression filter to apply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ExpressionFilter {
    /// Keep genes whose mean raw count is strictly greater than `min_mean`.
    MeanCount { min_mean: f64 },
    /// Keep genes with CPM above `min_cpm` in at least `min_samples` samples.
    Cpm { min_cpm: f64, min_samples: usize },
    None,
}

impl Default for ExpressionFilter {
    fn default() -> Self {
        ExpressionFilter::MeanCount { min_mean: 10.0 }
    }
}

impl ExpressionFilter {
    /// Row indices passing the filter.
    pub fn keep_indices(&self, counts: &CountMatrix) -> Result<Vec<usize>> {
        match self {
            ExpressionFilter::MeanCount { min_mean } => mean_count_indices(counts, *min_mean),
            ExpressionFilter::Cpm {
                min_cpm,
                min_samples,
            } => cpm_indices(counts, *min_cpm, *min_samples),
            ExpressionFilter::None => Ok((0..counts.n_genes()).collect()),
        }
    }

    /// Apply the filter, returning the kept rows.
    pub fn apply(&self, counts: &CountMatrix) -> Result<CountMatrix> {
        let keep = self.keep_indices(counts)?;
        if keep.is_empty() {
            return Err(DgeError::EmptyData(format!(
                "No genes pass the expression filter {:?}",
                self
            )));
        }
        info!(
            "Expression filter kept {} of {} genes",
            keep.len(),
            counts.n_genes()
        );
        counts.subset_genes(&keep)
    }
}

fn mean_count_indices(counts: &CountMatrix, min_mean: f64) -> Result<Vec<usize>> {
    if min_mean < 0.0 {
        return Err(DgeError::InvalidParameter(
            "min_mean must be non-negative".to_string(),
        ));
    }
    let means = counts.row_means();
    Ok((0..counts.n_genes())
        .into_par_iter()
        .filter(|&row| means[row] > min_mean)
        .collect())
}

fn cpm_indices(counts: &CountMatrix, min_cpm: f64, min_samples: usize) -> Result<Vec<usize>> {
    if min_cpm < 0.0 {
        return Err(DgeError::InvalidParameter(
            "min_cpm must be non-negative".to_string(),
        ));
    }
    if min_samples > counts.n_samples() {
        return Err(DgeError::InvalidParameter(format!(
            "min_samples ({}) exceeds the number of samples ({})",
            min_samples,
            counts.n_samples()
        )));
    }
    let lib_sizes = counts.col_sums();
    if lib_sizes.iter().any(|&l| l == 0) {
        return Err(DgeError::EmptyData(
            "A sample has zero total counts".to_string(),
        ));
    }
    Ok((0..counts.n_genes())
        .into_par_iter()
        .filter(|&row| {
            let passing = counts
                .row_dense(row)
                .iter()
                .zip(&lib_sizes)
                .filter(|(&c, &lib)| c as f64 / lib as f64 * 1e6 > min_cpm)
                .count();
            passing >= min_samples
        })
        .collect())
}

/// Keep genes whose mean raw count is strictly greater than `min_mean`.
pub fn filter_mean_count(counts: &CountMatrix, min_mean: f64) -> Result<CountMatrix> {
    ExpressionFilter::MeanCount { min_mean }.apply(counts)
}

/// Keep genes with CPM above `min_cpm` in at least `min_samples` samples.
pub fn filter_cpm(counts: &CountMatrix, min_cpm: f64, min_samples: usize) -> Result<CountMatrix> {
    ExpressionFilter::Cpm {
        min_cpm,
        min_samples,
    }
    .apply(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts() -> CountMatrix {
        // genes: g1 mean 10 (not kept at >10), g2 mean 11, g3 zero
        CountMatrix::from_columns(
            vec!["g1".into(), "g2".into(), "g3".into()],
            vec!["S1".into(), "S2".into()],
            &[vec![10, 2, 0], vec![10, 20, 0]],
        )
        .unwrap()
    }

    #[test]
    fn test_mean_count_is_strict() {
        let filtered = filter_mean_count(&counts(), 10.0).unwrap();
        assert_eq!(filtered.gene_ids(), &["g2"]);
    }

    #[test]
    fn test_cpm_filter() {
        // S1 lib 12: g1 833333 cpm, g2 166667; S2 lib 30: g1 333333, g2 666667
        let filtered = filter_cpm(&counts(), 200_000.0, 2).unwrap();
        assert_eq!(filtered.gene_ids(), &["g1"]);

        let filtered = filter_cpm(&counts(), 200_000.0, 1).unwrap();
        assert_eq!(filtered.gene_ids(), &["g1", "g2"]);
    }

    #[test]
    fn test_filter_removing_everything_errors() {
        assert!(filter_mean_count(&counts(), 1000.0).is_err());
    }

    #[test]
    fn test_none_keeps_all() {
        let kept = ExpressionFilter::None.keep_indices(&counts()).unwrap();
        assert_eq!(kept, vec![0, 1, 2]);
    }
}
