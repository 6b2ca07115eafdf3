//! Per-sample expression distribution summaries.

use crate::error::{DgeError, Result};
use crate::normalize::ExpressionMatrix;
use serde::{Deserialize, Serialize};

/// Five-number summary of one sample plus Tukey whiskers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoxStats {
    pub sample_id: String,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    /// Smallest value within `q1 - 1.5 * IQR`.
    pub lower_whisker: f64,
    /// Largest value within `q3 + 1.5 * IQR`.
    pub upper_whisker: f64,
    /// Values beyond the whiskers.
    pub n_outliers: usize,
}

/// Linear-interpolation quantile of sorted data.
pub(crate) fn sorted_quantile(sorted: &[f64], p: f64) -> f64 {
    let h = (sorted.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    sorted[lo] + (h - lo as f64) * (sorted[hi] - sorted[lo])
}

fn summarize(sample_id: &str, mut values: Vec<f64>) -> BoxStats {
    values.sort_by(|a, b| a.total_cmp(b));
    let q1 = sorted_quantile(&values, 0.25);
    let q3 = sorted_quantile(&values, 0.75);
    let iqr = q3 - q1;
    let lo_fence = q1 - 1.5 * iqr;
    let hi_fence = q3 + 1.5 * iqr;
    let lower_whisker = values.iter().copied().find(|&v| v >= lo_fence).unwrap_or(q1);
    let upper_whisker = values.iter().rev().copied().find(|&v| v <= hi_fence).unwrap_or(q3);

    BoxStats {
        sample_id: sample_id.to_string(),
        min: values[0],
        q1,
        median: sorted_quantile(&values, 0.5),
        q3,
        max: values[values.len() - 1],
        lower_whisker,
        upper_whisker,
        n_outliers: values.iter().filter(|&&v| v < lo_fence || v > hi_fence).count(),
    }
}

/// Box-plot statistics for every sample of a log-expression matrix.
pub fn box_stats(expr: &ExpressionMatrix) -> Result<Vec<BoxStats>> {
    if expr.n_genes() == 0 {
        return Err(DgeError::EmptyData("No genes to summarize".to_string()));
    }
    Ok(expr
        .sample_ids
        .iter()
        .enumerate()
        .map(|(j, sample_id)| summarize(sample_id, expr.col(j)))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;

    #[test]
    fn test_box_stats() {
        // one sample: 1..=9 plus an outlier at 100
        let mut values: Vec<f64> = (1..=9).map(|v| v as f64).collect();
        values.push(100.0);
        let expr = ExpressionMatrix::new(
            DMatrix::from_column_slice(10, 1, &values),
            (0..10).map(|i| format!("g{}", i)).collect(),
            vec!["S1".into()],
            "test",
        )
        .unwrap();

        let stats = box_stats(&expr).unwrap();
        let s = &stats[0];
        assert_eq!(s.sample_id, "S1");
        assert_relative_eq!(s.median, 5.5);
        assert_relative_eq!(s.q1, 3.25);
        assert_relative_eq!(s.q3, 7.75);
        assert_relative_eq!(s.max, 100.0);
        assert_relative_eq!(s.upper_whisker, 9.0);
        assert_relative_eq!(s.lower_whisker, 1.0);
        assert_eq!(s.n_outliers, 1);
    }
}
