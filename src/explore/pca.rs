//! Principal component analysis of samples.
//!
//! Samples are observations and genes are variables, as in
//! `prcomp(t(expr))`. With thousands of genes and tens of samples the
//! decomposition runs on the n × n sample Gram matrix of the gene-centered
//! data, whose eigenvectors scaled by the singular values are the sample
//! scores.

use crate::error::{DgeError, Result};
use crate::normalize::ExpressionMatrix;
use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

/// Sample coordinates on the leading principal components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcaResult {
    pub sample_ids: Vec<String>,
    /// Scores, samples × components.
    #[serde(skip)]
    pub scores: DMatrix<f64>,
    /// Standard deviation of each component.
    pub sdev: Vec<f64>,
    /// Fraction of total variance per component.
    pub variance_explained: Vec<f64>,
}

impl PcaResult {
    pub fn n_components(&self) -> usize {
        self.scores.ncols()
    }

    /// Score of a sample on a component.
    pub fn score(&self, sample: usize, component: usize) -> f64 {
        self.scores[(sample, component)]
    }

    /// Scores of all samples on one component.
    pub fn component(&self, component: usize) -> Vec<f64> {
        self.scores.column(component).iter().cloned().collect()
    }
}

/// PCA of samples on gene-centered (optionally unit-variance) expression.
///
/// Genes with zero variance are dropped when scaling. Component signs are
/// fixed so that the largest absolute score is positive.
pub fn pca(expr: &ExpressionMatrix, n_components: usize, scale: bool) -> Result<PcaResult> {
    let n_samples = expr.n_samples();
    if n_samples < 2 {
        return Err(DgeError::InvalidParameter(
            "PCA needs at least 2 samples".to_string(),
        ));
    }
    if n_components == 0 {
        return Err(DgeError::InvalidParameter(
            "n_components must be at least 1".to_string(),
        ));
    }

    // Center (and scale) each gene across samples
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(expr.n_genes());
    for i in 0..expr.n_genes() {
        let row = expr.row(i);
        let mean = row.iter().sum::<f64>() / n_samples as f64;
        let mut centered: Vec<f64> = row.iter().map(|v| v - mean).collect();
        if scale {
            let sd = (centered.iter().map(|v| v * v).sum::<f64>() / (n_samples - 1) as f64).sqrt();
            if sd <= f64::EPSILON {
                continue;
            }
            centered.iter_mut().for_each(|v| *v /= sd);
        }
        rows.push(centered);
    }
    if rows.is_empty() {
        return Err(DgeError::EmptyData("No variable genes for PCA".to_string()));
    }

    let mut gram = DMatrix::<f64>::zeros(n_samples, n_samples);
    for row in &rows {
        for a in 0..n_samples {
            for b in a..n_samples {
                gram[(a, b)] += row[a] * row[b];
            }
        }
    }
    for a in 0..n_samples {
        for b in 0..a {
            gram[(a, b)] = gram[(b, a)];
        }
    }

    let eigen = SymmetricEigen::new(gram);
    let mut order: Vec<usize> = (0..n_samples).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let eigenvalues: Vec<f64> = order
        .iter()
        .map(|&k| eigen.eigenvalues[k].max(0.0))
        .collect();
    let total: f64 = eigenvalues.iter().sum();
    if total <= 0.0 {
        return Err(DgeError::Numerical(
            "Expression has no variance across samples".to_string(),
        ));
    }

    // Centering removes one dimension
    let k = n_components.min(n_samples - 1);
    let mut scores = DMatrix::<f64>::zeros(n_samples, k);
    for (c, &idx) in order.iter().take(k).enumerate() {
        let singular = eigenvalues[c].sqrt();
        let vector = eigen.eigenvectors.column(idx);
        let pivot = vector
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(1.0);
        let sign = if pivot < 0.0 { -1.0 } else { 1.0 };
        for s in 0..n_samples {
            scores[(s, c)] = sign * vector[s] * singular;
        }
    }

    Ok(PcaResult {
        sample_ids: expr.sample_ids.clone(),
        scores,
        sdev: eigenvalues
            .iter()
            .take(k)
            .map(|l| (l / (n_samples - 1) as f64).sqrt())
            .collect(),
        variance_explained: eigenvalues.iter().take(k).map(|l| l / total).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// 50 genes, 6 samples: the first 10 genes are 4 units higher in the
    /// last three samples; small deterministic noise elsewhere.
    fn two_group_expr() -> ExpressionMatrix {
        let n_genes = 50;
        let n_samples = 6;
        let mut data = DMatrix::zeros(n_genes, n_samples);
        for i in 0..n_genes {
            for j in 0..n_samples {
                let noise = (((i * 7 + j * 13) % 11) as f64 - 5.0) * 0.02;
                let shift = if i < 10 && j >= 3 { 4.0 } else { 0.0 };
                data[(i, j)] = 5.0 + shift + noise;
            }
        }
        ExpressionMatrix::new(
            data,
            (0..n_genes).map(|i| format!("g{}", i)).collect(),
            (0..n_samples).map(|j| format!("S{}", j)).collect(),
            "test",
        )
        .unwrap()
    }

    #[test]
    fn test_pc1_separates_groups() {
        let result = pca(&two_group_expr(), 2, false).unwrap();
        let pc1 = result.component(0);

        let group_a_sign = pc1[0].signum();
        assert!(pc1[..3].iter().all(|v| v.signum() == group_a_sign));
        assert!(pc1[3..].iter().all(|v| v.signum() == -group_a_sign));
        assert!(result.variance_explained[0] > 0.9);
    }

    #[test]
    fn test_variance_fractions_and_centering() {
        let result = pca(&two_group_expr(), 10, true).unwrap();
        // at most n - 1 components
        assert_eq!(result.n_components(), 5);
        let total: f64 = result.variance_explained.iter().sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
        for c in 0..result.n_components() {
            let sum: f64 = result.component(c).iter().sum();
            assert_relative_eq!(sum, 0.0, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_constant_expression_rejected() {
        let expr = ExpressionMatrix::new(
            DMatrix::from_element(3, 3, 2.0),
            vec!["a".into(), "b".into(), "c".into()],
            vec!["x".into(), "y".into(), "z".into()],
            "test",
        )
        .unwrap();
        assert!(pca(&expr, 2, false).is_err());
        assert!(pca(&expr, 2, true).is_err());
    }
}
