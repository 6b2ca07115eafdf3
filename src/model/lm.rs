//! Per-gene linear models fitted by ordinary least squares.

use crate::data::DesignMatrix;
use crate::error::{DgeError, Result};
use crate::normalize::ExpressionMatrix;
use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Least-squares fit of one gene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmFitSingle {
    pub gene_id: String,
    /// Estimated coefficients, in design column order.
    pub coefficients: Vec<f64>,
    /// `sqrt(diag((X'X)^-1))`; multiply by sigma for standard errors.
    pub stdev_unscaled: Vec<f64>,
    /// Residual standard deviation.
    pub sigma: f64,
    pub df_residual: usize,
    /// Average log expression across samples.
    pub amean: f64,
}

impl LmFitSingle {
    pub fn get_coefficient(&self, index: usize) -> Option<f64> {
        self.coefficients.get(index).copied()
    }

    /// Ordinary standard error of a coefficient.
    pub fn std_error(&self, index: usize) -> Option<f64> {
        self.stdev_unscaled.get(index).map(|u| u * self.sigma)
    }

    /// Ordinary (unmoderated) t-statistic.
    pub fn t_statistic(&self, index: usize) -> Option<f64> {
        let coef = self.coefficients.get(index)?;
        let se = self.std_error(index)?;
        if se > 0.0 {
            Some(coef / se)
        } else {
            None
        }
    }
}

/// Linear model fits for all genes against one design.
#[derive(Debug, Clone)]
pub struct LmFit {
    pub fits: Vec<LmFitSingle>,
    pub coefficient_names: Vec<String>,
    pub n_samples: usize,
}

impl LmFit {
    pub fn get_gene(&self, gene_id: &str) -> Option<&LmFitSingle> {
        self.fits.iter().find(|f| f.gene_id == gene_id)
    }

    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }

    /// Residual variances `sigma^2` of all genes.
    pub fn residual_variances(&self) -> Vec<f64> {
        self.fits.iter().map(|f| f.sigma * f.sigma).collect()
    }

    pub fn n_genes(&self) -> usize {
        self.fits.len()
    }

    pub fn n_coefficients(&self) -> usize {
        self.coefficient_names.len()
    }
}

/// Fit `y = X b + e` for every gene of a log-expression matrix.
///
/// The design is shared, so `(X'X)^-1` is computed once and every gene
/// reduces to two matrix-vector products. Genes are fitted in parallel.
pub fn model_lm(expr: &ExpressionMatrix, design: &DesignMatrix) -> Result<LmFit> {
    let n_genes = expr.n_genes();
    let n_samples = expr.n_samples();
    let n_coef = design.n_coefficients();

    if design.n_samples() != n_samples {
        return Err(DgeError::DimensionMismatch {
            expected: n_samples,
            actual: design.n_samples(),
        });
    }
    if design.sample_ids() != expr.sample_ids.as_slice() {
        return Err(DgeError::SampleMismatch(
            "Design rows are not in expression column order".to_string(),
        ));
    }

    let df_residual = n_samples.saturating_sub(n_coef);
    if df_residual == 0 {
        return Err(DgeError::Numerical(
            "Model is saturated (n_samples <= n_coefficients)".to_string(),
        ));
    }

    let x = design.matrix();
    let xtx = x.transpose() * x;
    let xtx_inv = xtx.try_inverse().ok_or_else(|| {
        DgeError::Numerical("Design matrix is singular (X'X not invertible)".to_string())
    })?;
    let stdev_unscaled: Vec<f64> = (0..n_coef).map(|j| xtx_inv[(j, j)].sqrt()).collect();

    let fits: Vec<LmFitSingle> = (0..n_genes)
        .into_par_iter()
        .map(|i| {
            fit_single_gene(
                &expr.row(i),
                &expr.gene_ids[i],
                x,
                &xtx_inv,
                &stdev_unscaled,
                df_residual,
            )
        })
        .collect();

    log::debug!(
        "Fitted {} genes on {} coefficients, {} residual df",
        n_genes,
        n_coef,
        df_residual
    );

    Ok(LmFit {
        fits,
        coefficient_names: design.coefficient_names().to_vec(),
        n_samples,
    })
}

fn fit_single_gene(
    y: &[f64],
    gene_id: &str,
    x: &DMatrix<f64>,
    xtx_inv: &DMatrix<f64>,
    stdev_unscaled: &[f64],
    df_residual: usize,
) -> LmFitSingle {
    let y_vec = DVector::from_column_slice(y);

    let beta = xtx_inv * (x.transpose() * &y_vec);
    let residuals = &y_vec - x * &beta;
    let rss: f64 = residuals.iter().map(|e| e * e).sum();

    LmFitSingle {
        gene_id: gene_id.to_string(),
        coefficients: beta.iter().cloned().collect(),
        stdev_unscaled: stdev_unscaled.to_vec(),
        sigma: (rss / df_residual as f64).sqrt(),
        df_residual,
        amean: y.iter().sum::<f64>() / y.len() as f64,
    }
}
