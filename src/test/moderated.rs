//! Moderated t-test for a linear model coefficient.
//!
//! The ordinary t-statistic `coef / (stdev_unscaled * sigma)` is replaced by
//! `coef / (stdev_unscaled * s_post)`, where `s_post^2` is the posterior
//! variance from [`squeeze_var`](crate::model::squeeze_var). Under the null it
//! follows a t-distribution with `df_residual + d0` degrees of freedom.

use crate::error::{DgeError, Result};
use crate::model::{squeeze_var, tmixture, LmFit};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Bounds on the standard deviation of a true log fold change, used when
/// estimating the prior variance of non-zero coefficients.
const STDEV_COEF_LIM: (f64, f64) = (0.1, 4.0);

/// Moderated statistics for one gene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratedStat {
    pub gene_id: String,
    /// Coefficient estimate (log2 fold change for a group contrast).
    pub estimate: f64,
    pub ave_expr: f64,
    pub t: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    /// Log-odds that the gene is differentially expressed.
    pub b: f64,
    pub var_post: f64,
}

/// Moderated test results for all genes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModeratedResult {
    pub results: Vec<ModeratedStat>,
    pub coefficient: String,
    /// Prior degrees of freedom `d0`.
    pub df_prior: f64,
    /// Prior residual variance `s0^2`.
    pub var_prior: f64,
    /// Degrees of freedom of the moderated t.
    pub df_total: f64,
    /// Prior variance of non-zero coefficients.
    pub coef_var_prior: f64,
    /// Assumed proportion of differentially expressed genes.
    pub proportion: f64,
}

impl ModeratedResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn p_values(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.p_value).collect()
    }

    pub fn gene_ids(&self) -> Vec<&str> {
        self.results.iter().map(|r| r.gene_id.as_str()).collect()
    }

    pub fn get_gene(&self, gene_id: &str) -> Option<&ModeratedStat> {
        self.results.iter().find(|r| r.gene_id == gene_id)
    }
}

/// Moderated t-test of one coefficient across all genes.
///
/// `proportion` is the assumed fraction of genes with a non-zero
/// coefficient (0.01 by convention); it sets the prior odds of the
/// B-statistic.
pub fn test_moderated(fit: &LmFit, coefficient: &str, proportion: f64) -> Result<ModeratedResult> {
    let coef_idx = fit.coefficient_index(coefficient).ok_or_else(|| {
        DgeError::InvalidParameter(format!(
            "Coefficient '{}' not found. Available: {:?}",
            coefficient, fit.coefficient_names
        ))
    })?;
    if !(proportion > 0.0 && proportion < 1.0) {
        return Err(DgeError::InvalidParameter(format!(
            "proportion must be in (0, 1), got {}",
            proportion
        )));
    }
    let first = fit
        .fits
        .first()
        .ok_or_else(|| DgeError::EmptyData("No genes were fitted".to_string()))?;

    let df_residual = first.df_residual as f64;
    let squeezed = squeeze_var(&fit.residual_variances(), df_residual)?;
    let infinite_prior = squeezed.is_df_infinite();

    let df_pooled: f64 = fit.fits.iter().map(|f| f.df_residual as f64).sum();
    let df_total = (df_residual + squeezed.df_prior).min(df_pooled);
    let t_dist = StudentsT::new(0.0, 1.0, df_total)
        .map_err(|e| DgeError::Numerical(format!("Invalid t distribution: {}", e)))?;

    let estimates: Vec<f64> = fit.fits.iter().map(|f| f.coefficients[coef_idx]).collect();
    let stdev_unscaled: Vec<f64> = fit.fits.iter().map(|f| f.stdev_unscaled[coef_idx]).collect();
    let t: Vec<f64> = estimates
        .iter()
        .zip(&stdev_unscaled)
        .zip(&squeezed.var_post)
        .map(|((b, su), v)| b / (su * v.sqrt()))
        .collect();

    let lim = (
        STDEV_COEF_LIM.0.powi(2) / squeezed.var_prior,
        STDEV_COEF_LIM.1.powi(2) / squeezed.var_prior,
    );
    let coef_var_prior = match tmixture(&t, &stdev_unscaled, df_total, proportion, lim)? {
        Some(v) => v,
        None => {
            log::warn!("Estimation of coefficient prior variance failed, using 1/s0^2");
            1.0 / squeezed.var_prior
        }
    };

    let prior_log_odds = (proportion / (1.0 - proportion)).ln();
    let results: Vec<ModeratedStat> = fit
        .fits
        .iter()
        .enumerate()
        .map(|(i, f)| {
            let su2 = stdev_unscaled[i] * stdev_unscaled[i];
            let r = (su2 + coef_var_prior) / su2;
            let t2 = t[i] * t[i];
            let kernel = if infinite_prior {
                t2 * (1.0 - 1.0 / r) / 2.0
            } else {
                (1.0 + df_total) / 2.0 * ((t2 + df_total) / (t2 / r + df_total)).ln()
            };
            let p_value = if t[i].is_nan() {
                f64::NAN
            } else {
                2.0 * t_dist.sf(t[i].abs())
            };

            ModeratedStat {
                gene_id: f.gene_id.clone(),
                estimate: estimates[i],
                ave_expr: f.amean,
                t: t[i],
                p_value,
                b: prior_log_odds - r.ln() / 2.0 + kernel,
                var_post: squeezed.var_post[i],
            }
        })
        .collect();

    log::info!(
        "Moderated t on {}: d0 = {:.2}, s0^2 = {:.4}, df = {:.2}",
        coefficient,
        squeezed.df_prior,
        squeezed.var_prior,
        df_total
    );

    Ok(ModeratedResult {
        results,
        coefficient: coefficient.to_string(),
        df_prior: squeezed.df_prior,
        var_prior: squeezed.var_prior,
        df_total,
        coef_var_prior,
        proportion,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LmFitSingle;
    use approx::assert_relative_eq;

    /// Fits with two coefficients; gene `i` has sigma `sigmas[i]`.
    fn synthetic_fit(estimates: &[f64], sigmas: &[f64]) -> LmFit {
        let su = (2.0f64 / 3.0).sqrt();
        LmFit {
            fits: estimates
                .iter()
                .zip(sigmas)
                .enumerate()
                .map(|(i, (b, s))| LmFitSingle {
                    gene_id: format!("g{}", i),
                    coefficients: vec![5.0, *b],
                    stdev_unscaled: vec![(1.0f64 / 3.0).sqrt(), su],
                    sigma: *s,
                    df_residual: 4,
                    amean: 5.0 + b / 2.0,
                })
                .collect(),
            coefficient_names: vec!["(Intercept)".into(), "age_groupfetal".into()],
            n_samples: 6,
        }
    }

    #[test]
    fn test_unknown_coefficient() {
        let fit = synthetic_fit(&[0.1, 0.2], &[0.3, 0.4]);
        assert!(test_moderated(&fit, "sex", 0.01).is_err());
        assert!(test_moderated(&fit, "age_groupfetal", 0.0).is_err());
    }

    #[test]
    fn test_infinite_prior_uses_common_variance() {
        // equal residual variances: d0 is infinite and every gene gets s0^2
        let estimates: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let sigmas = vec![0.5; 40];
        let result = test_moderated(&synthetic_fit(&estimates, &sigmas), "age_groupfetal", 0.01)
            .unwrap();

        assert!(result.df_prior.is_infinite());
        // capped at the pooled residual df
        assert_relative_eq!(result.df_total, 160.0);
        let su = (2.0f64 / 3.0).sqrt();
        let g10 = result.get_gene("g10").unwrap();
        assert_relative_eq!(g10.t, 1.0 / (su * result.var_prior.sqrt()), epsilon = 1e-8);
        assert_relative_eq!(g10.var_post, result.var_prior);
    }

    #[test]
    fn test_pvalues_and_log_odds_follow_t() {
        let estimates: Vec<f64> = (0..100)
            .map(|i| if i < 5 { 3.0 } else { ((i * 17) % 13) as f64 * 0.01 - 0.06 })
            .collect();
        let sigmas: Vec<f64> = (0..100).map(|i| 0.2 + ((i * 31) % 19) as f64 * 0.03).collect();
        let result = test_moderated(&synthetic_fit(&estimates, &sigmas), "age_groupfetal", 0.01)
            .unwrap();

        for r in &result.results {
            assert!(r.p_value >= 0.0 && r.p_value <= 1.0);
        }
        // larger |t| gives smaller p and larger B
        let mut by_t: Vec<&ModeratedStat> = result.results.iter().collect();
        by_t.sort_by(|a, b| b.t.abs().total_cmp(&a.t.abs()));
        for pair in by_t.windows(2) {
            assert!(pair[0].p_value <= pair[1].p_value + 1e-15);
            assert!(pair[0].b >= pair[1].b - 1e-9);
        }
        assert!(result.get_gene("g0").unwrap().b > 0.0);
    }

    #[test]
    fn test_large_t_keeps_positive_pvalues() {
        // strong effects in a large experiment: the tail probability is far
        // below machine epsilon but must not round to zero
        let estimates: Vec<f64> = (0..100).map(|i| if i < 3 { 20.0 + 2.5 * i as f64 } else { 0.0 }).collect();
        let sigmas = vec![0.65; 100];
        let result = test_moderated(&synthetic_fit(&estimates, &sigmas), "age_groupfetal", 0.01)
            .unwrap();

        let strong: Vec<&ModeratedStat> = result.results[..3].iter().collect();
        for r in &strong {
            assert!(r.t > 30.0, "t = {}", r.t);
            assert!(r.p_value > 0.0, "p underflowed for t = {}", r.t);
            assert!(r.p_value < 1e-15);
        }
        assert!(strong[0].p_value > strong[1].p_value);
        assert!(strong[1].p_value > strong[2].p_value);
    }

    #[test]
    fn test_moderation_shrinks_extreme_variances() {
        let estimates = vec![1.0; 60];
        let sigmas: Vec<f64> = (0..60).map(|i| 0.1 + (i % 12) as f64 * 0.15).collect();
        let fit = synthetic_fit(&estimates, &sigmas);
        let result = test_moderated(&fit, "age_groupfetal", 0.01).unwrap();

        // the smallest-variance gene gets a smaller |t| than its ordinary t
        let ordinary = fit.fits[0].t_statistic(1).unwrap();
        let moderated = result.results[0].t;
        assert!(moderated.abs() < ordinary.abs());
    }
}
