//! Empirical Bayes moderation of gene-wise variances.
//!
//! Residual variances are modelled as scaled chi-square draws around a
//! common prior `s0^2` with `d0` prior degrees of freedom. The prior is
//! estimated by matching the first two moments of the log variances, and
//! each gene's variance is shrunk towards it:
//!
//! ```text
//! s2_post = (d0 * s0^2 + df * s2) / (d0 + df)
//! ```

use crate::error::{DgeError, Result};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, StudentsT};
use statrs::function::gamma::digamma;

/// Prior degrees of freedom above this are treated as infinite.
pub const D0_INFINITE: f64 = 1e6;

/// Fitted variance prior and posterior variances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SqueezedVar {
    /// Prior degrees of freedom; `f64::INFINITY` when the variances are
    /// no more dispersed than sampling error explains.
    pub df_prior: f64,
    /// Prior variance `s0^2`.
    pub var_prior: f64,
    /// Posterior variance per gene.
    pub var_post: Vec<f64>,
}

impl SqueezedVar {
    pub fn is_df_infinite(&self) -> bool {
        self.df_prior > D0_INFINITE
    }
}

/// Trigamma function `psi'(x)` for `x > 0`.
pub fn trigamma(x: f64) -> f64 {
    if x <= 0.0 || !x.is_finite() {
        return f64::NAN;
    }
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc += 1.0 / (x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc + 1.0 / x
        + x2 / 2.0
        + x2 / x * (1.0 / 6.0 - x2 * (1.0 / 30.0 - x2 * (1.0 / 42.0 - x2 / 30.0)))
}

/// Tetragamma function `psi''(x)` for `x > 0`.
fn tetragamma(x: f64) -> f64 {
    let mut x = x;
    let mut acc = 0.0;
    while x < 10.0 {
        acc -= 2.0 / (x * x * x);
        x += 1.0;
    }
    let x2 = 1.0 / (x * x);
    acc - x2 - x2 / x - x2 * x2 * (0.5 - x2 * (1.0 / 6.0 - x2 * (1.0 / 6.0 - x2 * 0.3)))
}

/// Solve `trigamma(y) = x` for `y` by Newton iteration.
pub fn trigamma_inverse(x: f64) -> Result<f64> {
    if x <= 0.0 || !x.is_finite() {
        return Err(DgeError::Numerical(format!(
            "trigamma inverse needs a positive finite argument, got {}",
            x
        )));
    }
    if x > 1e7 {
        return Ok(1.0 / x.sqrt());
    }
    if x < 1e-6 {
        return Ok(1.0 / x);
    }

    // 1/trigamma is close to linear, so Newton on it converges fast
    let mut y = 0.5 + 1.0 / x;
    for _ in 0..50 {
        let tri = trigamma(y);
        let dif = tri * (1.0 - tri / x) / tetragamma(y);
        y += dif;
        if -dif / y < 1e-8 {
            return Ok(y);
        }
    }
    log::warn!("trigamma inverse did not converge for x = {}", x);
    Ok(y)
}

/// Fit the variance prior and return posterior variances.
///
/// Variances are offset away from zero by `1e-5` times their median so that
/// genes with identical values in every sample do not send the log
/// variance to minus infinity.
pub fn squeeze_var(var: &[f64], df: f64) -> Result<SqueezedVar> {
    let n = var.len();
    if n < 2 {
        return Err(DgeError::InvalidParameter(
            "Need at least 2 genes to estimate a variance prior".to_string(),
        ));
    }
    if df <= 0.0 || df.is_nan() {
        return Err(DgeError::InvalidParameter(
            "Residual degrees of freedom must be positive".to_string(),
        ));
    }

    let mut floored: Vec<f64> = var.iter().map(|v| v.max(0.0)).collect();
    let mut sorted = floored.clone();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mut median = if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    };
    if median == 0.0 {
        log::warn!("More than half of residual variances are exactly zero: moderation unreliable");
        median = 1.0;
    } else if floored.iter().any(|&v| v == 0.0) {
        log::warn!("Zero sample variances detected, offset away from zero");
    }
    floored.iter_mut().for_each(|v| *v = v.max(1e-5 * median));

    let half_df = df / 2.0;
    let e: Vec<f64> = floored
        .iter()
        .map(|v| v.ln() - digamma(half_df) + half_df.ln())
        .collect();
    let emean = e.iter().sum::<f64>() / n as f64;
    let evar = e.iter().map(|x| (x - emean).powi(2)).sum::<f64>() / (n - 1) as f64
        - trigamma(half_df);

    let (df_prior, var_prior) = if evar > 0.0 {
        let d0 = 2.0 * trigamma_inverse(evar)?;
        (d0, (emean + digamma(d0 / 2.0) - (d0 / 2.0).ln()).exp())
    } else {
        (f64::INFINITY, emean.exp())
    };

    let var_post = if df_prior > D0_INFINITE {
        vec![var_prior; n]
    } else {
        var.iter()
            .map(|v| (df_prior * var_prior + df * v) / (df_prior + df))
            .collect()
    };

    log::debug!("Variance prior: d0 = {:.3}, s0^2 = {:.5}", df_prior, var_prior);

    Ok(SqueezedVar {
        df_prior,
        var_prior,
        var_post,
    })
}

/// Prior variance of a non-zero coefficient from the top `proportion` of
/// moderated t-statistics.
///
/// Each of the largest `|t|` is matched to the quantile it would occupy
/// in a mixture of null and alternative genes; the implied coefficient
/// variances are bounded to `[lim.0, lim.1]` and averaged.
pub fn tmixture(
    t: &[f64],
    stdev_unscaled: &[f64],
    df: f64,
    proportion: f64,
    lim: (f64, f64),
) -> Result<Option<f64>> {
    let n = t.len();
    let n_target = (proportion / 2.0 * n as f64).ceil() as usize;
    if n_target < 1 || n == 0 {
        return Ok(None);
    }
    let p = (n_target as f64 / n as f64).max(proportion);

    let dist = StudentsT::new(0.0, 1.0, df)
        .map_err(|e| DgeError::Numerical(format!("Invalid t distribution: {}", e)))?;

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| t[b].abs().total_cmp(&t[a].abs()));

    let mut sum = 0.0;
    for (r, &i) in order.iter().take(n_target).enumerate() {
        let tstat = t[i].abs();
        let v1 = stdev_unscaled[i] * stdev_unscaled[i];
        let p0 = 2.0 * (1.0 - dist.cdf(tstat));
        let p_target = ((r as f64 + 0.5) / n as f64 - (1.0 - p) * p0) / p;
        let mut v0 = 0.0;
        if p_target > p0 {
            let q_target = dist.inverse_cdf(1.0 - p_target / 2.0);
            v0 = v1 * ((tstat / q_target).powi(2) - 1.0);
        }
        sum += v0.clamp(lim.0, lim.1);
    }
    Ok(Some(sum / n_target as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_trigamma_known_values() {
        // psi'(1) = pi^2 / 6, psi'(1/2) = pi^2 / 2
        let pi2 = std::f64::consts::PI.powi(2);
        assert_relative_eq!(trigamma(1.0), pi2 / 6.0, epsilon = 1e-9);
        assert_relative_eq!(trigamma(0.5), pi2 / 2.0, epsilon = 1e-9);
        assert_relative_eq!(trigamma(10.0), 0.10516633568168575, epsilon = 1e-10);
    }

    #[test]
    fn test_tetragamma_matches_difference() {
        for &x in &[0.7, 2.0, 8.5] {
            let h = 1e-5;
            let numeric = (trigamma(x + h) - trigamma(x - h)) / (2.0 * h);
            assert_relative_eq!(tetragamma(x), numeric, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_trigamma_inverse_round_trip() {
        for &y in &[0.3, 1.0, 4.0, 25.0, 300.0] {
            let x = trigamma(y);
            assert_relative_eq!(trigamma_inverse(x).unwrap(), y, max_relative = 1e-6);
        }
        assert!(trigamma_inverse(0.0).is_err());
    }

    #[test]
    fn test_squeeze_var_shrinks_towards_prior() {
        // dispersed variances: log-scale spread well above chi-square noise
        let var: Vec<f64> = (0..200)
            .map(|i| 0.05 * (1.0 + ((i * 37) % 100) as f64 / 10.0).powi(2))
            .collect();
        let sq = squeeze_var(&var, 4.0).unwrap();
        assert!(sq.df_prior.is_finite());
        assert!(sq.df_prior > 0.0);
        for (v, post) in var.iter().zip(&sq.var_post) {
            // posterior lies between the gene variance and the prior
            let (lo, hi) = if *v < sq.var_prior {
                (*v, sq.var_prior)
            } else {
                (sq.var_prior, *v)
            };
            assert!(*post >= lo - 1e-12 && *post <= hi + 1e-12);
        }
    }

    #[test]
    fn test_squeeze_var_identical_variances() {
        // no dispersion beyond sampling error: infinite prior df
        let var = vec![0.2; 50];
        let sq = squeeze_var(&var, 4.0).unwrap();
        assert!(sq.is_df_infinite());
        assert!(sq.var_post.iter().all(|v| (v - sq.var_prior).abs() < 1e-12));
    }

    #[test]
    fn test_squeeze_var_too_few_genes() {
        assert!(squeeze_var(&[0.1], 3.0).is_err());
    }

    #[test]
    fn test_tmixture_bounds() {
        let t: Vec<f64> = (0..100).map(|i| if i < 5 { 12.0 } else { 0.1 * i as f64 / 100.0 }).collect();
        let su = vec![0.6; 100];
        let v0 = tmixture(&t, &su, 10.0, 0.01, (0.5, 40.0)).unwrap().unwrap();
        assert!(v0 >= 0.5 && v0 <= 40.0);
        assert!(tmixture(&[], &[], 10.0, 0.01, (0.5, 40.0)).unwrap().is_none());
    }
}
