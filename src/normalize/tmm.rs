//! Trimmed Mean of M-values (TMM) normalization factors.
//!
//! TMM is the edgeR method for scaling library sizes so that the bulk of
//! genes show no change between samples. It is robust to a subset of highly
//! expressed genes dominating one sample, which is common when comparing
//! tissues at different developmental stages.
//!
//! # Algorithm
//!
//! 1. Select a reference sample: the one whose upper-quartile proportion is
//!    closest to the mean upper quartile.
//! 2. For each sample, compute per-gene M-values (log-ratios against the
//!    reference) and A-values (average log expression).
//! 3. Drop genes in the extreme 30% of M or the extreme 5% of A (both ranked
//!    on the full gene set).
//! 4. The factor is 2 to the precision-weighted mean M of the kept genes.
//! 5. Factors are rescaled to have geometric mean 1.
//!
//! # Reference
//!
//! Robinson MD, Oshlack A. A scaling normalization method for differential
//! expression analysis of RNA-seq data. Genome Biology 11, R25 (2010).

use crate::data::CountMatrix;
use crate::error::{DgeError, Result};
use log::debug;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for TMM normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TmmConfig {
    /// Fraction of M-values to trim from each tail (default: 0.30).
    pub trim_m: f64,
    /// Fraction of A-values to trim from each tail (default: 0.05).
    pub trim_a: f64,
    /// Reference sample index (None = auto-select).
    pub reference_sample: Option<usize>,
}

impl Default for TmmConfig {
    fn default() -> Self {
        Self {
            trim_m: 0.30,
            trim_a: 0.05,
            reference_sample: None,
        }
    }
}

/// TMM scaling of one experiment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TmmFactors {
    /// Normalization factor per sample (geometric mean 1).
    pub norm_factors: Vec<f64>,
    /// Raw library sizes.
    pub library_sizes: Vec<u64>,
    /// Effective library sizes (library_size * norm_factor).
    pub effective_lib_sizes: Vec<f64>,
    /// Index of the reference sample used.
    pub reference_sample: usize,
}

/// Compute TMM factors with default parameters.
pub fn tmm_factors(counts: &CountMatrix) -> Result<TmmFactors> {
    tmm_factors_with_config(counts, &TmmConfig::default())
}

/// Compute TMM factors with custom configuration.
pub fn tmm_factors_with_config(counts: &CountMatrix, config: &TmmConfig) -> Result<TmmFactors> {
    let n_genes = counts.n_genes();
    let n_samples = counts.n_samples();

    if n_genes == 0 || n_samples == 0 {
        return Err(DgeError::EmptyData(
            "Cannot apply TMM to empty matrix".to_string(),
        ));
    }

    if config.trim_m < 0.0 || config.trim_m >= 0.5 {
        return Err(DgeError::InvalidParameter(
            "trim_m must be in [0, 0.5)".to_string(),
        ));
    }

    if config.trim_a < 0.0 || config.trim_a >= 0.5 {
        return Err(DgeError::InvalidParameter(
            "trim_a must be in [0, 0.5)".to_string(),
        ));
    }

    let library_sizes = counts.col_sums();
    for (j, &lib_size) in library_sizes.iter().enumerate() {
        if lib_size == 0 {
            return Err(DgeError::Numerical(format!(
                "Sample {} has zero total counts",
                counts.sample_ids()[j]
            )));
        }
    }

    let columns: Vec<Vec<u64>> = (0..n_samples).map(|j| counts.col_dense(j)).collect();

    let ref_idx = match config.reference_sample {
        Some(idx) => idx,
        None => select_reference_sample(&columns, &library_sizes),
    };
    if ref_idx >= n_samples {
        return Err(DgeError::InvalidParameter(format!(
            "Reference sample index {} out of bounds (n_samples = {})",
            ref_idx, n_samples
        )));
    }
    debug!("TMM reference sample: {}", counts.sample_ids()[ref_idx]);

    let raw: Vec<f64> = (0..n_samples)
        .into_par_iter()
        .map(|j| {
            sample_factor(
                &columns[j],
                &columns[ref_idx],
                library_sizes[j] as f64,
                library_sizes[ref_idx] as f64,
                config,
            )
        })
        .collect();

    // Rescale to geometric mean one
    let log_mean = raw.iter().map(|f| f.ln()).sum::<f64>() / n_samples as f64;
    let norm_factors: Vec<f64> = raw.iter().map(|f| f / log_mean.exp()).collect();

    let effective_lib_sizes = library_sizes
        .iter()
        .zip(&norm_factors)
        .map(|(&lib, &factor)| lib as f64 * factor)
        .collect();

    Ok(TmmFactors {
        norm_factors,
        library_sizes,
        effective_lib_sizes,
        reference_sample: ref_idx,
    })
}

/// Type-7 quantile of unsorted data.
fn quantile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let h = (values.len() - 1) as f64 * p;
    let lo = h.floor() as usize;
    let hi = h.ceil() as usize;
    values[lo] + (h - lo as f64) * (values[hi] - values[lo])
}

/// Reference = sample whose upper-quartile proportion is closest to the mean.
fn select_reference_sample(columns: &[Vec<u64>], library_sizes: &[u64]) -> usize {
    let upper_quartiles: Vec<f64> = columns
        .iter()
        .zip(library_sizes)
        .map(|(col, &lib)| {
            let mut props: Vec<f64> = col.iter().map(|&c| c as f64 / lib as f64).collect();
            quantile(&mut props, 0.75)
        })
        .collect();

    let mean_uq = upper_quartiles.iter().sum::<f64>() / upper_quartiles.len() as f64;

    upper_quartiles
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (*a - mean_uq).abs().total_cmp(&(*b - mean_uq).abs()))
        .map(|(idx, _)| idx)
        .unwrap_or(0)
}

/// Ranks starting at 1, ties get their average rank.
fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }
    ranks
}

/// Unscaled TMM factor of `obs` against `reference`.
fn sample_factor(obs: &[u64], reference: &[u64], n_obs: f64, n_ref: f64, config: &TmmConfig) -> f64 {
    // (M, A, variance) for genes expressed in both samples
    let mut m_values = Vec::new();
    let mut a_values = Vec::new();
    let mut variances = Vec::new();

    for (&o, &r) in obs.iter().zip(reference) {
        if o == 0 || r == 0 {
            continue;
        }
        let (o, r) = (o as f64, r as f64);
        let log_o = (o / n_obs).log2();
        let log_r = (r / n_ref).log2();
        m_values.push(log_o - log_r);
        a_values.push(0.5 * (log_o + log_r));
        variances.push((n_obs - o) / n_obs / o + (n_ref - r) / n_ref / r);
    }

    if m_values.is_empty() || m_values.iter().all(|m| m.abs() < 1e-6) {
        return 1.0;
    }

    let n = m_values.len() as f64;
    let lo_m = (n * config.trim_m).floor() + 1.0;
    let hi_m = n + 1.0 - lo_m;
    let lo_a = (n * config.trim_a).floor() + 1.0;
    let hi_a = n + 1.0 - lo_a;

    let rank_m = average_ranks(&m_values);
    let rank_a = average_ranks(&a_values);

    let mut weighted = 0.0;
    let mut weights = 0.0;
    for i in 0..m_values.len() {
        let keep = rank_m[i] >= lo_m && rank_m[i] <= hi_m && rank_a[i] >= lo_a && rank_a[i] <= hi_a;
        if keep && variances[i] > 0.0 {
            weighted += m_values[i] / variances[i];
            weights += 1.0 / variances[i];
        }
    }

    if weights <= 0.0 {
        return 1.0;
    }
    2.0_f64.powf(weighted / weights)
}
