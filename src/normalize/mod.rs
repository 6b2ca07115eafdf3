//! Normalization of raw counts to log-scale expression.
//!
//! - **log2**: `log2(count + prior)`, used for exploratory plots
//! - **TMM**: trimmed mean of M-values scaling factors (edgeR)
//! - **logCPM**: log counts per million on TMM-scaled library sizes, the
//!   input to the linear model

pub mod tmm;
pub mod transform;

pub use transform::{log2_counts, log_cpm, ExpressionMatrix};
pub use tmm::{tmm_factors, tmm_factors_with_config, TmmConfig, TmmFactors};

use crate::data::CountMatrix;
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Normalization options for the model input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Use TMM factors; plain library sizes otherwise.
    pub tmm: bool,
    pub tmm_config: TmmConfig,
    /// Prior count for logCPM.
    pub prior_count: f64,
    /// Prior count for the exploratory log2 transform.
    pub explore_prior: f64,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            tmm: true,
            tmm_config: TmmConfig::default(),
            prior_count: 0.5,
            explore_prior: 1.0,
        }
    }
}

/// logCPM under the configured normalization, with the factors used.
pub fn normalize(counts: &CountMatrix, config: &NormalizeConfig) -> Result<(ExpressionMatrix, Vec<f64>)> {
    let factors = if config.tmm {
        tmm_factors_with_config(counts, &config.tmm_config)?.norm_factors
    } else {
        vec![1.0; counts.n_samples()]
    };
    let expr = log_cpm(counts, &factors, config.prior_count)?;
    Ok((expr, factors))
}
