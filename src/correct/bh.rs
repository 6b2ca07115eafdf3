//! Benjamini-Hochberg false discovery rate correction.

use crate::data::{DeResult, DeResultSet};
use crate::error::{DgeError, Result};
use crate::test::ModeratedResult;
use serde::{Deserialize, Serialize};

/// Result of BH correction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BhCorrected {
    /// Gene IDs in original order.
    pub gene_ids: Vec<String>,
    pub p_values: Vec<f64>,
    /// Adjusted p-values, in the same order.
    pub adj_p_values: Vec<f64>,
    /// Number of non-missing p-values.
    pub n_tests: usize,
}

impl BhCorrected {
    pub fn get_adjusted(&self, gene_id: &str) -> Option<f64> {
        let idx = self.gene_ids.iter().position(|g| g == gene_id)?;
        self.adj_p_values.get(idx).copied()
    }
}

/// Benjamini-Hochberg adjusted p-values.
///
/// `adj[i] = min over j with p[j] >= p[i] of p[j] * n / rank[j]`, capped at 1.
/// Missing (NaN) p-values are left out of `n` and stay NaN.
pub fn correct_bh(p_values: &[f64], gene_ids: &[String]) -> BhCorrected {
    let mut indices: Vec<usize> = (0..p_values.len())
        .filter(|&i| !p_values[i].is_nan())
        .collect();
    let n = indices.len();
    let mut adj_p_values = vec![f64::NAN; p_values.len()];

    if n > 0 {
        indices.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
        let n_f64 = n as f64;

        // Start from the largest p-value and work backwards
        let mut running = 1.0f64;
        for rank in (1..=n).rev() {
            let idx = indices[rank - 1];
            let adjusted = p_values[idx] * n_f64 / rank as f64;
            running = running.min(adjusted);
            adj_p_values[idx] = running.min(1.0);
        }
    }

    BhCorrected {
        gene_ids: gene_ids.to_vec(),
        p_values: p_values.to_vec(),
        adj_p_values,
        n_tests: n,
    }
}

/// BH correction of moderated test p-values.
pub fn correct_bh_moderated(moderated: &ModeratedResult) -> BhCorrected {
    let gene_ids: Vec<String> = moderated.gene_ids().iter().map(|s| s.to_string()).collect();
    correct_bh(&moderated.p_values(), &gene_ids)
}

/// Combine moderated statistics, adjusted p-values and gene symbols into a
/// result table ranked by p-value.
///
/// `symbols` runs parallel to the tested genes; an empty slice leaves the
/// symbol column blank.
pub fn create_results(
    moderated: &ModeratedResult,
    bh: &BhCorrected,
    symbols: &[String],
) -> Result<DeResultSet> {
    if bh.adj_p_values.len() != moderated.len() {
        return Err(DgeError::DimensionMismatch {
            expected: moderated.len(),
            actual: bh.adj_p_values.len(),
        });
    }
    if !symbols.is_empty() && symbols.len() != moderated.len() {
        return Err(DgeError::DimensionMismatch {
            expected: moderated.len(),
            actual: symbols.len(),
        });
    }

    let results: Vec<DeResult> = moderated
        .results
        .iter()
        .enumerate()
        .map(|(i, m)| DeResult {
            gene_id: m.gene_id.clone(),
            symbol: symbols.get(i).cloned().unwrap_or_default(),
            log_fc: m.estimate,
            ave_expr: m.ave_expr,
            t: m.t,
            p_value: m.p_value,
            adj_p_value: bh.adj_p_values[i],
            b: m.b,
        })
        .collect();

    let mut set = DeResultSet::new(moderated.coefficient.clone(), results);
    set.sort_by_pvalue();
    Ok(set)
}
