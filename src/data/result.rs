//! Result types for differential expression analysis.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Direction of a significant change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Regulation {
    Up,
    Down,
    Unchanged,
}

impl Regulation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Unchanged => "unchanged",
        }
    }
}

/// Result for a single gene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeResult {
    /// Gene identifier.
    pub gene_id: String,
    /// Gene symbol from the annotation (identifier when unknown).
    pub symbol: String,
    /// Estimated log2 fold change of the tested coefficient.
    pub log_fc: f64,
    /// Average log2 expression across all samples.
    pub ave_expr: f64,
    /// Moderated t-statistic.
    pub t: f64,
    /// Raw p-value.
    pub p_value: f64,
    /// Benjamini-Hochberg adjusted p-value.
    pub adj_p_value: f64,
    /// Log-odds that the gene is differentially expressed.
    pub b: f64,
}

impl DeResult {
    /// Check if this result is significant at a custom threshold.
    pub fn is_significant_at(&self, alpha: f64) -> bool {
        self.adj_p_value < alpha
    }

    pub fn regulation(&self, alpha: f64) -> Regulation {
        if !self.is_significant_at(alpha) {
            Regulation::Unchanged
        } else if self.log_fc > 0.0 {
            Regulation::Up
        } else {
            Regulation::Down
        }
    }
}

/// Ascending p-value, larger |t| first on ties; missing p-values last.
fn by_pvalue(a: &DeResult, b: &DeResult) -> Ordering {
    let p_order = match (a.p_value.is_nan(), b.p_value.is_nan()) {
        (false, true) => Ordering::Less,
        (true, false) => Ordering::Greater,
        _ => a.p_value.total_cmp(&b.p_value),
    };
    p_order.then_with(|| b.t.abs().total_cmp(&a.t.abs()))
}

/// Row of a results TSV, with limma-style column names.
#[derive(Debug, Deserialize)]
struct ResultRow {
    gene_id: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(rename = "logFC")]
    log_fc: f64,
    #[serde(rename = "AveExpr")]
    ave_expr: f64,
    t: f64,
    #[serde(rename = "P.Value")]
    p_value: f64,
    #[serde(rename = "adj.P.Val")]
    adj_p_value: f64,
    #[serde(rename = "B")]
    b: f64,
}

/// Collection of DE results for one coefficient.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeResultSet {
    /// Name of the tested coefficient (e.g. `age_groupfetal`).
    pub coefficient: String,
    /// Individual results for each gene.
    pub results: Vec<DeResult>,
}

impl DeResultSet {
    /// Create a new result set.
    pub fn new(coefficient: String, results: Vec<DeResult>) -> Self {
        Self {
            coefficient,
            results,
        }
    }

    /// Number of results.
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Get results sorted by p-value (ascending), ties by |t| descending.
    pub fn sorted_by_pvalue(&self) -> Vec<&DeResult> {
        let mut sorted: Vec<_> = self.results.iter().collect();
        sorted.sort_by(|a, b| by_pvalue(a, b));
        sorted
    }

    /// Reorder the results in place by p-value.
    pub fn sort_by_pvalue(&mut self) {
        self.results.sort_by(by_pvalue);
    }

    /// Get significant results at a custom threshold.
    pub fn significant_at(&self, alpha: f64) -> Vec<&DeResult> {
        self.results
            .iter()
            .filter(|r| r.is_significant_at(alpha))
            .collect()
    }

    /// Count significant results at a threshold, split by direction.
    pub fn summary(&self, alpha: f64) -> ResultSummary {
        let significant = self.significant_at(alpha);
        ResultSummary {
            total: self.len(),
            alpha,
            significant: significant.len(),
            up: significant.iter().filter(|r| r.log_fc > 0.0).count(),
            down: significant.iter().filter(|r| r.log_fc <= 0.0).count(),
        }
    }

    /// Write results to TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        // Header
        writeln!(writer, "gene_id\tsymbol\tlogFC\tAveExpr\tt\tP.Value\tadj.P.Val\tB")?;

        // Data rows
        for r in &self.results {
            writeln!(
                writer,
                "{}\t{}\t{:.6}\t{:.4}\t{:.4}\t{:.4e}\t{:.4e}\t{:.4}",
                r.gene_id, r.symbol, r.log_fc, r.ave_expr, r.t, r.p_value, r.adj_p_value, r.b
            )?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Read a table written by [`DeResultSet::to_tsv`].
    pub fn from_tsv<P: AsRef<Path>>(path: P, coefficient: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(path)?;
        let mut results = Vec::new();
        for row in reader.deserialize() {
            let row: ResultRow = row?;
            results.push(DeResult {
                gene_id: row.gene_id,
                symbol: row.symbol.unwrap_or_default(),
                log_fc: row.log_fc,
                ave_expr: row.ave_expr,
                t: row.t,
                p_value: row.p_value,
                adj_p_value: row.adj_p_value,
                b: row.b,
            });
        }
        Ok(Self::new(coefficient.to_string(), results))
    }

    /// Iterate over results.
    pub fn iter(&self) -> impl Iterator<Item = &DeResult> {
        self.results.iter()
    }
}

/// Summary statistics for a result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub alpha: f64,
    pub significant: usize,
    pub up: usize,
    pub down: usize,
}

impl std::fmt::Display for ResultSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Total genes tested: {}", self.total)?;
        writeln!(f, "Significant at adj.P < {}: {}", self.alpha, self.significant)?;
        writeln!(f, "  Up:   {}", self.up)?;
        writeln!(f, "  Down: {}", self.down)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, log_fc: f64, t: f64, p: f64, q: f64) -> DeResult {
        DeResult {
            gene_id: id.into(),
            symbol: id.into(),
            log_fc,
            ave_expr: 5.0,
            t,
            p_value: p,
            adj_p_value: q,
            b: 0.0,
        }
    }

    #[test]
    fn test_regulation() {
        assert_eq!(result("a", 2.0, 5.0, 1e-5, 0.01).regulation(0.05), Regulation::Up);
        assert_eq!(result("a", -2.0, -5.0, 1e-5, 0.01).regulation(0.05), Regulation::Down);
        assert_eq!(result("a", 2.0, 1.0, 0.2, 0.4).regulation(0.05), Regulation::Unchanged);
    }

    #[test]
    fn test_result_set_summary() {
        let set = DeResultSet::new(
            "age_groupfetal".into(),
            vec![
                result("g1", 3.0, 10.0, 0.0001, 0.0005),
                result("g2", -1.5, -5.0, 0.01, 0.02),
                result("g3", 0.2, 2.0, 0.1, 0.15),
                result("g4", 0.1, 1.0, 0.5, 0.6),
            ],
        );
        let summary = set.summary(0.05);

        assert_eq!(summary.total, 4);
        assert_eq!(summary.significant, 2);
        assert_eq!(summary.up, 1);
        assert_eq!(summary.down, 1);
    }

    #[test]
    fn test_sorted_by_pvalue() {
        let set = DeResultSet::new(
            "c".into(),
            vec![
                result("g1", 0.1, 1.0, 0.5, 0.6),
                result("g2", 1.0, 4.0, 0.001, 0.01),
                result("g3", 1.0, 6.0, 0.001, 0.01),
            ],
        );
        let ids: Vec<_> = set.sorted_by_pvalue().iter().map(|r| r.gene_id.as_str()).collect();
        assert_eq!(ids, vec!["g3", "g2", "g1"]);
    }

    #[test]
    fn test_sort_by_pvalue_puts_nan_last() {
        let mut set = DeResultSet::new(
            "c".into(),
            vec![
                result("g1", 0.0, f64::NAN, f64::NAN, f64::NAN),
                result("g2", 0.1, 1.0, 0.5, 0.6),
                result("g3", 1.0, 6.0, 0.001, 0.01),
                result("g4", 0.0, f64::NAN, f64::NAN, f64::NAN),
                result("g5", 1.0, 4.0, 0.02, 0.05),
            ],
        );
        set.sort_by_pvalue();
        let ids: Vec<_> = set.iter().map(|r| r.gene_id.as_str()).collect();
        assert_eq!(&ids[..3], &["g3", "g5", "g2"]);
        assert!(set.iter().skip(3).all(|r| r.p_value.is_nan()));
    }

    #[test]
    fn test_to_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("de.tsv");
        let set = DeResultSet::new("c".into(), vec![result("g1", 1.0, 4.0, 0.001, 0.01)]);
        set.to_tsv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("gene_id\tsymbol\tlogFC"));
        assert!(lines.next().unwrap().starts_with("g1\tg1\t1.000000"));

        let back = DeResultSet::from_tsv(&path, "c").unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back.results[0].symbol, "g1");
        assert!((back.results[0].adj_p_value - 0.01).abs() < 1e-9);
    }
}
