//! Log-scale expression values.

use crate::data::CountMatrix;
use crate::error::{DgeError, Result};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Log-scale expression (genes × samples) with the transformation applied.
#[derive(Debug, Clone)]
pub struct ExpressionMatrix {
    /// The transformed data (genes × samples).
    pub data: DMatrix<f64>,
    /// Gene identifiers.
    pub gene_ids: Vec<String>,
    /// Sample identifiers.
    pub sample_ids: Vec<String>,
    /// Name of the transformation applied.
    pub transformation: String,
}

impl ExpressionMatrix {
    pub fn new(
        data: DMatrix<f64>,
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        transformation: impl Into<String>,
    ) -> Result<Self> {
        if data.nrows() != gene_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: data.nrows(),
                actual: gene_ids.len(),
            });
        }
        if data.ncols() != sample_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: data.ncols(),
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
            transformation: transformation.into(),
        })
    }

    /// Get the value for a gene and sample.
    pub fn get(&self, gene: usize, sample: usize) -> f64 {
        self.data[(gene, sample)]
    }

    pub fn n_genes(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_samples(&self) -> usize {
        self.data.ncols()
    }

    /// Get a row (gene) as a vector.
    pub fn row(&self, gene: usize) -> Vec<f64> {
        self.data.row(gene).iter().cloned().collect()
    }

    /// Get a column (sample) as a vector.
    pub fn col(&self, sample: usize) -> Vec<f64> {
        self.data.column(sample).iter().cloned().collect()
    }

    /// Get reference to the underlying matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.data
    }

    /// Mean expression per gene.
    pub fn row_means(&self) -> Vec<f64> {
        (0..self.n_genes())
            .map(|i| self.data.row(i).mean())
            .collect()
    }

    /// Write as a tab-separated table with a `gene_id` header column.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;
        for (i, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for j in 0..self.n_samples() {
                write!(writer, "\t{:.4}", self.data[(i, j)])?;
            }
            writeln!(writer)?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn from_columns(
    counts: &CountMatrix,
    columns: Vec<Vec<f64>>,
    transformation: String,
) -> Result<ExpressionMatrix> {
    let mut data = DMatrix::zeros(counts.n_genes(), counts.n_samples());
    for (j, col) in columns.iter().enumerate() {
        for (i, &val) in col.iter().enumerate() {
            data[(i, j)] = val;
        }
    }
    ExpressionMatrix::new(
        data,
        counts.gene_ids().to_vec(),
        counts.sample_ids().to_vec(),
        transformation,
    )
}

/// `log2(count + prior)`.
pub fn log2_counts(counts: &CountMatrix, prior: f64) -> Result<ExpressionMatrix> {
    if prior <= 0.0 {
        return Err(DgeError::InvalidParameter(
            "prior count must be positive".to_string(),
        ));
    }
    let columns: Vec<Vec<f64>> = (0..counts.n_samples())
        .into_par_iter()
        .map(|j| {
            counts
                .col_dense(j)
                .into_iter()
                .map(|c| (c as f64 + prior).log2())
                .collect()
        })
        .collect();
    from_columns(counts, columns, format!("log2(count + {})", prior))
}

/// Log2 counts per million on normalized library sizes:
/// `log2((count + prior) / (lib * factor + 2 * prior) * 1e6)`.
///
/// With `prior = 0.5` this is the voom transformation.
pub fn log_cpm(counts: &CountMatrix, norm_factors: &[f64], prior: f64) -> Result<ExpressionMatrix> {
    if norm_factors.len() != counts.n_samples() {
        return Err(DgeError::DimensionMismatch {
            expected: counts.n_samples(),
            actual: norm_factors.len(),
        });
    }
    if prior <= 0.0 {
        return Err(DgeError::InvalidParameter(
            "prior count must be positive".to_string(),
        ));
    }
    let lib_sizes = counts.col_sums();
    let columns: Vec<Vec<f64>> = (0..counts.n_samples())
        .into_par_iter()
        .map(|j| {
            let eff_lib = lib_sizes[j] as f64 * norm_factors[j] + 2.0 * prior;
            counts
                .col_dense(j)
                .into_iter()
                .map(|c| ((c as f64 + prior) / eff_lib * 1e6).log2())
                .collect()
        })
        .collect();
    from_columns(counts, columns, "logCPM".to_string())
}
