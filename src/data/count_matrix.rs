//! Gene-by-sample read count matrix with sparse storage.

use crate::error::{DgeError, Result};
use rayon::prelude::*;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Read counts for genes across samples.
///
/// Rows are genes, columns are samples. Stored in CSR format since every
/// downstream step (filtering, model fitting) walks the matrix gene by gene.
#[derive(Debug, Clone)]
pub struct CountMatrix {
    /// Sparse matrix in CSR format (genes × samples)
    data: CsMat<u64>,
    /// Gene identifiers (row names)
    gene_ids: Vec<String>,
    /// Sample identifiers (column names)
    sample_ids: Vec<String>,
}

impl CountMatrix {
    /// Create a new CountMatrix from a sparse matrix and identifiers.
    pub fn new(data: CsMat<u64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (nrows, ncols) = data.shape();
        if nrows != gene_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: nrows,
                actual: gene_ids.len(),
            });
        }
        if ncols != sample_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: ncols,
                actual: sample_ids.len(),
            });
        }
        Ok(Self {
            data,
            gene_ids,
            sample_ids,
        })
    }

    /// Build a matrix from one dense count column per sample.
    ///
    /// Every column must have one entry per gene, in `gene_ids` order.
    pub fn from_columns(
        gene_ids: Vec<String>,
        sample_ids: Vec<String>,
        columns: &[Vec<u64>],
    ) -> Result<Self> {
        if columns.len() != sample_ids.len() {
            return Err(DgeError::DimensionMismatch {
                expected: sample_ids.len(),
                actual: columns.len(),
            });
        }
        let mut tri_mat = TriMat::new((gene_ids.len(), sample_ids.len()));
        for (col, column) in columns.iter().enumerate() {
            if column.len() != gene_ids.len() {
                return Err(DgeError::DimensionMismatch {
                    expected: gene_ids.len(),
                    actual: column.len(),
                });
            }
            for (row, &value) in column.iter().enumerate() {
                if value > 0 {
                    tri_mat.add_triplet(row, col, value);
                }
            }
        }
        Self::new(tri_mat.to_csr(), gene_ids, sample_ids)
    }

    /// Load a count matrix from a TSV file.
    ///
    /// Expected format:
    /// - First row: header with sample IDs (first column is the gene ID header)
    /// - Subsequent rows: gene ID followed by counts
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DgeError::EmptyData("Empty count table".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DgeError::EmptyData(
                "Count table must have at least one sample column".to_string(),
            ));
        }
        let sample_ids: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();
        let n_samples = sample_ids.len();

        let mut triplets: Vec<(usize, usize, u64)> = Vec::new();
        let mut gene_ids: Vec<String> = Vec::new();

        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let row_idx = gene_ids.len();
            let fields: Vec<&str> = line.split('\t').collect();
            gene_ids.push(fields[0].to_string());

            if fields.len() - 1 != n_samples {
                return Err(DgeError::DimensionMismatch {
                    expected: n_samples,
                    actual: fields.len() - 1,
                });
            }

            for (col_idx, value_str) in fields[1..].iter().enumerate() {
                let value: u64 = value_str.trim().parse().map_err(|_| DgeError::InvalidCount {
                    value: value_str.to_string(),
                    row: row_idx,
                    col: col_idx,
                })?;
                if value > 0 {
                    triplets.push((row_idx, col_idx, value));
                }
            }
        }

        if gene_ids.is_empty() {
            return Err(DgeError::EmptyData("No genes in count table".to_string()));
        }

        let mut tri_mat = TriMat::new((gene_ids.len(), n_samples));
        for (row, col, val) in triplets {
            tri_mat.add_triplet(row, col, val);
        }

        Self::new(tri_mat.to_csr(), gene_ids, sample_ids)
    }

    /// Write the count matrix to a TSV file.
    pub fn to_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        write!(writer, "gene_id")?;
        for sample_id in &self.sample_ids {
            write!(writer, "\t{}", sample_id)?;
        }
        writeln!(writer)?;

        for (row_idx, gene_id) in self.gene_ids.iter().enumerate() {
            write!(writer, "{}", gene_id)?;
            for value in self.row_dense(row_idx) {
                write!(writer, "\t{}", value)?;
            }
            writeln!(writer)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Get the value at (row, col), returning 0 for missing entries.
    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u64 {
        self.data.get(row, col).copied().unwrap_or(0)
    }

    /// Number of genes (rows).
    #[inline]
    pub fn n_genes(&self) -> usize {
        self.data.rows()
    }

    /// Number of samples (columns).
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.cols()
    }

    /// Gene identifiers.
    #[inline]
    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    /// Sample identifiers.
    #[inline]
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Row index of a gene.
    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }

    /// Get a dense vector for a specific row (gene).
    pub fn row_dense(&self, row: usize) -> Vec<u64> {
        let mut dense = vec![0u64; self.n_samples()];
        if let Some(row_vec) = self.data.outer_view(row) {
            for (col, &val) in row_vec.iter() {
                dense[col] = val;
            }
        }
        dense
    }

    /// Get a dense vector for a specific column (sample).
    pub fn col_dense(&self, col: usize) -> Vec<u64> {
        (0..self.n_genes()).map(|row| self.get(row, col)).collect()
    }

    /// Total counts per gene.
    pub fn row_sums(&self) -> Vec<u64> {
        (0..self.n_genes())
            .into_par_iter()
            .map(|row| {
                self.data
                    .outer_view(row)
                    .map(|v| v.iter().map(|(_, &val)| val).sum())
                    .unwrap_or(0)
            })
            .collect()
    }

    /// Mean count per gene across samples.
    pub fn row_means(&self) -> Vec<f64> {
        let n = self.n_samples().max(1) as f64;
        self.row_sums().into_iter().map(|s| s as f64 / n).collect()
    }

    /// Library sizes (total counts per sample).
    pub fn col_sums(&self) -> Vec<u64> {
        let mut sums = vec![0u64; self.n_samples()];
        for row_vec in self.data.outer_iterator() {
            for (col, &val) in row_vec.iter() {
                sums[col] += val;
            }
        }
        sums
    }

    /// Replace the gene identifiers, keeping counts as they are.
    pub fn with_gene_ids(mut self, gene_ids: Vec<String>) -> Result<Self> {
        if gene_ids.len() != self.n_genes() {
            return Err(DgeError::DimensionMismatch {
                expected: self.n_genes(),
                actual: gene_ids.len(),
            });
        }
        self.gene_ids = gene_ids;
        Ok(self)
    }

    /// Subset the matrix to the given gene rows, in the given order.
    pub fn subset_genes(&self, indices: &[usize]) -> Result<Self> {
        let n_samples = self.n_samples();
        let mut tri_mat = TriMat::new((indices.len(), n_samples));
        let mut new_gene_ids = Vec::with_capacity(indices.len());

        for (new_row, &old_row) in indices.iter().enumerate() {
            if old_row >= self.n_genes() {
                return Err(DgeError::InvalidParameter(format!(
                    "Gene index {} out of bounds",
                    old_row
                )));
            }
            new_gene_ids.push(self.gene_ids[old_row].clone());

            if let Some(row_vec) = self.data.outer_view(old_row) {
                for (col, &val) in row_vec.iter() {
                    tri_mat.add_triplet(new_row, col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), new_gene_ids, self.sample_ids.clone())
    }

    /// Subset the matrix to the given sample columns, in the given order.
    pub fn subset_samples(&self, indices: &[usize]) -> Result<Self> {
        let mut new_sample_ids = Vec::with_capacity(indices.len());
        for &old_col in indices {
            if old_col >= self.n_samples() {
                return Err(DgeError::InvalidParameter(format!(
                    "Sample index {} out of bounds",
                    old_col
                )));
            }
            new_sample_ids.push(self.sample_ids[old_col].clone());
        }

        let col_map: HashMap<usize, usize> = indices
            .iter()
            .enumerate()
            .map(|(new_idx, &old_idx)| (old_idx, new_idx))
            .collect();

        let mut tri_mat = TriMat::new((self.n_genes(), indices.len()));
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (old_col, &val) in row_vec.iter() {
                if let Some(&new_col) = col_map.get(&old_col) {
                    tri_mat.add_triplet(row, new_col, val);
                }
            }
        }

        Self::new(tri_mat.to_csr(), self.gene_ids.clone(), new_sample_ids)
    }

    /// Convert to a dense matrix (f64).
    pub fn to_dense(&self) -> nalgebra::DMatrix<f64> {
        let mut dense = nalgebra::DMatrix::zeros(self.n_genes(), self.n_samples());
        for (row, row_vec) in self.data.outer_iterator().enumerate() {
            for (col, &val) in row_vec.iter() {
                dense[(row, col)] = val as f64;
            }
        }
        dense
    }
}
