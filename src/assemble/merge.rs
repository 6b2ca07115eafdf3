//! Merging per-sample count files into one matrix.

use crate::count::SampleCounts;
use crate::data::gtf::open_text;
use crate::data::CountMatrix;
use crate::error::{DgeError, Result};
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Read one per-sample count file.
///
/// Accepts two-column `gene_id<TAB>count` files (with or without header),
/// featureCounts output (comment line, `Geneid Chr Start End Strand Length
/// <count>` header) and htseq-count output, whose `__`-prefixed summary lines
/// are skipped.
pub fn read_sample_counts<P: AsRef<Path>>(path: P) -> Result<(Vec<String>, Vec<u64>)> {
    let source = path.as_ref().display().to_string();
    let reader = open_text(&path)?;

    let mut gene_ids = Vec::new();
    let mut counts = Vec::new();
    let mut count_col: Option<usize> = None;

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = i + 1;
        if line.trim().is_empty() || line.starts_with('#') || line.starts_with("__") {
            continue;
        }
        let fields: Vec<&str> = line.split('\t').collect();

        let col = match count_col {
            Some(col) => col,
            None => {
                // First data-bearing line decides the layout.
                let col = if fields[0] == "Geneid" && fields.len() >= 7 {
                    6
                } else {
                    1
                };
                count_col = Some(col);
                let named = matches!(fields[0].trim(), "gene_id" | "Geneid" | "gene");
                if named || (fields.len() > col && fields[col].trim().parse::<u64>().is_err()) {
                    debug!("{}: header '{}'", source, line);
                    continue;
                }
                col
            }
        };

        let raw = fields.get(col).ok_or_else(|| {
            DgeError::parse(
                &source,
                line_no,
                format!("expected at least {} columns, found {}", col + 1, fields.len()),
            )
        })?;
        let value: u64 = raw.trim().parse().map_err(|_| DgeError::InvalidCount {
            value: raw.to_string(),
            row: line_no,
            col: col + 1,
        })?;
        gene_ids.push(fields[0].trim().to_string());
        counts.push(value);
    }

    if gene_ids.is_empty() {
        return Err(DgeError::EmptyData(format!("No counts in {}", source)));
    }
    Ok((gene_ids, counts))
}

/// Combine `(sample_id, gene_ids, counts)` columns, requiring identical gene
/// sets. Rows follow the first sample's gene order.
fn combine(columns: Vec<(String, Vec<String>, Vec<u64>)>) -> Result<CountMatrix> {
    let Some((_, reference_ids, _)) = columns.first() else {
        return Err(DgeError::EmptyData("No samples to merge".to_string()));
    };
    let reference_ids = reference_ids.clone();
    let reference_pos: HashMap<&str, usize> = reference_ids
        .iter()
        .enumerate()
        .map(|(i, g)| (g.as_str(), i))
        .collect();
    if reference_pos.len() != reference_ids.len() {
        return Err(DgeError::GeneMismatch(format!(
            "Duplicate gene identifiers in sample '{}'",
            columns[0].0
        )));
    }

    let mut seen_samples = HashSet::new();
    let mut sample_ids = Vec::with_capacity(columns.len());
    let mut dense = Vec::with_capacity(columns.len());

    for (sample_id, gene_ids, counts) in columns {
        if !seen_samples.insert(sample_id.clone()) {
            return Err(DgeError::SampleMismatch(format!(
                "Sample '{}' given more than once",
                sample_id
            )));
        }
        if gene_ids.len() != reference_ids.len() {
            return Err(DgeError::SampleMismatch(format!(
                "Sample '{}' lists {} genes, expected {}",
                sample_id,
                gene_ids.len(),
                reference_ids.len()
            )));
        }
        let mut column = vec![0u64; reference_ids.len()];
        let mut filled = vec![false; reference_ids.len()];
        for (gene_id, count) in gene_ids.iter().zip(counts) {
            let pos = *reference_pos.get(gene_id.as_str()).ok_or_else(|| {
                DgeError::SampleMismatch(format!(
                    "Gene '{}' of sample '{}' missing from other samples",
                    gene_id, sample_id
                ))
            })?;
            if filled[pos] {
                return Err(DgeError::GeneMismatch(format!(
                    "Gene '{}' listed twice in sample '{}'",
                    gene_id, sample_id
                )));
            }
            filled[pos] = true;
            column[pos] = count;
        }
        sample_ids.push(sample_id);
        dense.push(column);
    }

    CountMatrix::from_columns(reference_ids, sample_ids, &dense)
}

/// Merge per-sample count files, one `(sample_id, path)` per sample.
///
/// Every file must list the same genes; order may differ.
pub fn merge_sample_counts(inputs: &[(String, PathBuf)]) -> Result<CountMatrix> {
    let mut columns = Vec::with_capacity(inputs.len());
    for (sample_id, path) in inputs {
        let (gene_ids, counts) = read_sample_counts(path)?;
        debug!("{}: {} genes from {}", sample_id, gene_ids.len(), path.display());
        columns.push((sample_id.clone(), gene_ids, counts));
    }
    let merged = combine(columns)?;
    info!(
        "Merged {} samples x {} genes",
        merged.n_samples(),
        merged.n_genes()
    );
    Ok(merged)
}

/// Merge in-memory counting results.
pub fn merge_counts(samples: Vec<SampleCounts>) -> Result<CountMatrix> {
    combine(
        samples
            .into_iter()
            .map(|s| (s.sample_id, s.gene_ids, s.counts))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_two_column_with_and_without_header() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let b = dir.path().join("b.tsv");
        fs::write(&a, "gene_id\tA\ng1\t5\ng2\t0\ng3\t7\n").unwrap();
        fs::write(&b, "g3\t1\ng1\t2\ng2\t9\n__no_feature\t100\n").unwrap();

        let merged =
            merge_sample_counts(&[("A".to_string(), a), ("B".to_string(), b)]).unwrap();
        assert_eq!(merged.gene_ids(), &["g1", "g2", "g3"]);
        assert_eq!(merged.sample_ids(), &["A", "B"]);
        assert_eq!(merged.row_dense(0), vec![5, 2]);
        assert_eq!(merged.row_dense(2), vec![7, 1]);
    }

    #[test]
    fn test_header_with_numeric_sample_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("srr.tsv");
        fs::write(&path, "gene_id\t1554530\ng1\t4\ng2\t11\n").unwrap();

        let (genes, counts) = read_sample_counts(&path).unwrap();
        assert_eq!(genes, vec!["g1", "g2"]);
        assert_eq!(counts, vec![4, 11]);
    }

    #[test]
    fn test_featurecounts_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fc.txt");
        fs::write(
            &path,
            "# Program:featureCounts v2.0.1\nGeneid\tChr\tStart\tEnd\tStrand\tLength\tS1.bam\n\
             g1\tchr1\t1\t100\t+\t100\t12\ng2\tchr1;chr1\t200;400\t300;500\t-;-\t202\t0\n",
        )
        .unwrap();

        let (genes, counts) = read_sample_counts(&path).unwrap();
        assert_eq!(genes, vec!["g1", "g2"]);
        assert_eq!(counts, vec![12, 0]);
    }

    #[test]
    fn test_mismatched_gene_sets_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        let b = dir.path().join("b.tsv");
        fs::write(&a, "g1\t5\ng2\t0\n").unwrap();
        fs::write(&b, "g1\t5\ng9\t0\n").unwrap();

        let err = merge_sample_counts(&[("A".to_string(), a), ("B".to_string(), b)]).unwrap_err();
        assert!(matches!(err, DgeError::SampleMismatch(_)));
    }

    #[test]
    fn test_negative_count_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.tsv");
        fs::write(&a, "g1\t5\ng2\t-3\n").unwrap();
        assert!(matches!(
            read_sample_counts(&a).unwrap_err(),
            DgeError::InvalidCount { row: 2, .. }
        ));
    }
}
