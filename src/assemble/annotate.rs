//! Joining the count matrix with gene annotation.

use crate::data::{CountMatrix, GeneAnnotation};
use crate::error::{DgeError, Result};
use log::{info, warn};

/// Count matrix restricted to annotated genes.
#[derive(Debug, Clone)]
pub struct AnnotatedCounts {
    pub counts: CountMatrix,
    /// Symbol per row of `counts`.
    pub symbols: Vec<String>,
    /// Rows dropped for lack of annotation.
    pub n_unannotated: usize,
}

/// Keep only rows whose gene identifier is annotated.
///
/// With `strip_version`, `ENSG00000141510.12` identifiers also match unversioned
/// annotation keys. The output always has `rows_in - n_unannotated` rows.
pub fn join_annotation(
    counts: &CountMatrix,
    annotation: &GeneAnnotation,
    strip_version: bool,
) -> Result<AnnotatedCounts> {
    let mut keep = Vec::with_capacity(counts.n_genes());
    let mut symbols = Vec::with_capacity(counts.n_genes());
    for (row, gene_id) in counts.gene_ids().iter().enumerate() {
        if let Some(record) = annotation.lookup(gene_id, strip_version) {
            keep.push(row);
            symbols.push(record.symbol.clone());
        }
    }

    let n_unannotated = counts.n_genes() - keep.len();
    if keep.is_empty() {
        return Err(DgeError::GeneMismatch(format!(
            "None of {} count rows matched the annotation ({} genes)",
            counts.n_genes(),
            annotation.len()
        )));
    }
    if n_unannotated > 0 {
        warn!("Dropped {} count rows without annotation", n_unannotated);
    }
    info!("{} annotated genes retained", keep.len());

    Ok(AnnotatedCounts {
        counts: counts.subset_genes(&keep)?,
        symbols,
        n_unannotated,
    })
}
