//! Exon-level feature index for read assignment.

use crate::data::gtf::{open_text, read_gtf};
use crate::error::{DgeError, Result};
use crate::genomic::{GenomicInterval, IntervalSet, Strand};
use log::info;
use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

/// Exons grouped by gene, indexed by chromosome for overlap lookup.
///
/// Genes keep the order in which they first appear in the source file so
/// that count tables are reproducible.
#[derive(Debug, Clone)]
pub struct FeatureIndex {
    gene_ids: Vec<String>,
    /// Gene index for each exon in `exons`.
    exon_gene: Vec<usize>,
    exons: IntervalSet,
}

impl FeatureIndex {
    /// Build from `(gene_id, exon)` pairs.
    pub fn new(features: Vec<(String, GenomicInterval)>) -> Result<Self> {
        if features.is_empty() {
            return Err(DgeError::EmptyData("No features to index".to_string()));
        }
        let mut gene_ids = Vec::new();
        let mut lookup: HashMap<String, usize> = HashMap::new();
        let mut exon_gene = Vec::with_capacity(features.len());
        let mut intervals = Vec::with_capacity(features.len());

        for (gene_id, exon) in features {
            let idx = *lookup.entry(gene_id.clone()).or_insert_with(|| {
                gene_ids.push(gene_id);
                gene_ids.len() - 1
            });
            exon_gene.push(idx);
            intervals.push(exon);
        }

        Ok(Self {
            gene_ids,
            exon_gene,
            exons: IntervalSet::new(intervals),
        })
    }

    /// Load features of one type (usually `exon`) from a GTF, grouped by an
    /// attribute (usually `gene_id`).
    pub fn from_gtf<P: AsRef<Path>>(path: P, feature_type: &str, attribute: &str) -> Result<Self> {
        let records = read_gtf(&path, &[feature_type])?;
        let mut features = Vec::with_capacity(records.len());
        for record in records {
            let Some(gene_id) = record.attribute(attribute) else {
                continue;
            };
            let exon = GenomicInterval::new(record.chrom.clone(), record.start, record.end, record.strand)?;
            features.push((gene_id.to_string(), exon));
        }
        let index = Self::new(features)?;
        info!(
            "Indexed {} {} features for {} genes from {}",
            index.n_features(),
            feature_type,
            index.n_genes(),
            path.as_ref().display()
        );
        Ok(index)
    }

    /// Load a featureCounts SAF file (`GeneID Chr Start End Strand`, 1-based
    /// inclusive).
    pub fn from_saf<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = path.as_ref().display().to_string();
        let reader = open_text(&path)?;
        let mut features = Vec::new();

        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let line_no = i + 1;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 5 {
                return Err(DgeError::parse(
                    &source,
                    line_no,
                    format!("expected 5 SAF columns, found {}", fields.len()),
                ));
            }
            if line_no == 1 && fields[0].eq_ignore_ascii_case("geneid") {
                continue;
            }
            let start: u64 = fields[2]
                .parse()
                .map_err(|_| DgeError::parse(&source, line_no, format!("bad start '{}'", fields[2])))?;
            let end: u64 = fields[3]
                .parse()
                .map_err(|_| DgeError::parse(&source, line_no, format!("bad end '{}'", fields[3])))?;
            if start == 0 || end < start {
                return Err(DgeError::parse(
                    &source,
                    line_no,
                    format!("invalid range {}-{}", start, end),
                ));
            }
            let exon = GenomicInterval::new(fields[1], start - 1, end, Strand::parse(fields[4]))?;
            features.push((fields[0].to_string(), exon));
        }

        let index = Self::new(features)?;
        info!(
            "Indexed {} SAF features for {} genes from {}",
            index.n_features(),
            index.n_genes(),
            source
        );
        Ok(index)
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn n_features(&self) -> usize {
        self.exons.len()
    }

    /// Genes with an exon overlapping `[start, end)` whose strand passes `keep`.
    pub(crate) fn genes_overlapping<F>(&self, chrom: &str, start: u64, end: u64, keep: F, out: &mut Vec<usize>)
    where
        F: Fn(Strand) -> bool,
    {
        for exon_idx in self.exons.overlapping(chrom, start, end) {
            if keep(self.exons.intervals()[exon_idx].strand) {
                out.push(self.exon_gene[exon_idx]);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_saf() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "GeneID\tChr\tStart\tEnd\tStrand").unwrap();
        writeln!(file, "g1\tchr1\t101\t200\t+").unwrap();
        writeln!(file, "g1\tchr1\t301\t400\t+").unwrap();
        writeln!(file, "g2\tchr1\t1001\t1100\t-").unwrap();
        file.flush().unwrap();

        let index = FeatureIndex::from_saf(file.path()).unwrap();
        assert_eq!(index.gene_ids(), &["g1", "g2"]);
        assert_eq!(index.n_features(), 3);

        let mut hits = Vec::new();
        index.genes_overlapping("chr1", 199, 310, |_| true, &mut hits);
        hits.sort_unstable();
        assert_eq!(hits, vec![0, 0]);

        hits.clear();
        index.genes_overlapping("chr1", 200, 300, |_| true, &mut hits);
        assert!(hits.is_empty());
    }

    #[test]
    fn test_from_gtf_groups_exons_by_gene() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "chr1\ts\tgene\t1\t500\t.\t+\t.\tgene_id \"g1\";").unwrap();
        writeln!(file, "chr1\ts\texon\t1\t100\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";").unwrap();
        writeln!(file, "chr1\ts\texon\t401\t500\t.\t+\t.\tgene_id \"g1\"; transcript_id \"t1\";").unwrap();
        writeln!(file, "chr2\ts\texon\t1\t100\t.\t-\t.\tgene_id \"g2\"; transcript_id \"t2\";").unwrap();
        file.flush().unwrap();

        let index = FeatureIndex::from_gtf(file.path(), "exon", "gene_id").unwrap();
        assert_eq!(index.n_genes(), 2);
        assert_eq!(index.n_features(), 3);
    }

    #[test]
    fn test_empty_index_rejected() {
        assert!(FeatureIndex::new(Vec::new()).is_err());
    }
}
