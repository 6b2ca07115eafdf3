//! Gene annotation: identifier to symbol and genomic location.

use crate::data::gtf::read_gtf;
use crate::error::{DgeError, Result};
use crate::genomic::{GenomicInterval, Strand};
use log::{debug, warn};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Annotation of one gene.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneRecord {
    pub gene_id: String,
    pub symbol: String,
    /// Gene body, when the source provides coordinates.
    pub location: Option<GenomicInterval>,
}

impl GeneRecord {
    /// Transcription start site: `start` on the forward strand, `end - 1` on
    /// the reverse strand.
    pub fn tss(&self) -> Option<u64> {
        self.location.as_ref().map(|loc| match loc.strand {
            Strand::Reverse => loc.end - 1,
            _ => loc.start,
        })
    }
}

/// Row of an annotation TSV. Coordinates are 1-based inclusive, as exported
/// by Ensembl BioMart.
#[derive(Debug, Deserialize)]
struct AnnotationRow {
    gene_id: String,
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    chrom: Option<String>,
    #[serde(default)]
    start: Option<u64>,
    #[serde(default)]
    end: Option<u64>,
    #[serde(default)]
    strand: Option<String>,
}

/// Remove an Ensembl version suffix (`ENSG00000141510.16` → `ENSG00000141510`).
pub fn strip_version(gene_id: &str) -> &str {
    match gene_id.rsplit_once('.') {
        Some((base, version)) if !version.is_empty() && version.bytes().all(|b| b.is_ascii_digit()) => base,
        _ => gene_id,
    }
}

/// Gene identifier lookup table.
#[derive(Debug, Clone, Default)]
pub struct GeneAnnotation {
    records: Vec<GeneRecord>,
    index: HashMap<String, usize>,
}

impl GeneAnnotation {
    /// Build from records. Later duplicates of a gene id are ignored.
    pub fn new(records: Vec<GeneRecord>) -> Self {
        let mut kept = Vec::with_capacity(records.len());
        let mut index = HashMap::with_capacity(records.len());
        for record in records {
            if index.contains_key(&record.gene_id) {
                debug!("Duplicate annotation for {}, keeping first", record.gene_id);
                continue;
            }
            index.insert(record.gene_id.clone(), kept.len());
            kept.push(record);
        }
        Self {
            records: kept,
            index,
        }
    }

    /// Load a tab-separated table with a `gene_id` column and optional
    /// `symbol`, `chrom`, `start`, `end`, `strand` columns.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let source = path.as_ref().display().to_string();
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .flexible(false)
            .from_path(&path)?;

        let mut records = Vec::new();
        for (i, row) in reader.deserialize::<AnnotationRow>().enumerate() {
            let row = row?;
            let location = match (row.chrom, row.start, row.end) {
                (Some(chrom), Some(start), Some(end)) if !chrom.is_empty() => {
                    if start == 0 || end < start {
                        return Err(DgeError::parse(
                            &source,
                            i + 2,
                            format!("invalid range {}-{} for {}", start, end, row.gene_id),
                        ));
                    }
                    let strand = row.strand.as_deref().map(Strand::parse).unwrap_or(Strand::Unknown);
                    Some(GenomicInterval::new(chrom, start - 1, end, strand)?)
                }
                _ => None,
            };
            let symbol = row
                .symbol
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| row.gene_id.clone());
            records.push(GeneRecord {
                gene_id: row.gene_id,
                symbol,
                location,
            });
        }

        if records.is_empty() {
            return Err(DgeError::EmptyData(format!("No genes in annotation {}", source)));
        }
        Ok(Self::new(records))
    }

    /// Load gene records from a GTF file.
    ///
    /// Uses `gene` features when present; otherwise each gene spans the union
    /// of its exons. The symbol is `gene_name`, falling back to `gene_id`.
    pub fn from_gtf<P: AsRef<Path>>(path: P) -> Result<Self> {
        let gtf = read_gtf(&path, &["gene", "exon"])?;
        let has_genes = gtf.iter().any(|r| r.feature == "gene");
        let wanted = if has_genes { "gene" } else { "exon" };
        if !has_genes {
            warn!("GTF has no gene records, deriving gene extents from exons");
        }

        let mut order: Vec<String> = Vec::new();
        let mut merged: HashMap<String, GeneRecord> = HashMap::new();
        for record in gtf.iter().filter(|r| r.feature == wanted) {
            let Some(gene_id) = record.attribute("gene_id") else {
                continue;
            };
            let symbol = record.attribute("gene_name").unwrap_or(gene_id).to_string();
            match merged.get_mut(gene_id) {
                Some(existing) => {
                    if let Some(loc) = existing.location.as_mut() {
                        loc.start = loc.start.min(record.start);
                        loc.end = loc.end.max(record.end);
                    }
                }
                None => {
                    let location =
                        GenomicInterval::new(record.chrom.clone(), record.start, record.end, record.strand)?;
                    order.push(gene_id.to_string());
                    merged.insert(
                        gene_id.to_string(),
                        GeneRecord {
                            gene_id: gene_id.to_string(),
                            symbol,
                            location: Some(location),
                        },
                    );
                }
            }
        }

        if order.is_empty() {
            return Err(DgeError::EmptyData(format!(
                "No gene_id attributes in {}",
                path.as_ref().display()
            )));
        }
        let records = order
            .into_iter()
            .filter_map(|id| merged.remove(&id))
            .collect();
        Ok(Self::new(records))
    }

    pub fn get(&self, gene_id: &str) -> Option<&GeneRecord> {
        self.index.get(gene_id).map(|&i| &self.records[i])
    }

    pub fn symbol(&self, gene_id: &str) -> Option<&str> {
        self.get(gene_id).map(|r| r.symbol.as_str())
    }

    /// Look up a gene, retrying without the version suffix when asked to.
    pub fn lookup(&self, gene_id: &str, strip: bool) -> Option<&GeneRecord> {
        self.get(gene_id)
            .or_else(|| strip.then(|| self.get(strip_version(gene_id))).flatten())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &GeneRecord> {
        self.records.iter()
    }

    /// Copy with identifiers stripped of version suffixes.
    pub fn without_versions(&self) -> Self {
        Self::new(
            self.records
                .iter()
                .map(|r| GeneRecord {
                    gene_id: strip_version(&r.gene_id).to_string(),
                    ..r.clone()
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_strip_version() {
        assert_eq!(strip_version("ENSG00000141510.16"), "ENSG00000141510");
        assert_eq!(strip_version("ENSG00000141510"), "ENSG00000141510");
        assert_eq!(strip_version("RP11-34P13.x"), "RP11-34P13.x");
    }

    #[test]
    fn test_from_tsv() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "gene_id\tsymbol\tchrom\tstart\tend\tstrand").unwrap();
        writeln!(file, "ENSG1\tSOX2\tchr3\t1001\t2000\t+").unwrap();
        writeln!(file, "ENSG2\tGFAP\tchr17\t5001\t6000\t-").unwrap();
        writeln!(file, "ENSG3\t\t\t\t\t").unwrap();
        file.flush().unwrap();

        let ann = GeneAnnotation::from_tsv(file.path()).unwrap();
        assert_eq!(ann.len(), 3);
        assert_eq!(ann.symbol("ENSG1"), Some("SOX2"));
        assert_eq!(ann.symbol("ENSG3"), Some("ENSG3"));
        assert!(ann.get("ENSG3").unwrap().location.is_none());

        let sox2 = ann.get("ENSG1").unwrap();
        assert_eq!(sox2.location.as_ref().unwrap().start, 1000);
        assert_eq!(sox2.tss(), Some(1000));
        let gfap = ann.get("ENSG2").unwrap();
        assert_eq!(gfap.tss(), Some(5999));
    }

    #[test]
    fn test_lookup_with_version() {
        let ann = GeneAnnotation::new(vec![GeneRecord {
            gene_id: "ENSG1".into(),
            symbol: "A".into(),
            location: None,
        }]);
        assert!(ann.lookup("ENSG1.4", false).is_none());
        assert_eq!(ann.lookup("ENSG1.4", true).unwrap().symbol, "A");
    }

    #[test]
    fn test_from_gtf_exon_fallback() {
        let mut file = NamedTempFile::with_suffix(".gtf").unwrap();
        writeln!(file, "chr1\tsrc\texon\t101\t200\t.\t-\t.\tgene_id \"g1\"; gene_name \"NEUROD1\";").unwrap();
        writeln!(file, "chr1\tsrc\texon\t301\t400\t.\t-\t.\tgene_id \"g1\"; gene_name \"NEUROD1\";").unwrap();
        writeln!(file, "chr2\tsrc\texon\t11\t20\t.\t+\t.\tgene_id \"g2\";").unwrap();
        file.flush().unwrap();

        let ann = GeneAnnotation::from_gtf(file.path()).unwrap();
        assert_eq!(ann.len(), 2);
        let g1 = ann.get("g1").unwrap();
        let loc = g1.location.as_ref().unwrap();
        assert_eq!((loc.start, loc.end), (100, 400));
        assert_eq!(g1.tss(), Some(399));
        assert_eq!(ann.symbol("g2"), Some("g2"));
    }
}
