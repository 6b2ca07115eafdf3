//! Minimal GTF reader shared by gene annotation and feature counting.

use crate::error::{DgeError, Result};
use crate::genomic::Strand;
use flate2::read::MultiGzDecoder;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// One GTF line, coordinates converted to 0-based half-open.
#[derive(Debug, Clone, PartialEq)]
pub struct GtfRecord {
    pub chrom: String,
    pub feature: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
    pub attributes: HashMap<String, String>,
}

impl GtfRecord {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(|s| s.as_str())
    }
}

/// Open a text file, transparently decompressing `.gz`.
pub fn open_text<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let inner: Box<dyn Read> = if path.extension().is_some_and(|e| e == "gz") {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(inner)))
}

/// Parse `key "value"; key2 "value2";` attribute columns.
fn parse_attributes(raw: &str) -> HashMap<String, String> {
    raw.split(';')
        .filter_map(|field| {
            let field = field.trim();
            if field.is_empty() {
                return None;
            }
            let (key, value) = field.split_once(char::is_whitespace)?;
            Some((key.to_string(), value.trim().trim_matches('"').to_string()))
        })
        .collect()
}

/// Parse one GTF line. Comment and blank lines yield `None`.
pub fn parse_gtf_line(line: &str, line_no: usize, source: &str) -> Result<Option<GtfRecord>> {
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        return Err(DgeError::parse(
            source,
            line_no,
            format!("expected 9 GTF columns, found {}", fields.len()),
        ));
    }
    let start: u64 = fields[3]
        .parse()
        .map_err(|_| DgeError::parse(source, line_no, format!("bad start '{}'", fields[3])))?;
    let end: u64 = fields[4]
        .parse()
        .map_err(|_| DgeError::parse(source, line_no, format!("bad end '{}'", fields[4])))?;
    if start == 0 || end < start {
        return Err(DgeError::parse(
            source,
            line_no,
            format!("invalid range {}-{}", start, end),
        ));
    }
    Ok(Some(GtfRecord {
        chrom: fields[0].to_string(),
        feature: fields[2].to_string(),
        start: start - 1,
        end,
        strand: Strand::parse(fields[6]),
        attributes: parse_attributes(fields[8]),
    }))
}

/// Read all records of a GTF file whose feature type is in `features`.
pub fn read_gtf<P: AsRef<Path>>(path: P, features: &[&str]) -> Result<Vec<GtfRecord>> {
    let source = path.as_ref().display().to_string();
    let reader = open_text(&path)?;
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if let Some(record) = parse_gtf_line(&line, i + 1, &source)? {
            if features.iter().any(|f| *f == record.feature) {
                records.push(record);
            }
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gtf_line() {
        let line = "chr1\tHAVANA\texon\t11869\t12227\t.\t+\t.\tgene_id \"ENSG00000223972.5\"; gene_name \"DDX11L1\";";
        let record = parse_gtf_line(line, 1, "test").unwrap().unwrap();

        assert_eq!(record.chrom, "chr1");
        assert_eq!(record.feature, "exon");
        assert_eq!(record.start, 11868);
        assert_eq!(record.end, 12227);
        assert_eq!(record.strand, Strand::Forward);
        assert_eq!(record.attribute("gene_id"), Some("ENSG00000223972.5"));
        assert_eq!(record.attribute("gene_name"), Some("DDX11L1"));
    }

    #[test]
    fn test_comment_lines_skipped() {
        assert!(parse_gtf_line("#!genome-build GRCh37", 1, "test")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_short_line_is_error() {
        let err = parse_gtf_line("chr1\tx\texon\t1", 7, "genes.gtf").unwrap_err();
        assert!(err.to_string().contains("line 7"));
    }
}
