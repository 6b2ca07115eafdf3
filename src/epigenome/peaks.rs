//! BED / narrowPeak readers.

use crate::data::gtf::open_text;
use crate::error::{DgeError, Result};
use crate::genomic::{ucsc_chrom, GenomicInterval, IntervalSet, Strand};
use log::{debug, warn};
use std::io::BufRead;
use std::path::Path;

fn is_header(line: &str) -> bool {
    line.trim().is_empty()
        || line.starts_with('#')
        || line.starts_with("track")
        || line.starts_with("browser")
}

/// Parse one BED-like line into an interval.
///
/// Only the first three columns are required; a sixth column is read as the
/// strand. `track`, `browser` and `#` lines yield `None`, as do zero-length
/// records.
pub fn parse_bed_line(line: &str, line_no: usize, source: &str) -> Result<Option<GenomicInterval>> {
    let line = line.trim_end();
    if is_header(line) {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 3 {
        return Err(DgeError::parse(
            source,
            line_no,
            format!("expected at least 3 columns, found {}", fields.len()),
        ));
    }
    let start: u64 = fields[1]
        .parse()
        .map_err(|_| DgeError::parse(source, line_no, format!("invalid start '{}'", fields[1])))?;
    let end: u64 = fields[2]
        .parse()
        .map_err(|_| DgeError::parse(source, line_no, format!("invalid end '{}'", fields[2])))?;
    if end <= start {
        return Ok(None);
    }
    let strand = fields.get(5).map(|s| Strand::parse(s)).unwrap_or(Strand::Unknown);
    GenomicInterval::new(ucsc_chrom(fields[0]), start, end, strand).map(Some)
}

/// Read peaks from a BED or narrowPeak file, gzip-compressed or not.
pub fn read_peaks<P: AsRef<Path>>(path: P) -> Result<IntervalSet> {
    let path = path.as_ref();
    let source = path.display().to_string();
    let reader = open_text(path)?;

    let mut peaks = Vec::new();
    let mut n_skipped = 0;
    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        if is_header(&line) {
            continue;
        }
        match parse_bed_line(&line, i + 1, &source)? {
            Some(iv) => peaks.push(iv),
            None => n_skipped += 1,
        }
    }

    if n_skipped > 0 {
        warn!("Skipped {} zero-length peaks in {}", n_skipped, source);
    }
    if peaks.is_empty() {
        return Err(DgeError::EmptyData(format!("No peaks in {}", source)));
    }

    let set = IntervalSet::new(peaks);
    debug!("Read {} peaks on {} chromosomes from {}", set.len(), set.n_chroms(), source);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const NARROW_PEAK: &str = "track name=peaks\n\
        chr1\t9000\t9800\tpeak1\t0\t.\t12.5\t-1\t4.2\t300\n\
        chr1\t40000\t41000\tpeak2\t0\t.\t8.1\t-1\t2.0\t450\n\
        2\t500\t900\tpeak3\t0\t+\t5.0\t-1\t1.3\t120\n";

    #[test]
    fn test_read_narrowpeak() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", NARROW_PEAK).unwrap();
        file.flush().unwrap();

        let peaks = read_peaks(file.path()).unwrap();
        assert_eq!(peaks.len(), 3);
        assert_eq!(peaks.n_chroms(), 2);
        // Ensembl-style names are mapped to UCSC
        assert_eq!(peaks.intervals()[2].chrom, "chr2");
        assert_eq!(peaks.intervals()[2].strand, Strand::Forward);
    }

    #[test]
    fn test_read_gzipped_peaks() {
        let file = tempfile::Builder::new().suffix(".narrowPeak.gz").tempfile().unwrap();
        let mut encoder = GzEncoder::new(std::fs::File::create(file.path()).unwrap(), Compression::default());
        encoder.write_all(NARROW_PEAK.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let peaks = read_peaks(file.path()).unwrap();
        assert_eq!(peaks.len(), 3);
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_bed_line("chr1\t100", 1, "x.bed").is_err());
        assert!(parse_bed_line("chr1\tabc\t200", 1, "x.bed").is_err());
        assert!(parse_bed_line("chr1\t200\t200", 1, "x.bed").unwrap().is_none());
        assert!(parse_bed_line("# header", 1, "x.bed").unwrap().is_none());
    }

    #[test]
    fn test_empty_file_rejected() {
        let file = NamedTempFile::new().unwrap();
        assert!(read_peaks(file.path()).is_err());
    }
}
