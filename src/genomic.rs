//! Genomic intervals and per-chromosome overlap lookup.
//!
//! Coordinates are 0-based, half-open `[start, end)` throughout the crate.
//! GTF/SAF (1-based, closed) inputs are converted on load.

use crate::error::{DgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Strand of a genomic feature or alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Strand {
    Forward,
    Reverse,
    Unknown,
}

impl Strand {
    /// Parse `+`, `-`, `.` and friends.
    pub fn parse(s: &str) -> Self {
        match s.trim() {
            "+" | "1" | "+1" => Strand::Forward,
            "-" | "-1" => Strand::Reverse,
            _ => Strand::Unknown,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Strand::Forward => Strand::Reverse,
            Strand::Reverse => Strand::Forward,
            Strand::Unknown => Strand::Unknown,
        }
    }
}

impl fmt::Display for Strand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strand::Forward => write!(f, "+"),
            Strand::Reverse => write!(f, "-"),
            Strand::Unknown => write!(f, "."),
        }
    }
}

/// A chromosomal range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenomicInterval {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
    pub strand: Strand,
}

impl GenomicInterval {
    /// Create an interval; `start` must be less than `end`.
    pub fn new(chrom: impl Into<String>, start: u64, end: u64, strand: Strand) -> Result<Self> {
        if start >= end {
            return Err(DgeError::InvalidParameter(format!(
                "interval start ({start}) must be less than end ({end})"
            )));
        }
        Ok(Self {
            chrom: chrom.into(),
            start,
            end,
            strand,
        })
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// Whether two intervals share at least one base (strand ignored).
    pub fn overlaps(&self, other: &GenomicInterval) -> bool {
        self.chrom == other.chrom && self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for GenomicInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}({})", self.chrom, self.start, self.end, self.strand)
    }
}

/// Intervals on one chromosome sorted by start, with the running maximum end
/// so that overlap queries can stop scanning early.
#[derive(Debug, Clone, Default)]
struct ChromBucket {
    /// (start, end, payload index)
    entries: Vec<(u64, u64, usize)>,
    /// max end over entries[..=i]
    max_end: Vec<u64>,
}

impl ChromBucket {
    fn finish(&mut self) {
        self.entries.sort_by_key(|&(s, e, _)| (s, e));
        let mut running = 0;
        self.max_end = self
            .entries
            .iter()
            .map(|&(_, e, _)| {
                running = running.max(e);
                running
            })
            .collect();
    }

    /// Payload indices of entries overlapping `[start, end)`.
    fn query(&self, start: u64, end: u64, out: &mut Vec<usize>) {
        // entries with entry.start < end
        let upper = self.entries.partition_point(|&(s, _, _)| s < end);
        for i in (0..upper).rev() {
            if self.max_end[i] <= start {
                break;
            }
            let (_, e, idx) = self.entries[i];
            if e > start {
                out.push(idx);
            }
        }
    }
}

/// UCSC-style chromosome name: `1` → `chr1`, `MT` → `chrM`.
///
/// Ensembl annotations and Roadmap peak files name chromosomes differently;
/// both sides are mapped through this before intersecting.
pub fn ucsc_chrom(name: &str) -> String {
    if name.starts_with("chr") {
        return name.to_string();
    }
    match name {
        "MT" | "M" => "chrM".to_string(),
        _ => format!("chr{}", name),
    }
}

/// An indexed collection of intervals supporting overlap queries.
#[derive(Debug, Clone, Default)]
pub struct IntervalSet {
    intervals: Vec<GenomicInterval>,
    buckets: HashMap<String, ChromBucket>,
}

impl IntervalSet {
    pub fn new(intervals: Vec<GenomicInterval>) -> Self {
        let mut buckets: HashMap<String, ChromBucket> = HashMap::new();
        for (idx, iv) in intervals.iter().enumerate() {
            buckets
                .entry(iv.chrom.clone())
                .or_default()
                .entries
                .push((iv.start, iv.end, idx));
        }
        for bucket in buckets.values_mut() {
            bucket.finish();
        }
        Self { intervals, buckets }
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn intervals(&self) -> &[GenomicInterval] {
        &self.intervals
    }

    /// Number of distinct chromosomes.
    pub fn n_chroms(&self) -> usize {
        self.buckets.len()
    }

    /// Indices (into [`IntervalSet::intervals`]) of intervals overlapping a range.
    pub fn overlapping(&self, chrom: &str, start: u64, end: u64) -> Vec<usize> {
        let mut out = Vec::new();
        if let Some(bucket) = self.buckets.get(chrom) {
            bucket.query(start, end, &mut out);
        }
        out.sort_unstable();
        out
    }

    /// Whether any interval overlaps the query (strand ignored).
    pub fn overlaps_any(&self, query: &GenomicInterval) -> bool {
        let Some(bucket) = self.buckets.get(&query.chrom) else {
            return false;
        };
        let mut out = Vec::new();
        bucket.query(query.start, query.end, &mut out);
        !out.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iv(chrom: &str, start: u64, end: u64) -> GenomicInterval {
        GenomicInterval::new(chrom, start, end, Strand::Unknown).unwrap()
    }

    #[test]
    fn test_interval_rejects_empty() {
        assert!(GenomicInterval::new("chr1", 10, 10, Strand::Forward).is_err());
    }

    #[test]
    fn test_half_open_overlap() {
        assert!(iv("chr1", 0, 10).overlaps(&iv("chr1", 9, 20)));
        assert!(!iv("chr1", 0, 10).overlaps(&iv("chr1", 10, 20)));
        assert!(!iv("chr1", 0, 10).overlaps(&iv("chr2", 0, 10)));
    }

    #[test]
    fn test_set_overlapping_with_nested_intervals() {
        // A long interval starting early must be found even when shorter
        // intervals in between end before the query.
        let set = IntervalSet::new(vec![
            iv("chr1", 0, 1000),
            iv("chr1", 100, 150),
            iv("chr1", 200, 250),
            iv("chr2", 500, 600),
        ]);
        assert_eq!(set.overlapping("chr1", 500, 510), vec![0]);
        assert_eq!(set.overlapping("chr1", 120, 210), vec![0, 1, 2]);
        assert!(set.overlapping("chr3", 0, 100).is_empty());
        assert_eq!(set.n_chroms(), 2);
    }

    #[test]
    fn test_overlaps_any() {
        let set = IntervalSet::new(vec![iv("chr1", 100, 200)]);
        assert!(set.overlaps_any(&iv("chr1", 150, 160)));
        assert!(!set.overlaps_any(&iv("chr1", 200, 300)));
        assert!(!set.overlaps_any(&iv("chrX", 150, 160)));
    }

    #[test]
    fn test_strand_parse() {
        assert_eq!(Strand::parse("+"), Strand::Forward);
        assert_eq!(Strand::parse("-"), Strand::Reverse);
        assert_eq!(Strand::parse("."), Strand::Unknown);
        assert_eq!(Strand::Forward.opposite(), Strand::Reverse);
    }

    #[test]
    fn test_ucsc_chrom() {
        assert_eq!(ucsc_chrom("1"), "chr1");
        assert_eq!(ucsc_chrom("chrX"), "chrX");
        assert_eq!(ucsc_chrom("MT"), "chrM");
    }
}
