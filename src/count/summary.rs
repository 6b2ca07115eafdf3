//! Per-sample counting output: gene counts and the assignment summary.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Outcome category of one read (or fragment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReadStatus {
    Assigned,
    Unmapped,
    Secondary,
    Supplementary,
    MappingQuality,
    Duplicate,
    NoFeatures,
    Ambiguity,
}

impl ReadStatus {
    pub const ALL: [ReadStatus; 8] = [
        ReadStatus::Assigned,
        ReadStatus::Unmapped,
        ReadStatus::Secondary,
        ReadStatus::Supplementary,
        ReadStatus::MappingQuality,
        ReadStatus::Duplicate,
        ReadStatus::NoFeatures,
        ReadStatus::Ambiguity,
    ];

    /// Label used in summary files, following featureCounts naming.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Assigned => "Assigned",
            Self::Unmapped => "Unassigned_Unmapped",
            Self::Secondary => "Unassigned_Secondary",
            Self::Supplementary => "Unassigned_Supplementary",
            Self::MappingQuality => "Unassigned_MappingQuality",
            Self::Duplicate => "Unassigned_Duplicate",
            Self::NoFeatures => "Unassigned_NoFeatures",
            Self::Ambiguity => "Unassigned_Ambiguity",
        }
    }

    fn slot(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }
}

impl fmt::Display for ReadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Number of reads per [`ReadStatus`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentSummary {
    counts: [u64; 8],
}

impl AssignmentSummary {
    pub fn record(&mut self, status: ReadStatus) {
        self.counts[status.slot()] += 1;
    }

    pub fn get(&self, status: ReadStatus) -> u64 {
        self.counts[status.slot()]
    }

    /// Reads seen in total.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Fraction of reads assigned to a gene.
    pub fn assigned_fraction(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.get(ReadStatus::Assigned) as f64 / total as f64
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ReadStatus, u64)> + '_ {
        ReadStatus::ALL.iter().map(move |s| (*s, self.get(*s)))
    }

    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "status\treads")?;
        for (status, n) in self.iter() {
            writeln!(writer, "{}\t{}", status, n)?;
        }
        writer.flush()?;
        Ok(())
    }
}

impl fmt::Display for AssignmentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (status, n) in self.iter() {
            writeln!(f, "{:<28}{}", status.name(), n)?;
        }
        write!(f, "Assigned fraction: {:.1}%", 100.0 * self.assigned_fraction())
    }
}

/// Gene counts for one sample.
#[derive(Debug, Clone)]
pub struct SampleCounts {
    pub sample_id: String,
    pub gene_ids: Vec<String>,
    pub counts: Vec<u64>,
    pub summary: AssignmentSummary,
}

impl SampleCounts {
    pub fn total_assigned(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Write `gene_id<TAB>count` lines with a `gene_id<TAB>sample_id` header.
    pub fn write_tsv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "gene_id\t{}", self.sample_id)?;
        for (gene_id, count) in self.gene_ids.iter().zip(&self.counts) {
            writeln!(writer, "{}\t{}", gene_id, count)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_tally() {
        let mut summary = AssignmentSummary::default();
        summary.record(ReadStatus::Assigned);
        summary.record(ReadStatus::Assigned);
        summary.record(ReadStatus::Ambiguity);
        summary.record(ReadStatus::Unmapped);

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.get(ReadStatus::Assigned), 2);
        assert!((summary.assigned_fraction() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sample_counts_tsv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("S1.counts.tsv");
        let counts = SampleCounts {
            sample_id: "S1".into(),
            gene_ids: vec!["g1".into(), "g2".into()],
            counts: vec![10, 0],
            summary: AssignmentSummary::default(),
        };
        counts.write_tsv(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text, "gene_id\tS1\ng1\t10\ng2\t0\n");
    }
}
