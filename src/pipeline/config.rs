//! YAML configuration of an analysis run.

use crate::assemble::ExpressionFilter;
use crate::count::CountConfig;
use crate::data::DesignSpec;
use crate::epigenome::{EpigenomeCategory, PromoterWindow};
use crate::error::{DgeError, Result};
use crate::normalize::NormalizeConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A per-sample input file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleInput {
    pub sample_id: String,
    pub path: PathBuf,
}

/// Where the counts come from. Exactly one of `bams`, `count_files` or
/// `counts` is used, in that order of preference.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Aligned reads, counted against `features`.
    pub bams: Vec<SampleInput>,
    /// GTF (optionally gzipped) or SAF feature file for counting.
    pub features: Option<PathBuf>,
    /// Per-sample count files (two-column, featureCounts or htseq-count).
    pub count_files: Vec<SampleInput>,
    /// Already merged genes × samples count matrix.
    pub counts: Option<PathBuf>,
    /// Sample metadata TSV, first column the sample id.
    pub samples: PathBuf,
    /// Gene annotation: TSV, or GTF when the name ends in `.gtf`/`.gtf.gz`.
    pub annotation: PathBuf,
}

/// Derive a categorical group column by thresholding a numeric one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupDerivation {
    pub source: String,
    pub target: String,
    pub threshold: f64,
    pub below: String,
    pub at_or_above: String,
}

impl Default for GroupDerivation {
    fn default() -> Self {
        Self {
            source: "age".to_string(),
            target: "age_group".to_string(),
            threshold: 0.0,
            below: "fetal".to_string(),
            at_or_above: "adult".to_string(),
        }
    }
}

/// Exploratory plot options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExploreConfig {
    pub n_components: usize,
    /// Scale genes to unit variance before PCA.
    pub scale: bool,
    /// Metadata column to color samples by; the design group when unset.
    pub color_by: Option<String>,
}

impl Default for ExploreConfig {
    fn default() -> Self {
        Self {
            n_components: 2,
            scale: false,
            color_by: None,
        }
    }
}

/// Moderated test and significance options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Coefficient to test; the group coefficient when unset.
    pub coefficient: Option<String>,
    /// Assumed fraction of differentially expressed genes.
    pub proportion: f64,
    /// Adjusted p-value threshold for calling DEGs.
    pub alpha: f64,
    /// Optional minimum absolute log2 fold change for DEGs.
    pub min_abs_log_fc: f64,
    /// Genes labelled in the volcano plot.
    pub volcano_labels: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            coefficient: None,
            proportion: 0.01,
            alpha: 0.05,
            min_abs_log_fc: 0.0,
            volcano_labels: 10,
        }
    }
}

/// Promoter overlap options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpigenomeConfig {
    pub enabled: bool,
    pub categories: Vec<EpigenomeCategory>,
    pub promoter: PromoterWindow,
    /// Download cache; the user cache directory when unset.
    pub cache_dir: Option<PathBuf>,
}

impl Default for EpigenomeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: EpigenomeCategory::roadmap(),
            promoter: PromoterWindow::default(),
            cache_dir: None,
        }
    }
}

/// Complete analysis configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub name: String,
    pub description: Option<String>,
    pub inputs: InputConfig,
    pub counting: CountConfig,
    /// Match versioned gene ids against unversioned annotation keys.
    pub strip_versions: bool,
    /// Group column derived from a numeric column before modelling.
    pub derive_group: Option<GroupDerivation>,
    pub filter: ExpressionFilter,
    pub normalize: NormalizeConfig,
    pub design: DesignSpec,
    pub explore: ExploreConfig,
    pub test: TestConfig,
    pub epigenome: EpigenomeConfig,
    pub output_dir: PathBuf,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            name: "fetal_vs_adult_brain".to_string(),
            description: Some("Fetal vs. adult human brain RNA-seq".to_string()),
            inputs: InputConfig::default(),
            counting: CountConfig::default(),
            strip_versions: true,
            derive_group: Some(GroupDerivation::default()),
            filter: ExpressionFilter::default(),
            normalize: NormalizeConfig::default(),
            design: DesignSpec::new("age_group").with_reference("adult"),
            explore: ExploreConfig::default(),
            test: TestConfig::default(),
            epigenome: EpigenomeConfig::default(),
            output_dir: PathBuf::from("results"),
        }
    }
}

impl AnalysisConfig {
    /// Load from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(DgeError::from)
    }

    /// Save to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(DgeError::from)
    }

    /// Load from a YAML file. Relative input paths are resolved against the
    /// file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&yaml)?;
        if let Some(base) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    /// Template written by `dge example`.
    pub fn example() -> Self {
        let sample = |id: &str| SampleInput {
            sample_id: id.to_string(),
            path: PathBuf::from(format!("counts/{}.txt", id)),
        };
        Self {
            inputs: InputConfig {
                count_files: vec![sample("SRR1554537"), sample("SRR1554566")],
                samples: PathBuf::from("samples.tsv"),
                annotation: PathBuf::from("annotation.tsv"),
                ..InputConfig::default()
            },
            ..Self::default()
        }
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() && !p.as_os_str().is_empty() {
                *p = base.join(&*p);
            }
        };
        let inputs = &mut self.inputs;
        inputs.bams.iter_mut().for_each(|s| resolve(&mut s.path));
        inputs.count_files.iter_mut().for_each(|s| resolve(&mut s.path));
        inputs.features.iter_mut().for_each(resolve);
        inputs.counts.iter_mut().for_each(resolve);
        resolve(&mut inputs.samples);
        resolve(&mut inputs.annotation);
        resolve(&mut self.output_dir);
        for category in &mut self.epigenome.categories {
            if let EpigenomeCategory::Custom { source, .. } = category {
                let is_remote = source.starts_with("http://") || source.starts_with("https://");
                if !is_remote && Path::new(source.as_str()).is_relative() {
                    *source = base.join(source.as_str()).display().to_string();
                }
            }
        }
    }

    /// Check that the configuration can drive a run.
    pub fn validate(&self) -> Result<()> {
        let inputs = &self.inputs;
        if inputs.bams.is_empty() && inputs.count_files.is_empty() && inputs.counts.is_none() {
            return Err(DgeError::InvalidParameter(
                "No count input: set inputs.bams, inputs.count_files or inputs.counts".to_string(),
            ));
        }
        if !inputs.bams.is_empty() && inputs.features.is_none() {
            return Err(DgeError::InvalidParameter(
                "inputs.features is required when counting BAM files".to_string(),
            ));
        }
        if !(self.test.alpha > 0.0 && self.test.alpha <= 1.0) {
            return Err(DgeError::InvalidParameter(format!(
                "test.alpha must be in (0, 1], got {}",
                self.test.alpha
            )));
        }
        if self.explore.n_components == 0 {
            return Err(DgeError::InvalidParameter(
                "explore.n_components must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_round_trip() {
        let config = AnalysisConfig::example();
        let yaml = config.to_yaml().unwrap();
        let parsed = AnalysisConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed, config);
        assert_eq!(parsed.design.group, "age_group");
        assert_eq!(parsed.epigenome.categories.len(), 3);
    }

    #[test]
    fn test_minimal_yaml_uses_defaults() {
        let yaml = "inputs:\n  counts: merged.tsv\n  samples: samples.tsv\n  annotation: genes.gtf\n\
                    test:\n  alpha: 0.01\n\
                    filter:\n  method: cpm\n  min_cpm: 1.0\n  min_samples: 3\n";
        let config = AnalysisConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.test.alpha, 0.01);
        assert_eq!(config.test.proportion, 0.01);
        assert_eq!(
            config.filter,
            ExpressionFilter::Cpm {
                min_cpm: 1.0,
                min_samples: 3
            }
        );
        assert_eq!(config.epigenome.promoter.upstream, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_inputs() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_err());

        let mut with_bams = AnalysisConfig::example();
        with_bams.inputs.bams.push(SampleInput {
            sample_id: "S1".into(),
            path: "S1.bam".into(),
        });
        assert!(with_bams.validate().is_err());
    }

    #[test]
    fn test_relative_paths_resolved() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("analysis.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "inputs:\n  counts: merged.tsv\n  samples: meta/samples.tsv\n  annotation: /abs/genes.tsv").unwrap();

        let config = AnalysisConfig::from_file(&path).unwrap();
        assert_eq!(config.inputs.counts.unwrap(), dir.path().join("merged.tsv"));
        assert_eq!(config.inputs.samples, dir.path().join("meta/samples.tsv"));
        assert_eq!(config.inputs.annotation, PathBuf::from("/abs/genes.tsv"));
        assert_eq!(config.output_dir, dir.path().join("results"));
    }
}
