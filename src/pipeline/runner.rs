//! Five-stage analysis runner.
//!
//! Each stage is a method on [`Analysis`] returning its in-memory output,
//! so stages can be run individually; [`Analysis::run`] chains them and
//! writes every table, plot and the JSON report to the output directory.

use crate::assemble::{join_annotation, merge_counts, merge_sample_counts, ExpressionSet};
use crate::correct::{correct_bh_moderated, create_results};
use crate::count::{
    count_bam, AssignmentSummary, CountConfig, FeatureIndex, ReadStatus, SampleCounts,
};
use crate::data::{CountMatrix, DeResultSet, DesignMatrix, GeneAnnotation, ResultSummary, SampleTable};
use crate::epigenome::{fetch_peaks, promoters, write_overlap_tsv, CategoryOverlap};
use crate::error::{DgeError, Result};
use crate::explore::{box_stats, boxplot_svg, pca, pca_svg, volcano_svg, BoxStats, PcaResult};
use crate::model::model_lm;
use crate::normalize::{log2_counts, normalize, ExpressionMatrix};
use crate::pipeline::config::{AnalysisConfig, EpigenomeConfig, TestConfig};
use crate::test::{test_moderated, ModeratedResult};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Output of the counting stage.
#[derive(Debug, Clone)]
pub struct CountStage {
    pub counts: CountMatrix,
    /// Read assignment per sample; empty when counts were read from files.
    pub summaries: Vec<(String, AssignmentSummary)>,
}

/// Output of the assembly stage.
#[derive(Debug, Clone)]
pub struct AssembleStage {
    /// Annotated, filtered counts with aligned sample metadata.
    pub set: ExpressionSet,
    pub annotation: GeneAnnotation,
    pub n_unannotated: usize,
    /// Annotated genes removed by the expression filter.
    pub n_filtered: usize,
}

/// Output of the exploration stage.
#[derive(Debug, Clone)]
pub struct ExploreStage {
    pub expr: ExpressionMatrix,
    pub box_stats: Vec<BoxStats>,
    pub pca: PcaResult,
    /// Sample labels used to color the plots.
    pub groups: Vec<String>,
}

/// Output of the differential expression stage.
#[derive(Debug, Clone)]
pub struct DeStage {
    pub norm_factors: Vec<f64>,
    pub moderated: ModeratedResult,
    pub results: DeResultSet,
}

/// Assigned reads of one sample, for the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleAssignment {
    pub sample_id: String,
    pub total: u64,
    pub assigned: u64,
    pub assigned_fraction: f64,
}

/// Summary of a complete run, written as `report.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub name: String,
    pub n_samples: usize,
    pub n_genes_counted: usize,
    pub n_unannotated: usize,
    pub n_filtered: usize,
    pub n_genes_tested: usize,
    pub assignment: Vec<SampleAssignment>,
    pub norm_factors: Vec<(String, f64)>,
    pub pca_variance_explained: Vec<f64>,
    pub coefficient: String,
    pub df_prior: f64,
    pub var_prior: f64,
    pub summary: ResultSummary,
    pub n_degs: usize,
    pub overlaps: Vec<CategoryOverlap>,
    pub outputs: Vec<PathBuf>,
}

/// An analysis driven by an [`AnalysisConfig`].
#[derive(Debug, Clone)]
pub struct Analysis {
    config: AnalysisConfig,
}

impl Analysis {
    pub fn new(config: AnalysisConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Stage 1: count reads, or read per-sample / merged count tables.
    pub fn count(&self) -> Result<CountStage> {
        let inputs = &self.config.inputs;

        if !inputs.bams.is_empty() {
            let features = inputs.features.as_ref().ok_or_else(|| {
                DgeError::InvalidParameter("inputs.features is required for BAM input".to_string())
            })?;
            let index = load_features(features, &self.config.counting)?;
            let mut per_sample: Vec<SampleCounts> = Vec::with_capacity(inputs.bams.len());
            for bam in &inputs.bams {
                info!("Counting {} ({})", bam.sample_id, bam.path.display());
                let counts = count_bam(&bam.path, &bam.sample_id, &index, &self.config.counting)?;
                info!(
                    "{}: {:.1}% of {} reads assigned",
                    bam.sample_id,
                    100.0 * counts.summary.assigned_fraction(),
                    counts.summary.total()
                );
                per_sample.push(counts);
            }
            let summaries = per_sample
                .iter()
                .map(|s| (s.sample_id.clone(), s.summary.clone()))
                .collect();
            return Ok(CountStage {
                counts: merge_counts(per_sample)?,
                summaries,
            });
        }

        let counts = if !inputs.count_files.is_empty() {
            let files: Vec<(String, PathBuf)> = inputs
                .count_files
                .iter()
                .map(|s| (s.sample_id.clone(), s.path.clone()))
                .collect();
            merge_sample_counts(&files)?
        } else if let Some(path) = &inputs.counts {
            CountMatrix::from_tsv(path)?
        } else {
            return Err(DgeError::InvalidParameter("No count input configured".to_string()));
        };
        Ok(CountStage {
            counts,
            summaries: Vec::new(),
        })
    }

    /// Stage 2: annotate, filter and attach sample metadata.
    pub fn assemble(&self, counts: &CountMatrix) -> Result<AssembleStage> {
        let annotation = load_annotation(&self.config.inputs.annotation)?;
        let annotated = join_annotation(counts, &annotation, self.config.strip_versions)?;

        let mut samples = SampleTable::from_tsv(&self.config.inputs.samples)?;
        if let Some(derive) = &self.config.derive_group {
            if !samples.has_column(&derive.target) {
                samples = samples.derive_group_from_threshold(
                    &derive.source,
                    &derive.target,
                    derive.threshold,
                    &derive.below,
                    &derive.at_or_above,
                )?;
            }
        }

        let full = ExpressionSet::new(annotated.counts, &samples, annotated.symbols)?;
        let set = full.filter(&self.config.filter)?;
        let n_filtered = full.counts().n_genes() - set.counts().n_genes();
        info!(
            "Assembled {} genes x {} samples ({} unannotated, {} low-expression removed)",
            set.counts().n_genes(),
            set.counts().n_samples(),
            annotated.n_unannotated,
            n_filtered
        );

        Ok(AssembleStage {
            set,
            annotation,
            n_unannotated: annotated.n_unannotated,
            n_filtered,
        })
    }

    /// Stage 3: log2 expression, per-sample distributions and PCA.
    pub fn explore(&self, set: &ExpressionSet) -> Result<ExploreStage> {
        let expr = log2_counts(set.counts(), self.config.normalize.explore_prior)?;
        let box_stats = box_stats(&expr)?;
        let pca = pca(&expr, self.config.explore.n_components, self.config.explore.scale)?;
        let color_by = self
            .config
            .explore
            .color_by
            .as_deref()
            .unwrap_or(&self.config.design.group);
        let groups = set.samples().labels(color_by)?;

        let explained: Vec<String> = pca
            .variance_explained
            .iter()
            .map(|v| format!("{:.1}%", 100.0 * v))
            .collect();
        info!("PCA variance explained: {}", explained.join(", "));

        Ok(ExploreStage {
            expr,
            box_stats,
            pca,
            groups,
        })
    }

    /// Stage 4: logCPM, linear model, moderated t and BH correction.
    pub fn differential_expression(&self, set: &ExpressionSet) -> Result<DeStage> {
        let (expr, norm_factors) = normalize(set.counts(), &self.config.normalize)?;
        let design = DesignMatrix::from_spec(set.samples(), &self.config.design)?;
        let coefficient = self
            .config
            .test
            .coefficient
            .clone()
            .unwrap_or_else(|| design.group_coefficient_name().to_string());

        let fit = model_lm(&expr, &design)?;
        let moderated = test_moderated(&fit, &coefficient, self.config.test.proportion)?;
        let bh = correct_bh_moderated(&moderated);
        let results = create_results(&moderated, &bh, set.symbols())?;

        let summary = results.summary(self.config.test.alpha);
        info!(
            "{}: {} of {} genes significant ({} up, {} down)",
            coefficient, summary.significant, summary.total, summary.up, summary.down
        );

        Ok(DeStage {
            norm_factors,
            moderated,
            results,
        })
    }

    /// Genes called differentially expressed.
    pub fn significant_genes(&self, results: &DeResultSet) -> Vec<String> {
        significant_genes(results, &self.config.test)
    }

    /// Stage 5: DEG and background promoter overlap with each peak set.
    pub fn overlap(
        &self,
        results: &DeResultSet,
        annotation: &GeneAnnotation,
    ) -> Result<Vec<CategoryOverlap>> {
        promoter_overlap(results, annotation, &self.config.test, &self.config.epigenome)
    }

    /// Run all five stages and write outputs.
    pub fn run(&self) -> Result<AnalysisReport> {
        let out = &self.config.output_dir;
        fs::create_dir_all(out)?;
        let mut outputs = Vec::new();
        let mut written = |name: &str| {
            let path = out.join(name);
            outputs.push(path.clone());
            path
        };

        info!("Stage 1/5: counting");
        let counted = self.count()?;
        counted.counts.to_tsv(written("merged_counts.tsv"))?;
        if !counted.summaries.is_empty() {
            write_assignment_summary(&counted.summaries, written("counting_summary.tsv"))?;
        }

        info!("Stage 2/5: assembling tables");
        let assembled = self.assemble(&counted.counts)?;

        info!("Stage 3/5: normalization and exploration");
        let explored = self.explore(&assembled.set)?;
        fs::write(
            written("boxplot.svg"),
            boxplot_svg(&explored.box_stats, &explored.groups, &explored.expr.transformation),
        )?;
        fs::write(written("pca.svg"), pca_svg(&explored.pca, &explored.groups))?;

        info!("Stage 4/5: differential expression");
        let de = self.differential_expression(&assembled.set)?;
        de.results.to_tsv(written("de_results.tsv"))?;
        fs::write(
            written("volcano.svg"),
            volcano_svg(&de.results, self.config.test.alpha, self.config.test.volcano_labels),
        )?;

        let overlaps = if self.config.epigenome.enabled && !self.config.epigenome.categories.is_empty() {
            info!("Stage 5/5: promoter overlap with H3K4me3 peaks");
            let rows = self.overlap(&de.results, &assembled.annotation)?;
            write_overlap_tsv(&rows, written("overlap.tsv"))?;
            rows
        } else {
            info!("Stage 5/5: skipped");
            Vec::new()
        };

        let report_path = written("report.json");
        let report = AnalysisReport {
            name: self.config.name.clone(),
            n_samples: assembled.set.counts().n_samples(),
            n_genes_counted: counted.counts.n_genes(),
            n_unannotated: assembled.n_unannotated,
            n_filtered: assembled.n_filtered,
            n_genes_tested: de.results.len(),
            assignment: counted
                .summaries
                .iter()
                .map(|(sample_id, s)| SampleAssignment {
                    sample_id: sample_id.clone(),
                    total: s.total(),
                    assigned: s.get(ReadStatus::Assigned),
                    assigned_fraction: s.assigned_fraction(),
                })
                .collect(),
            norm_factors: assembled
                .set
                .counts()
                .sample_ids()
                .iter()
                .cloned()
                .zip(de.norm_factors.iter().copied())
                .collect(),
            pca_variance_explained: explored.pca.variance_explained.clone(),
            coefficient: de.results.coefficient.clone(),
            df_prior: de.moderated.df_prior,
            var_prior: de.moderated.var_prior,
            summary: de.results.summary(self.config.test.alpha),
            n_degs: self.significant_genes(&de.results).len(),
            overlaps,
            outputs,
        };
        write_report(&report, &report_path)?;
        info!("Wrote outputs to {}", out.display());
        Ok(report)
    }
}

/// Genes with adjusted p-value below `test.alpha` and an absolute log fold
/// change of at least `test.min_abs_log_fc`.
pub fn significant_genes(results: &DeResultSet, test: &TestConfig) -> Vec<String> {
    results
        .iter()
        .filter(|r| r.is_significant_at(test.alpha) && r.log_fc.abs() >= test.min_abs_log_fc)
        .map(|r| r.gene_id.clone())
        .collect()
}

/// Overlap of DEG promoters, and of the promoters of every tested gene,
/// with the peaks of each configured category.
pub fn promoter_overlap(
    results: &DeResultSet,
    annotation: &GeneAnnotation,
    test: &TestConfig,
    epigenome: &EpigenomeConfig,
) -> Result<Vec<CategoryOverlap>> {
    let degs = significant_genes(results, test);
    if degs.is_empty() {
        warn!("No significant genes; DEG overlap fractions are undefined");
    }
    let background: Vec<String> = results.iter().map(|r| r.gene_id.clone()).collect();

    let window = epigenome.promoter;
    let deg_promoters = promoters(annotation, &degs, window.upstream, window.downstream)?;
    let background_promoters =
        promoters(annotation, &background, window.upstream, window.downstream)?;

    let mut rows = Vec::with_capacity(epigenome.categories.len());
    for category in &epigenome.categories {
        let peaks = fetch_peaks(category, epigenome.cache_dir.as_deref())?;
        let row = CategoryOverlap::new(
            category.name(),
            category.epigenome_id().map(String::from),
            &deg_promoters,
            &background_promoters,
            &peaks,
        );
        info!(
            "{}: {}/{} DEG promoters overlap ({:.1}%), background {:.1}%",
            category,
            row.deg.n_overlapping,
            row.deg.n_promoters,
            100.0 * row.deg.fraction,
            100.0 * row.background.fraction
        );
        rows.push(row);
    }
    Ok(rows)
}

/// Feature index from a SAF file or a GTF.
pub fn load_features(path: &Path, config: &CountConfig) -> Result<FeatureIndex> {
    let name = path.to_string_lossy().to_lowercase();
    if name.ends_with(".saf") {
        FeatureIndex::from_saf(path)
    } else {
        FeatureIndex::from_gtf(path, &config.feature_type, &config.attribute)
    }
}

/// Gene annotation from a GTF or a TSV table, by file name.
pub fn load_annotation(path: &Path) -> Result<GeneAnnotation> {
    let name = path.to_string_lossy().to_lowercase();
    if name.ends_with(".gtf") || name.ends_with(".gtf.gz") {
        GeneAnnotation::from_gtf(path)
    } else {
        GeneAnnotation::from_tsv(path)
    }
}

/// One row per read status, one column per sample.
pub fn write_assignment_summary<P: AsRef<Path>>(
    summaries: &[(String, AssignmentSummary)],
    path: P,
) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    let header: Vec<&str> = summaries.iter().map(|(id, _)| id.as_str()).collect();
    writeln!(writer, "Status\t{}", header.join("\t"))?;
    for status in ReadStatus::ALL {
        let values: Vec<String> = summaries
            .iter()
            .map(|(_, s)| s.get(status).to_string())
            .collect();
        writeln!(writer, "{}\t{}", status.name(), values.join("\t"))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_report(report: &AnalysisReport, path: &Path) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}
