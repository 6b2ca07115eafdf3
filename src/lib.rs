//! Fetal vs. adult brain RNA-seq differential expression
//!
//! This library runs an exploratory differential-expression analysis of
//! fetal and adult human brain samples, followed by an overlap check of
//! DEG promoters against Roadmap Epigenomics H3K4me3 peaks.
//!
//! # Overview
//!
//! The analysis runs in five stages, each backed by a module:
//!
//! - **count**: featureCounts-style read assignment from BAM files
//! - **assemble**: merge per-sample counts, annotate, filter, attach metadata
//! - **normalize** / **explore**: log2 counts, TMM + logCPM, boxplots, PCA
//! - **model** / **test** / **correct**: linear model, empirical Bayes
//!   moderated t, Benjamini-Hochberg
//! - **epigenome**: promoter windows and peak overlap per tissue
//!
//! plus the shared **data** and **genomic** types and the **pipeline**
//! that chains the stages from a YAML configuration.
//!
//! # Example
//!
//! ```no_run
//! use neurodev_dge::prelude::*;
//!
//! let config = AnalysisConfig::from_file("analysis.yaml").unwrap();
//! let report = Analysis::new(config).unwrap().run().unwrap();
//! println!("{} DEGs", report.n_degs);
//! ```

pub mod assemble;
pub mod correct;
pub mod count;
pub mod data;
pub mod epigenome;
pub mod error;
pub mod explore;
pub mod genomic;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod test;

pub use error::{DgeError, Result};

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::assemble::{
        join_annotation, merge_counts, merge_sample_counts, ExpressionFilter, ExpressionSet,
    };
    pub use crate::correct::{correct_bh, correct_bh_moderated, create_results, BhCorrected};
    pub use crate::count::{count_bam, AssignmentSummary, CountConfig, FeatureIndex, Strandedness};
    pub use crate::data::{
        CountMatrix, DeResult, DeResultSet, DesignMatrix, DesignSpec, GeneAnnotation, SampleTable,
    };
    pub use crate::epigenome::{
        fetch_peaks, overlap_fraction, promoters, read_peaks, CategoryOverlap, EpigenomeCategory,
        OverlapSummary,
    };
    pub use crate::error::{DgeError, Result};
    pub use crate::explore::{box_stats, pca, BoxStats, PcaResult};
    pub use crate::genomic::{GenomicInterval, IntervalSet, Strand};
    pub use crate::model::{model_lm, squeeze_var, LmFit};
    pub use crate::normalize::{log2_counts, log_cpm, normalize, tmm_factors, ExpressionMatrix, NormalizeConfig};
    pub use crate::pipeline::{Analysis, AnalysisConfig, AnalysisReport};
    pub use crate::test::{test_moderated, ModeratedResult};
}
