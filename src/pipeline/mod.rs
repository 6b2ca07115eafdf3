//! Configuration and execution of the five-stage analysis.

pub mod config;
mod runner;

pub use config::{
    AnalysisConfig, EpigenomeConfig, ExploreConfig, GroupDerivation, InputConfig, SampleInput,
    TestConfig,
};
pub use runner::{
    load_annotation, load_features, promoter_overlap, significant_genes, write_assignment_summary,
    Analysis, AnalysisReport, AssembleStage, CountStage, DeStage, ExploreStage, SampleAssignment,
};
