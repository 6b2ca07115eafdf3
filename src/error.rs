//! Error types for the neurodev-dge library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum DgeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid count value '{value}' at row {row}, column {col}")]
    InvalidCount {
        value: String,
        row: usize,
        col: usize,
    },

    #[error("Parse error in {source_name} line {line}: {reason}")]
    Parse {
        source_name: String,
        line: usize,
        reason: String,
    },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Sample ID mismatch: {0}")]
    SampleMismatch(String),

    #[error("Gene ID mismatch: {0}")]
    GeneMismatch(String),

    #[error("Missing column '{0}' in sample table")]
    MissingColumn(String),

    #[error("Invalid variable type for column '{column}': {reason}")]
    InvalidVariableType { column: String, reason: String },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Alignment file error: {0}")]
    Alignment(String),

    #[error("Download failed for {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl DgeError {
    /// Shorthand for a line-level parse error.
    pub fn parse(source_name: impl Into<String>, line: usize, reason: impl Into<String>) -> Self {
        DgeError::Parse {
            source_name: source_name.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, DgeError>;
