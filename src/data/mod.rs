//! Data structures for differential expression analysis.

mod annotation;
mod count_matrix;
mod design_matrix;
pub mod gtf;
mod result;
mod samples;

pub use annotation::{strip_version, GeneAnnotation, GeneRecord};
pub use count_matrix::CountMatrix;
pub use design_matrix::{DesignMatrix, DesignSpec};
pub use result::{DeResult, DeResultSet, Regulation, ResultSummary};
pub use samples::{SampleTable, Variable, VariableType};
