//! Design matrix construction for a two-group comparison with covariates.

use crate::data::{SampleTable, Variable, VariableType};
use crate::error::{DgeError, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which sample-table columns enter the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesignSpec {
    /// Two-level factor defining the comparison (e.g. `age_group`).
    pub group: String,
    /// Reference level of the group; alphabetically first when absent.
    #[serde(default)]
    pub reference: Option<String>,
    /// Additional adjustment variables (e.g. `RIN`, `sex`).
    #[serde(default)]
    pub covariates: Vec<String>,
}

impl DesignSpec {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            reference: None,
            covariates: Vec::new(),
        }
    }

    pub fn with_reference(mut self, level: impl Into<String>) -> Self {
        self.reference = Some(level.into());
        self
    }

    pub fn with_covariate(mut self, column: impl Into<String>) -> Self {
        self.covariates.push(column.into());
        self
    }
}

/// A design matrix for linear modeling.
#[derive(Debug, Clone)]
pub struct DesignMatrix {
    /// The design matrix (samples × coefficients).
    matrix: DMatrix<f64>,
    /// Names of the coefficients (columns).
    coefficient_names: Vec<String>,
    /// Sample IDs (rows).
    sample_ids: Vec<String>,
    /// Reference levels for categorical variables.
    reference_levels: HashMap<String, String>,
    /// Column holding the group effect.
    group_coefficient: usize,
}

impl DesignMatrix {
    /// Create a design matrix directly from components.
    ///
    /// `group_coefficient` names the column tested by default.
    pub fn from_matrix(
        matrix: DMatrix<f64>,
        coefficient_names: Vec<String>,
        sample_ids: Vec<String>,
        group_coefficient: usize,
    ) -> Result<Self> {
        if coefficient_names.len() != matrix.ncols() {
            return Err(DgeError::DimensionMismatch {
                expected: matrix.ncols(),
                actual: coefficient_names.len(),
            });
        }
        if sample_ids.len() != matrix.nrows() {
            return Err(DgeError::DimensionMismatch {
                expected: matrix.nrows(),
                actual: sample_ids.len(),
            });
        }
        if group_coefficient >= matrix.ncols() {
            return Err(DgeError::InvalidParameter(format!(
                "Coefficient index {} out of bounds",
                group_coefficient
            )));
        }
        Ok(Self {
            matrix,
            coefficient_names,
            sample_ids,
            reference_levels: HashMap::new(),
            group_coefficient,
        })
    }

    /// Build `~ group + covariates` from the sample table.
    ///
    /// The group must have exactly two observed levels. Continuous covariates
    /// enter as-is; categorical ones are dummy-coded against their
    /// alphabetically first level. Missing values are rejected.
    pub fn from_spec(samples: &SampleTable, spec: &DesignSpec) -> Result<Self> {
        let sample_ids = samples.sample_ids().to_vec();
        let n_samples = sample_ids.len();

        let mut coefficient_names = vec!["(Intercept)".to_string()];
        let mut columns: Vec<Vec<f64>> = vec![vec![1.0; n_samples]];
        let mut reference_levels = HashMap::new();

        // Group factor
        let group_values = Self::complete_column(samples, &spec.group)?;
        let levels = samples.levels(&spec.group)?;
        if levels.len() != 2 {
            return Err(DgeError::InvalidVariableType {
                column: spec.group.clone(),
                reason: format!("expected exactly 2 levels, found {:?}", levels),
            });
        }
        let reference = match &spec.reference {
            Some(level) if levels.contains(level) => level.clone(),
            Some(level) => {
                return Err(DgeError::InvalidParameter(format!(
                    "Level '{}' not found for variable '{}'",
                    level, spec.group
                )))
            }
            None => levels[0].clone(),
        };
        let target = levels
            .iter()
            .find(|l| **l != reference)
            .cloned()
            .unwrap_or_default();
        coefficient_names.push(format!("{}{}", spec.group, target));
        columns.push(Self::dummy(&group_values, &target));
        reference_levels.insert(spec.group.clone(), reference);

        // Covariates
        for covariate in &spec.covariates {
            if covariate == &spec.group {
                continue;
            }
            let values = Self::complete_column(samples, covariate)?;
            match samples.column_type(covariate) {
                Some(VariableType::Continuous) | Some(VariableType::Ordinal) => {
                    coefficient_names.push(covariate.clone());
                    columns.push(values.iter().filter_map(|v| v.as_f64()).collect());
                }
                Some(VariableType::Categorical) | None => {
                    let levels = samples.levels(covariate)?;
                    let Some((reference, rest)) = levels.split_first() else {
                        continue;
                    };
                    reference_levels.insert(covariate.clone(), reference.clone());
                    for level in rest {
                        coefficient_names.push(format!("{}{}", covariate, level));
                        columns.push(Self::dummy(&values, level));
                    }
                }
            }
        }

        let mut matrix = DMatrix::zeros(n_samples, columns.len());
        for (col_idx, col) in columns.iter().enumerate() {
            for (row_idx, &val) in col.iter().enumerate() {
                matrix[(row_idx, col_idx)] = val;
            }
        }

        Ok(Self {
            matrix,
            coefficient_names,
            sample_ids,
            reference_levels,
            group_coefficient: 1,
        })
    }

    fn complete_column<'a>(samples: &'a SampleTable, column: &str) -> Result<Vec<&'a Variable>> {
        let values = samples.column(column)?;
        if let Some(pos) = values.iter().position(|v| v.is_missing()) {
            return Err(DgeError::InvalidVariableType {
                column: column.to_string(),
                reason: format!("missing value for sample '{}'", samples.sample_ids()[pos]),
            });
        }
        Ok(values)
    }

    fn dummy(values: &[&Variable], level: &str) -> Vec<f64> {
        values
            .iter()
            .map(|v| if v.as_categorical() == Some(level) { 1.0 } else { 0.0 })
            .collect()
    }

    /// Get the design matrix.
    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Get coefficient names.
    pub fn coefficient_names(&self) -> &[String] {
        &self.coefficient_names
    }

    /// Get sample IDs.
    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    /// Number of samples (rows).
    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    /// Number of coefficients (columns).
    pub fn n_coefficients(&self) -> usize {
        self.matrix.ncols()
    }

    /// Get the reference level for a categorical variable.
    pub fn reference_level(&self, variable: &str) -> Option<&str> {
        self.reference_levels.get(variable).map(|s| s.as_str())
    }

    /// Get the index of a coefficient by name.
    pub fn coefficient_index(&self, name: &str) -> Option<usize> {
        self.coefficient_names.iter().position(|n| n == name)
    }

    /// Index of the group-effect coefficient.
    pub fn group_coefficient(&self) -> usize {
        self.group_coefficient
    }

    /// Name of the group-effect coefficient.
    pub fn group_coefficient_name(&self) -> &str {
        &self.coefficient_names[self.group_coefficient]
    }
}
