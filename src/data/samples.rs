//! Sample metadata (phenotype table) handling.

use crate::error::{DgeError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A single cell of the sample table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Variable {
    /// Categorical value such as sex or race.
    Categorical(String),
    /// Continuous value such as age or RIN.
    Continuous(f64),
    /// Integer-ranked value.
    Ordinal(i64),
    /// Missing value.
    Missing,
}

impl Variable {
    pub fn is_missing(&self) -> bool {
        matches!(self, Variable::Missing)
    }

    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            Variable::Categorical(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view of continuous and ordinal values.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Variable::Continuous(v) => Some(*v),
            Variable::Ordinal(v) => Some(*v as f64),
            _ => None,
        }
    }
}

/// Type hint for columns when loading the sample table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VariableType {
    Categorical,
    Continuous,
    Ordinal,
}

fn is_na(raw: &str) -> bool {
    raw.is_empty() || raw.eq_ignore_ascii_case("na") || raw.eq_ignore_ascii_case("nan")
}

fn parse_cell(raw: &str, var_type: VariableType) -> Variable {
    let raw = raw.trim();
    if is_na(raw) {
        return Variable::Missing;
    }
    match var_type {
        VariableType::Continuous => raw
            .parse::<f64>()
            .map(Variable::Continuous)
            .unwrap_or(Variable::Missing),
        VariableType::Ordinal => raw
            .parse::<i64>()
            .map(Variable::Ordinal)
            .unwrap_or(Variable::Missing),
        VariableType::Categorical => Variable::Categorical(raw.to_string()),
    }
}

/// Experiment-level annotations, one row per sample.
///
/// Typical columns are age, age group, sex, RIN, race and mapping
/// statistics. Rows are keyed by sample identifier and joined to the count
/// matrix through [`SampleTable::align_to`].
#[derive(Debug, Clone)]
pub struct SampleTable {
    sample_ids: Vec<String>,
    column_names: Vec<String>,
    /// sample_id -> column_name -> value
    data: HashMap<String, HashMap<String, Variable>>,
    column_types: HashMap<String, VariableType>,
    /// Raw text cells, kept so type hints can re-parse losslessly.
    raw: HashMap<String, HashMap<String, String>>,
}

impl SampleTable {
    /// Load a sample table from a TSV file.
    ///
    /// The first column holds sample IDs. Columns whose values all parse as
    /// numbers (ignoring `NA`/empty) are continuous, the rest categorical.
    pub fn from_tsv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut lines = BufReader::new(file).lines();

        let header_line = lines
            .next()
            .ok_or_else(|| DgeError::EmptyData("Empty sample table".to_string()))??;
        let header: Vec<&str> = header_line.split('\t').collect();
        if header.len() < 2 {
            return Err(DgeError::EmptyData(
                "Sample table must have at least one variable column".to_string(),
            ));
        }
        let column_names: Vec<String> = header[1..].iter().map(|s| s.trim().to_string()).collect();

        let mut rows: Vec<(String, Vec<String>)> = Vec::new();
        for line_result in lines {
            let line = line_result?;
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            let values = fields[1..].iter().map(|s| s.trim().to_string()).collect();
            rows.push((fields[0].trim().to_string(), values));
        }

        if rows.is_empty() {
            return Err(DgeError::EmptyData("No samples in sample table".to_string()));
        }

        let mut table = Self {
            sample_ids: Vec::with_capacity(rows.len()),
            column_names: Vec::new(),
            data: HashMap::new(),
            column_types: HashMap::new(),
            raw: HashMap::new(),
        };
        for (sample_id, _) in &rows {
            if table.raw.contains_key(sample_id) {
                return Err(DgeError::SampleMismatch(format!(
                    "Sample '{}' listed twice in sample table",
                    sample_id
                )));
            }
            table.sample_ids.push(sample_id.clone());
            table.raw.insert(sample_id.clone(), HashMap::new());
        }

        for (col_idx, col_name) in column_names.iter().enumerate() {
            let cells: Vec<String> = rows
                .iter()
                .map(|(_, values)| values.get(col_idx).cloned().unwrap_or_default())
                .collect();
            let all_numeric = cells
                .iter()
                .all(|v| is_na(v) || v.parse::<f64>().is_ok());
            let var_type = if all_numeric {
                VariableType::Continuous
            } else {
                VariableType::Categorical
            };
            let ids = table.sample_ids.clone();
            table.insert_column(col_name, var_type, ids.iter().zip(cells))?;
        }

        Ok(table)
    }

    fn insert_column<'a, I>(&mut self, name: &str, var_type: VariableType, cells: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'a String, String)>,
    {
        if !self.column_names.iter().any(|c| c == name) {
            self.column_names.push(name.to_string());
        }
        self.column_types.insert(name.to_string(), var_type);
        for (sample_id, raw) in cells {
            let value = parse_cell(&raw, var_type);
            self.data
                .entry(sample_id.clone())
                .or_default()
                .insert(name.to_string(), value);
            self.raw
                .entry(sample_id.clone())
                .or_default()
                .insert(name.to_string(), raw);
        }
        Ok(())
    }

    /// Override inferred types for specific columns.
    pub fn with_column_types(mut self, types: &HashMap<String, VariableType>) -> Result<Self> {
        for (col_name, var_type) in types {
            if !self.has_column(col_name) {
                return Err(DgeError::MissingColumn(col_name.clone()));
            }
            self.column_types.insert(col_name.clone(), *var_type);
            for sample_id in &self.sample_ids {
                let raw = self
                    .raw
                    .get(sample_id)
                    .and_then(|m| m.get(col_name))
                    .cloned()
                    .unwrap_or_default();
                if let Some(row) = self.data.get_mut(sample_id) {
                    row.insert(col_name.clone(), parse_cell(&raw, *var_type));
                }
            }
        }
        Ok(self)
    }

    /// Add a categorical column by thresholding a numeric one.
    ///
    /// Samples with `source < threshold` get `below`, the others `at_or_above`.
    /// This is how an age-group factor (`fetal` for negative ages in
    /// post-conception-adjusted years, `adult` otherwise) is derived.
    pub fn derive_group_from_threshold(
        mut self,
        source: &str,
        target: &str,
        threshold: f64,
        below: &str,
        at_or_above: &str,
    ) -> Result<Self> {
        let values: Vec<Option<f64>> = self.column(source)?.iter().map(|v| v.as_f64()).collect();
        if self.column_type(source) == Some(VariableType::Categorical) {
            return Err(DgeError::InvalidVariableType {
                column: source.to_string(),
                reason: "threshold grouping needs a numeric column".to_string(),
            });
        }
        let labels: Vec<String> = values
            .iter()
            .map(|v| match v {
                Some(x) if *x < threshold => below.to_string(),
                Some(_) => at_or_above.to_string(),
                None => String::new(),
            })
            .collect();
        let ids = self.sample_ids.clone();
        self.insert_column(target, VariableType::Categorical, ids.iter().zip(labels))?;
        Ok(self)
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn n_columns(&self) -> usize {
        self.column_names.len()
    }

    /// Value for a specific sample and column.
    pub fn get(&self, sample_id: &str, column: &str) -> Option<&Variable> {
        self.data.get(sample_id).and_then(|m| m.get(column))
    }

    /// All values of a column, in sample order.
    pub fn column(&self, column: &str) -> Result<Vec<&Variable>> {
        if !self.has_column(column) {
            return Err(DgeError::MissingColumn(column.to_string()));
        }
        Ok(self
            .sample_ids
            .iter()
            .map(|sid| {
                self.data
                    .get(sid)
                    .and_then(|m| m.get(column))
                    .unwrap_or(&Variable::Missing)
            })
            .collect())
    }

    /// Categorical labels of a column as strings (missing values become empty).
    pub fn labels(&self, column: &str) -> Result<Vec<String>> {
        Ok(self
            .column(column)?
            .iter()
            .map(|v| match v {
                Variable::Categorical(s) => s.clone(),
                Variable::Continuous(x) => x.to_string(),
                Variable::Ordinal(x) => x.to_string(),
                Variable::Missing => String::new(),
            })
            .collect())
    }

    pub fn column_type(&self, column: &str) -> Option<VariableType> {
        self.column_types.get(column).copied()
    }

    /// Sorted distinct levels of a categorical column.
    pub fn levels(&self, column: &str) -> Result<Vec<String>> {
        let levels: BTreeSet<String> = self
            .column(column)?
            .iter()
            .filter_map(|v| v.as_categorical().map(String::from))
            .collect();
        Ok(levels.into_iter().collect())
    }

    /// Reorder (and subset) the table to match the given sample order.
    ///
    /// Every requested sample must be present.
    pub fn align_to(&self, sample_ids: &[String]) -> Result<Self> {
        let mut aligned = Self {
            sample_ids: Vec::with_capacity(sample_ids.len()),
            column_names: self.column_names.clone(),
            data: HashMap::new(),
            column_types: self.column_types.clone(),
            raw: HashMap::new(),
        };
        for sid in sample_ids {
            let row = self.data.get(sid).ok_or_else(|| {
                DgeError::SampleMismatch(format!("Sample '{}' not found in sample table", sid))
            })?;
            aligned.sample_ids.push(sid.clone());
            aligned.data.insert(sid.clone(), row.clone());
            if let Some(raw) = self.raw.get(sid) {
                aligned.raw.insert(sid.clone(), raw.clone());
            }
        }
        Ok(aligned)
    }

    pub fn has_sample(&self, sample_id: &str) -> bool {
        self.data.contains_key(sample_id)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_names.iter().any(|c| c == column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_test_tsv() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "sample_id\tage\tsex\tRIN\trace").unwrap();
        writeln!(file, "SRR1\t-0.38\tmale\t8.3\tAA").unwrap();
        writeln!(file, "SRR2\t44.2\tfemale\t7.1\tAA").unwrap();
        writeln!(file, "SRR3\t-0.5\tfemale\t9.0\tHISP").unwrap();
        writeln!(file, "SRR4\t36.1\tmale\tNA\tAA").unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_load_sample_table() {
        let file = create_test_tsv();
        let table = SampleTable::from_tsv(file.path()).unwrap();

        assert_eq!(table.n_samples(), 4);
        assert_eq!(table.column_names(), &["age", "sex", "RIN", "race"]);
        assert_eq!(table.column_type("age"), Some(VariableType::Continuous));
        assert_eq!(table.column_type("sex"), Some(VariableType::Categorical));
        assert!(table.get("SRR4", "RIN").unwrap().is_missing());
    }

    #[test]
    fn test_derive_age_group() {
        let file = create_test_tsv();
        let table = SampleTable::from_tsv(file.path())
            .unwrap()
            .derive_group_from_threshold("age", "age_group", 0.0, "fetal", "adult")
            .unwrap();

        assert_eq!(
            table.labels("age_group").unwrap(),
            vec!["fetal", "adult", "fetal", "adult"]
        );
        assert_eq!(table.levels("age_group").unwrap(), vec!["adult", "fetal"]);
    }

    #[test]
    fn test_derive_from_categorical_fails() {
        let file = create_test_tsv();
        let table = SampleTable::from_tsv(file.path()).unwrap();
        assert!(table
            .derive_group_from_threshold("sex", "x", 0.0, "a", "b")
            .is_err());
    }

    #[test]
    fn test_with_column_types() {
        let file = create_test_tsv();
        let mut types = HashMap::new();
        types.insert("RIN".to_string(), VariableType::Categorical);
        let table = SampleTable::from_tsv(file.path())
            .unwrap()
            .with_column_types(&types)
            .unwrap();

        assert_eq!(table.get("SRR1", "RIN").unwrap().as_categorical(), Some("8.3"));
    }

    #[test]
    fn test_align_to_reorders() {
        let file = create_test_tsv();
        let table = SampleTable::from_tsv(file.path()).unwrap();
        let aligned = table
            .align_to(&["SRR3".to_string(), "SRR1".to_string()])
            .unwrap();

        assert_eq!(aligned.sample_ids(), &["SRR3", "SRR1"]);
        assert_eq!(aligned.labels("race").unwrap(), vec!["HISP", "AA"]);
    }

    #[test]
    fn test_align_to_missing_sample() {
        let file = create_test_tsv();
        let table = SampleTable::from_tsv(file.path()).unwrap();
        assert!(table.align_to(&["SRR9".to_string()]).is_err());
    }
}
