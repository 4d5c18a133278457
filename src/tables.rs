//! Row and table containers shared by the pipeline stages. `FeatureRow` keeps
//! feature names and values in one ordered sequence so headers can never drift
//! out of step with the data; `NumTable` is the width-capped numeric activity
//! matrix a week numericizes into.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::ops::Index;

use serde::{Deserialize, Serialize};

/// An ordered name -> value sequence, built incrementally, serialized to a
/// fixed column order at the end.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRow {
    cols: Vec<(String, f64)>,
}

impl FeatureRow {
    pub fn new() -> FeatureRow {
        FeatureRow { cols: Vec::new() }
    }

    pub fn push(&mut self, name: impl Into<String>, value: f64) {
        self.cols.push((name.into(), value));
    }

    pub fn append(&mut self, mut other: FeatureRow) {
        self.cols.append(&mut other.cols);
    }

    pub fn len(&self) -> usize {
        self.cols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.cols.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.cols.iter().map(|(_, v)| *v).collect()
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.cols.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

/// Non-numeric sidecar kept with every numeric row: the raw activity id, the
/// PC the event happened on, and the epoch timestamp. Session reconstruction
/// and unit windows need them; the feature columns stay purely numeric.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowMeta {
    pub act_id: String,
    pub pc: String,
    pub epoch: i64,
}

#[derive(Debug)]
pub enum TableError {
    InvalidRowSize { expected: usize, got: usize },
    UnknownColumn(String),
}

impl Display for TableError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::InvalidRowSize { expected, got } => {
                write!(f, "invalid row size: expected {expected}, got {got}")
            }
            TableError::UnknownColumn(name) => write!(f, "unknown column '{name}'"),
        }
    }
}

impl Error for TableError {}

/// Fixed-width numeric activity table for one week. Every row push is checked
/// against the declared width, so a schema-version mismatch surfaces at the
/// first row instead of as a ragged artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumTable {
    pub columns: Vec<String>,
    rows: Vec<Vec<i64>>,
    pub meta: Vec<RowMeta>,
}

impl NumTable {
    pub fn new(columns: Vec<String>) -> NumTable {
        NumTable {
            columns,
            rows: Vec::new(),
            meta: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push_row(&mut self, row: Vec<i64>, meta: RowMeta) -> Result<(), TableError> {
        if row.len() != self.width() {
            return Err(TableError::InvalidRowSize {
                expected: self.width(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        self.meta.push(meta);
        Ok(())
    }

    pub fn col(&self, name: &str) -> Result<usize, TableError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    /// Column value of one row, by name. Panics on an unknown column; callers
    /// resolve names through the schema's column catalog.
    pub fn value(&self, row: usize, name: &str) -> i64 {
        let c = self
            .columns
            .iter()
            .position(|c| c == name)
            .unwrap_or_else(|| panic!("unknown column '{name}'"));
        self.rows[row][c]
    }
}

impl Index<usize> for NumTable {
    type Output = Vec<i64>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.rows[index]
    }
}

/// An assembled per-unit feature table: one header, f64 rows. Output of the
/// granularity assembler, input of the temporal transforms and the CSV writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureTable {
    pub names: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn new(names: Vec<String>) -> FeatureTable {
        FeatureTable {
            names,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: FeatureRow) -> Result<(), TableError> {
        if self.names.is_empty() {
            self.names = row.names();
        } else if row.len() != self.names.len() {
            return Err(TableError::InvalidRowSize {
                expected: self.names.len(),
                got: row.len(),
            });
        }
        self.rows.push(row.values());
        Ok(())
    }

    pub fn push_values(&mut self, row: Vec<f64>) -> Result<(), TableError> {
        if row.len() != self.names.len() {
            return Err(TableError::InvalidRowSize {
                expected: self.names.len(),
                got: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn col(&self, name: &str) -> Result<usize, TableError> {
        self.names
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feature_row_keeps_order() {
        let mut row = FeatureRow::new();
        row.push("b", 2.0);
        row.push("a", 1.0);
        assert_eq!(row.names(), vec!["b", "a"]);
        assert_eq!(row.values(), vec![2.0, 1.0]);
        assert_eq!(row.get("a"), Some(1.0));
        assert_eq!(row.get("z"), None);
    }

    #[test]
    fn num_table_rejects_ragged_rows() {
        let mut t = NumTable::new(vec!["a".into(), "b".into()]);
        let meta = RowMeta {
            act_id: "X1".into(),
            pc: "PC-1".into(),
            epoch: 0,
        };
        assert!(t.push_row(vec![1, 2], meta.clone()).is_ok());
        assert!(t.push_row(vec![1, 2, 3], meta).is_err());
        assert_eq!(t.len(), 1);
        assert_eq!(t.value(0, "b"), 2);
    }

    #[test]
    fn feature_table_adopts_first_header() {
        let mut t = FeatureTable::new(Vec::new());
        let mut r = FeatureRow::new();
        r.push("x", 1.0);
        r.push("y", 2.0);
        t.push(r).unwrap();
        assert_eq!(t.names, vec!["x", "y"]);
        let mut short = FeatureRow::new();
        short.push("x", 3.0);
        assert!(t.push(short).is_err());
    }
}
