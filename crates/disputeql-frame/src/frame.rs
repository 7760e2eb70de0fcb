//! Column-oriented in-memory table

use crate::value::{Value, ValueKey};
use crate::FrameError;
use serde::Serialize;
use std::collections::HashSet;

/// A named column of values
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Distinct non-null values in first-appearance order
    pub fn distinct(&self) -> Vec<Value> {
        let mut seen: HashSet<ValueKey> = HashSet::new();
        self.values
            .iter()
            .filter(|v| !v.is_null())
            .filter(|v| seen.insert(v.key()))
            .cloned()
            .collect()
    }

    /// True when every non-null value is a date or timestamp and at least one exists
    pub fn is_temporal(&self) -> bool {
        let mut any = false;
        for value in self.values.iter().filter(|v| !v.is_null()) {
            if !value.is_temporal() {
                return false;
            }
            any = true;
        }
        any
    }
}

/// An ordered collection of equally long columns
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataFrame {
    columns: Vec<Column>,
    height: usize,
}

impl DataFrame {
    pub fn new(columns: Vec<Column>) -> Result<Self, FrameError> {
        let height = columns.first().map(Column::len).unwrap_or(0);

        let mut names = HashSet::new();
        for column in &columns {
            if column.len() != height {
                return Err(FrameError::LengthMismatch {
                    column: column.name.clone(),
                    expected: height,
                    actual: column.len(),
                });
            }
            if !names.insert(column.name.as_str()) {
                return Err(FrameError::DuplicateColumn(column.name.clone()));
            }
        }

        Ok(Self { columns, height })
    }

    /// Frame with the given columns and no rows
    pub fn empty(names: &[&str]) -> Self {
        Self {
            columns: names.iter().map(|n| Column::new(*n, Vec::new())).collect(),
            height: 0,
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn value(&self, row: usize, column: usize) -> Option<&Value> {
        self.columns.get(column).and_then(|c| c.values.get(row))
    }

    /// Materialize a subset of rows and columns, both given by position
    pub fn select(&self, rows: &[usize], columns: &[usize]) -> DataFrame {
        let columns = columns
            .iter()
            .filter_map(|&c| self.columns.get(c))
            .map(|c| Column {
                name: c.name.clone(),
                values: rows
                    .iter()
                    .map(|&r| c.values.get(r).cloned().unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();

        DataFrame {
            columns,
            height: rows.len(),
        }
    }

    /// Materialize a subset of rows with every column
    pub fn take(&self, rows: &[usize]) -> DataFrame {
        let all: Vec<usize> = (0..self.columns.len()).collect();
        self.select(rows, &all)
    }

    pub fn head(&self, n: usize) -> DataFrame {
        let rows: Vec<usize> = (0..self.height.min(n)).collect();
        self.take(&rows)
    }

    /// Convert to the `{columns, rows, row_count}` JSON shape
    pub fn to_json(&self) -> serde_json::Value {
        let rows: Vec<serde_json::Value> = (0..self.height)
            .map(|r| {
                serde_json::Value::Array(
                    self.columns
                        .iter()
                        .map(|c| serde_json::to_value(&c.values[r]).unwrap_or(serde_json::Value::Null))
                        .collect(),
                )
            })
            .collect();

        serde_json::json!({
            "columns": self.column_names(),
            "rows": rows,
            "row_count": self.height,
        })
    }
}

impl Serialize for DataFrame {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}
