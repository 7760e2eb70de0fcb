//! Results produced by executing a query

use disputeql_frame::{Column, DataFrame, Value};
use serde::Serialize;

/// Series indexed by group labels
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupedSeries {
    /// `count`, `proportion`, `size` or the aggregated column
    pub name: String,
    /// Names of the grouping keys, one per label component
    pub keys: Vec<String>,
    pub labels: Vec<Vec<Value>>,
    pub values: Vec<Value>,
}

impl GroupedSeries {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Label rendered for display; composite keys are joined with ", "
    pub fn label_text(&self, i: usize) -> String {
        self.labels
            .get(i)
            .map(|parts| {
                parts
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default()
    }

    pub(crate) fn slice(mut self, start: usize, end: usize) -> Self {
        let end = end.min(self.values.len());
        let start = start.min(end);
        self.labels = self.labels.drain(start..end).collect();
        self.values = self.values.drain(start..end).collect();
        self
    }
}

/// Execution result, classified by shape
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum QueryOutput {
    Table(DataFrame),
    Series(Column),
    Grouped(GroupedSeries),
    Scalar(Value),
}

impl QueryOutput {
    pub fn kind(&self) -> &'static str {
        match self {
            QueryOutput::Table(_) => "table",
            QueryOutput::Series(_) => "series",
            QueryOutput::Grouped(_) => "grouped",
            QueryOutput::Scalar(_) => "scalar",
        }
    }

    /// Number of rows or entries; 1 for scalars
    pub fn len(&self) -> usize {
        match self {
            QueryOutput::Table(df) => df.height(),
            QueryOutput::Series(column) => column.len(),
            QueryOutput::Grouped(grouped) => grouped.len(),
            QueryOutput::Scalar(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
