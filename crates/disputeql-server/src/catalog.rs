//! Schema description of the combined dispute dataset

use disputeql_frame::{DataFrame, Value};
use serde::{Deserialize, Serialize};

/// Column holding the classifier's category per dispute
pub const CATEGORY_COLUMN: &str = "predicted_category";
/// Column holding the resolution action per dispute
pub const ACTION_COLUMN: &str = "suggested_action";
/// Date columns that are always advertised, present or not
pub const DATE_COLUMNS: [&str; 2] = ["created_at", "timestamp"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaDescription {
    pub columns: Vec<String>,
    pub categories: Vec<String>,
    pub actions: Vec<String>,
    pub date_columns: Vec<String>,
}

impl SchemaDescription {
    /// Derive the description from the dataset; never fails
    pub fn describe(dataset: &DataFrame) -> Self {
        let distinct = |name: &str| -> Vec<String> {
            dataset
                .column(name)
                .map(|column| column.distinct().iter().map(Value::to_string).collect())
                .unwrap_or_default()
        };

        let mut date_columns: Vec<String> = DATE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for column in dataset.columns() {
            if column.is_temporal() && !date_columns.contains(&column.name) {
                date_columns.push(column.name.clone());
            }
        }

        Self {
            columns: dataset.column_names().iter().map(|c| c.to_string()).collect(),
            categories: distinct(CATEGORY_COLUMN),
            actions: distinct(ACTION_COLUMN),
            date_columns,
        }
    }

    pub fn to_markdown(&self) -> String {
        let bullets = |items: &[String]| -> String {
            if items.is_empty() {
                "- (none)\n".to_string()
            } else {
                items.iter().map(|item| format!("- `{}`\n", item)).collect()
            }
        };

        format!(
            "## Dataset `df_combined`\n\n### Columns ({})\n{}\n### Categories\n{}\n### Suggested actions\n{}\n### Date columns\n{}",
            self.columns.len(),
            bullets(&self.columns),
            bullets(&self.categories),
            bullets(&self.actions),
            bullets(&self.date_columns),
        )
    }
}
