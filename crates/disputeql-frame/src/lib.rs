//! In-memory tabular data for disputeql
//!
//! Holds the combined disputes dataset: typed cell values, a column-oriented
//! frame, CSV loading and the left joins that assemble the four sources.

pub mod frame;
pub mod join;
pub mod loader;
pub mod value;

pub use frame::{Column, DataFrame};
pub use join::left_join;
pub use loader::{load_combined, read_csv, DataSources};
pub use value::{parse_datetime, Value, ValueKey};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Column '{column}' has {actual} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("Join key '{column}' missing from {side} table")]
    MissingKey { column: String, side: String },

    #[error("Column '{column}' has an unparseable date: '{value}'")]
    InvalidDate { column: String, value: String },
}
