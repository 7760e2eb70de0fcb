//! CSV sources and the combined disputes dataset

use crate::frame::{Column, DataFrame};
use crate::join::{left_join, DEFAULT_SUFFIXES};
use crate::value::{parse_datetime, Value};
use crate::FrameError;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Cell spellings read as missing values
pub const NA_VALUES: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// Locations of the four CSV sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSources {
    pub disputes: PathBuf,
    pub transactions: PathBuf,
    pub classified: PathBuf,
    pub resolutions: PathBuf,
}

impl Default for DataSources {
    fn default() -> Self {
        Self::in_dir("data")
    }
}

impl DataSources {
    /// Standard file names under a single directory
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            disputes: dir.join("disputes.csv"),
            transactions: dir.join("transactions.csv"),
            classified: dir.join("classified_disputes.csv"),
            resolutions: dir.join("resolutions.csv"),
        }
    }
}

/// Read a CSV file, parsing the named columns as timestamps
pub fn read_csv(path: impl AsRef<Path>, date_columns: &[&str]) -> Result<DataFrame, FrameError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|source| FrameError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let df = parse_csv(file, date_columns)?;
    debug!(path = %path.display(), rows = df.height(), "Read CSV source");
    Ok(df)
}

/// Parse CSV text from any reader
pub fn parse_csv<R: io::Read>(reader: R, date_columns: &[&str]) -> Result<DataFrame, FrameError> {
    let mut reader = csv::Reader::from_reader(reader);
    let headers = reader.headers()?.clone();

    let mut raw: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
    for record in reader.records() {
        let record = record?;
        for (i, cells) in raw.iter_mut().enumerate() {
            cells.push(record.get(i).unwrap_or("").to_string());
        }
    }

    let columns = headers
        .iter()
        .zip(raw)
        .map(|(name, cells)| {
            let values = if date_columns.contains(&name) {
                parse_date_column(name, &cells)?
            } else {
                infer_column(&cells)
            };
            Ok(Column::new(name, values))
        })
        .collect::<Result<Vec<_>, FrameError>>()?;

    DataFrame::new(columns)
}

fn is_na(cell: &str) -> bool {
    NA_VALUES.contains(&cell)
}

fn parse_date_column(name: &str, cells: &[String]) -> Result<Vec<Value>, FrameError> {
    cells
        .iter()
        .map(|cell| {
            if is_na(cell) {
                return Ok(Value::Null);
            }
            parse_datetime(cell)
                .map(Value::Timestamp)
                .ok_or_else(|| FrameError::InvalidDate {
                    column: name.to_string(),
                    value: cell.clone(),
                })
        })
        .collect()
}

fn parse_bool(cell: &str) -> Option<bool> {
    match cell {
        "True" | "TRUE" | "true" => Some(true),
        "False" | "FALSE" | "false" => Some(false),
        _ => None,
    }
}

/// Pick the narrowest type that fits every non-missing cell
///
/// Integer columns with missing cells widen to float.
fn infer_column(cells: &[String]) -> Vec<Value> {
    let present = || cells.iter().filter(|c| !is_na(c));
    let has_missing = cells.iter().any(|c| is_na(c));
    let any_present = present().next().is_some();

    if !any_present {
        return vec![Value::Null; cells.len()];
    }

    if present().all(|c| c.trim().parse::<i64>().is_ok()) {
        return cells
            .iter()
            .map(|c| match c.trim().parse::<i64>() {
                Ok(i) if has_missing => Value::Float(i as f64),
                Ok(i) => Value::Int(i),
                Err(_) => Value::Null,
            })
            .collect();
    }

    if present().all(|c| c.trim().parse::<f64>().is_ok()) {
        return cells
            .iter()
            .map(|c| match c.trim().parse::<f64>() {
                Ok(f) if !is_na(c) => Value::Float(f),
                _ => Value::Null,
            })
            .collect();
    }

    if present().all(|c| parse_bool(c).is_some()) {
        return cells
            .iter()
            .map(|c| parse_bool(c).map(Value::Bool).unwrap_or(Value::Null))
            .collect();
    }

    cells
        .iter()
        .map(|c| if is_na(c) { Value::Null } else { Value::Str(c.clone()) })
        .collect()
}

/// Load the four sources and join them into one row per dispute
pub fn load_combined(sources: &DataSources) -> Result<DataFrame, FrameError> {
    let disputes = read_csv(&sources.disputes, &["created_at"])?;
    let transactions = read_csv(&sources.transactions, &["timestamp"])?;
    let classified = read_csv(&sources.classified, &[])?;
    let resolutions = read_csv(&sources.resolutions, &[])?;

    let combined = combine(&disputes, &transactions, &classified, &resolutions)?;

    info!(
        rows = combined.height(),
        columns = ?combined.column_names(),
        "Loaded combined dataset"
    );

    Ok(combined)
}

/// Join already-loaded sources the same way [`load_combined`] does
pub fn combine(
    disputes: &DataFrame,
    transactions: &DataFrame,
    classified: &DataFrame,
    resolutions: &DataFrame,
) -> Result<DataFrame, FrameError> {
    let combined = left_join(
        disputes,
        transactions,
        &["txn_id", "customer_id"],
        ("_dispute", "_txn"),
    )?;
    let combined = left_join(&combined, classified, &["dispute_id"], DEFAULT_SUFFIXES)?;
    left_join(&combined, resolutions, &["dispute_id"], DEFAULT_SUFFIXES)
}
