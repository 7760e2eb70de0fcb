//! Left-preserving equi-join

use crate::frame::{Column, DataFrame};
use crate::value::{Value, ValueKey};
use crate::FrameError;
use std::collections::{HashMap, HashSet};

/// Suffixes applied to overlapping non-key columns when none are given
pub const DEFAULT_SUFFIXES: (&str, &str) = ("_x", "_y");

/// Join `right` onto `left` on the named key columns, keeping every left row
///
/// Key columns appear once, taken from the left side. Other columns present
/// on both sides are renamed with the given suffixes. A left row with several
/// matches is repeated once per match; a left row with none keeps nulls in the
/// right-hand columns. Null keys never match.
pub fn left_join(
    left: &DataFrame,
    right: &DataFrame,
    on: &[&str],
    suffixes: (&str, &str),
) -> Result<DataFrame, FrameError> {
    let left_keys = key_indices(left, on, "left")?;
    let right_keys = key_indices(right, on, "right")?;

    let mut index: HashMap<Vec<ValueKey>, Vec<usize>> = HashMap::new();
    for row in 0..right.height() {
        if let Some(key) = row_key(right, row, &right_keys) {
            index.entry(key).or_default().push(row);
        }
    }

    // (left row, right row or none) pairs in output order
    let mut pairs: Vec<(usize, Option<usize>)> = Vec::with_capacity(left.height());
    for row in 0..left.height() {
        match row_key(left, row, &left_keys).and_then(|k| index.get(&k)) {
            Some(matches) => pairs.extend(matches.iter().map(|&r| (row, Some(r)))),
            None => pairs.push((row, None)),
        }
    }

    let key_set: HashSet<&str> = on.iter().copied().collect();
    let left_names: HashSet<&str> = left.column_names().into_iter().collect();
    let right_names: HashSet<&str> = right
        .column_names()
        .into_iter()
        .filter(|n| !key_set.contains(n))
        .collect();

    let mut columns = Vec::with_capacity(left.width() + right_names.len());

    for column in left.columns() {
        let name = if !key_set.contains(column.name.as_str()) && right_names.contains(column.name.as_str()) {
            format!("{}{}", column.name, suffixes.0)
        } else {
            column.name.clone()
        };
        let values = pairs.iter().map(|(l, _)| column.values[*l].clone()).collect();
        columns.push(Column::new(name, values));
    }

    for column in right.columns() {
        if key_set.contains(column.name.as_str()) {
            continue;
        }
        let name = if left_names.contains(column.name.as_str()) {
            format!("{}{}", column.name, suffixes.1)
        } else {
            column.name.clone()
        };
        let values = pairs
            .iter()
            .map(|(_, r)| r.map(|r| column.values[r].clone()).unwrap_or(Value::Null))
            .collect();
        columns.push(Column::new(name, values));
    }

    DataFrame::new(columns)
}

fn key_indices(df: &DataFrame, on: &[&str], side: &str) -> Result<Vec<usize>, FrameError> {
    on.iter()
        .map(|name| {
            df.column_index(name).ok_or_else(|| FrameError::MissingKey {
                column: name.to_string(),
                side: side.to_string(),
            })
        })
        .collect()
}

fn row_key(df: &DataFrame, row: usize, keys: &[usize]) -> Option<Vec<ValueKey>> {
    keys.iter()
        .map(|&c| match df.value(row, c) {
            Some(v) if !v.is_null() => Some(v.key()),
            _ => None,
        })
        .collect()
}
