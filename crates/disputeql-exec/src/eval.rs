//! Plan interpreter over the in-memory dataset

use crate::ops;
use crate::output::{GroupedSeries, QueryOutput};
use crate::EvalError;
use chrono::{Datelike, NaiveDateTime, TimeDelta, Timelike};
use disputeql_frame::{parse_datetime, Column, DataFrame, Value, ValueKey};
use disputeql_ir::{
    AggFunc, CmpOp, DateField, FrameExpr, GroupedExpr, Literal, LogicalOp, Operand, Query, ScalarExpr,
    SeriesExpr, StrOp,
};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

type Result<T> = std::result::Result<T, EvalError>;

/// Rows and columns of the dataset visible to a frame expression
#[derive(Debug, Clone)]
struct View {
    rows: Vec<usize>,
    columns: Vec<usize>,
}

/// Values labelled by the dataset row they came from
#[derive(Debug, Clone)]
struct Indexed {
    name: Option<String>,
    index: Vec<usize>,
    values: Vec<Value>,
}

impl Indexed {
    fn map<F>(self, f: F) -> Result<Indexed>
    where
        F: Fn(&Value) -> Result<Value>,
    {
        let values = self.values.iter().map(f).collect::<Result<Vec<_>>>()?;
        Ok(Indexed { values, ..self })
    }

    fn select(&self, positions: impl IntoIterator<Item = usize>) -> Indexed {
        let (index, values) = positions
            .into_iter()
            .map(|i| (self.index[i], self.values[i].clone()))
            .unzip();
        Indexed {
            name: self.name.clone(),
            index,
            values,
        }
    }
}

enum Evaluated {
    Series(Indexed),
    Scalar(Value),
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::String(s) => Value::Str(s.clone()),
    }
}

/// Total order with nulls last in either direction
fn cmp_nulls_last(a: &Value, b: &Value, ascending: bool) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.total_cmp(b);
            if ascending {
                ord
            } else {
                ord.reverse()
            }
        }
    }
}

fn slice_range(len: usize, n: usize, from_end: bool) -> std::ops::Range<usize> {
    if from_end {
        len.saturating_sub(n)..len
    } else {
        0..n.min(len)
    }
}

fn date_part(value: &Value, field: DateField) -> Result<Value> {
    let ts = match value {
        v if v.is_null() => return Ok(Value::Null),
        v => v.as_timestamp().ok_or_else(|| {
            EvalError::TypeError(format!(
                "'{}' object has no date component '{:?}'",
                v.type_name(),
                field
            ))
        })?,
    };
    Ok(match field {
        DateField::Date => Value::Date(ts.date()),
        DateField::Year => Value::Int(ts.year() as i64),
        DateField::Month => Value::Int(ts.month() as i64),
        DateField::Day => Value::Int(ts.day() as i64),
        DateField::Hour => Value::Int(ts.hour() as i64),
        DateField::Minute => Value::Int(ts.minute() as i64),
        DateField::DayOfWeek => Value::Int(ts.weekday().num_days_from_monday() as i64),
    })
}

pub(crate) struct Evaluator<'a> {
    dataset: &'a DataFrame,
    now: NaiveDateTime,
}

impl<'a> Evaluator<'a> {
    pub(crate) fn new(dataset: &'a DataFrame, now: NaiveDateTime) -> Self {
        Self { dataset, now }
    }

    pub(crate) fn query(&self, query: &Query) -> Result<QueryOutput> {
        match query {
            Query::Frame(expr) => {
                let view = self.frame(expr)?;
                Ok(QueryOutput::Table(self.dataset.select(&view.rows, &view.columns)))
            }
            Query::Series(expr) => {
                let series = self.series(expr)?;
                Ok(QueryOutput::Series(Column::new(
                    series.name.unwrap_or_default(),
                    series.values,
                )))
            }
            Query::Grouped(expr) => Ok(QueryOutput::Grouped(self.grouped(expr)?)),
            Query::Scalar(expr) => Ok(QueryOutput::Scalar(self.scalar(expr)?)),
        }
    }

    fn column_index(&self, view: &View, name: &str) -> Result<usize> {
        self.dataset
            .column_index(name)
            .filter(|c| view.columns.contains(c))
            .ok_or_else(|| EvalError::KeyError(name.to_string()))
    }

    /// Positions in `rows` selected by a boolean mask aligned on row identity
    fn mask_positions(&self, rows: &[usize], mask: &Indexed) -> Result<Vec<usize>> {
        let mut lookup: HashMap<usize, bool> = HashMap::with_capacity(mask.index.len());
        for (row, value) in mask.index.iter().zip(&mask.values) {
            lookup.insert(*row, ops::truthy(value)?);
        }

        let mut keep = Vec::new();
        for (pos, row) in rows.iter().enumerate() {
            match lookup.get(row) {
                Some(true) => keep.push(pos),
                Some(false) => {}
                None => {
                    return Err(EvalError::Indexing(
                        "Unalignable boolean Series provided as indexer (index of the boolean Series and of the indexed object do not match)"
                            .to_string(),
                    ))
                }
            }
        }
        Ok(keep)
    }

    fn frame(&self, expr: &FrameExpr) -> Result<View> {
        match expr {
            FrameExpr::Dataset => Ok(View {
                rows: (0..self.dataset.height()).collect(),
                columns: (0..self.dataset.width()).collect(),
            }),
            FrameExpr::Filter { input, mask } => {
                let view = self.frame(input)?;
                let mask = self.series(mask)?;
                let keep = self.mask_positions(&view.rows, &mask)?;
                Ok(View {
                    rows: keep.into_iter().map(|p| view.rows[p]).collect(),
                    columns: view.columns,
                })
            }
            FrameExpr::Project { input, columns } => {
                let view = self.frame(input)?;
                let columns = columns
                    .iter()
                    .map(|name| self.column_index(&view, name))
                    .collect::<Result<Vec<_>>>()?;
                Ok(View {
                    rows: view.rows,
                    columns,
                })
            }
            FrameExpr::Head { input, n } | FrameExpr::Tail { input, n } => {
                let mut view = self.frame(input)?;
                let range = slice_range(view.rows.len(), *n, matches!(expr, FrameExpr::Tail { .. }));
                view.rows = view.rows[range].to_vec();
                Ok(view)
            }
            FrameExpr::Sort { input, by, ascending } => {
                let mut view = self.frame(input)?;
                let keys = by
                    .iter()
                    .map(|name| self.column_index(&view, name))
                    .collect::<Result<Vec<_>>>()?;
                let columns = self.dataset.columns();
                view.rows.sort_by(|&a, &b| {
                    keys.iter()
                        .map(|&c| cmp_nulls_last(&columns[c].values[a], &columns[c].values[b], *ascending))
                        .find(|ord| *ord != Ordering::Equal)
                        .unwrap_or(Ordering::Equal)
                });
                Ok(view)
            }
        }
    }

    fn operand(&self, operand: &Operand) -> Result<Evaluated> {
        match operand {
            Operand::Series(expr) => Ok(Evaluated::Series(self.series(expr)?)),
            Operand::Scalar(expr) => Ok(Evaluated::Scalar(self.scalar(expr)?)),
        }
    }

    /// Combine two series element-wise
    ///
    /// Identically indexed series zip directly. Otherwise, when `strict`,
    /// the operation fails; when not, the union of both indexes is used with
    /// missing entries as null.
    fn zip<F>(&self, left: Indexed, right: Indexed, strict: bool, f: F) -> Result<Indexed>
    where
        F: Fn(&Value, &Value) -> Result<Value>,
    {
        let name = if left.name == right.name { left.name.clone() } else { None };

        if left.index == right.index {
            let values = left
                .values
                .iter()
                .zip(&right.values)
                .map(|(l, r)| f(l, r))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Indexed {
                name,
                index: left.index,
                values,
            });
        }

        if strict {
            return Err(EvalError::ValueError(
                "Can only compare identically-labeled Series objects".to_string(),
            ));
        }

        let left_at: HashMap<usize, &Value> = left.index.iter().copied().zip(&left.values).collect();
        let right_at: HashMap<usize, &Value> = right.index.iter().copied().zip(&right.values).collect();
        let mut index = left.index.clone();
        let seen: HashSet<usize> = left.index.iter().copied().collect();
        index.extend(right.index.iter().copied().filter(|i| !seen.contains(i)));

        let values = index
            .iter()
            .map(|i| {
                f(
                    left_at.get(i).copied().unwrap_or(&Value::Null),
                    right_at.get(i).copied().unwrap_or(&Value::Null),
                )
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Indexed { name, index, values })
    }

    fn binary<F>(&self, left: &Operand, right: &Operand, strict: bool, f: F) -> Result<Indexed>
    where
        F: Fn(&Value, &Value) -> Result<Value>,
    {
        match (self.operand(left)?, self.operand(right)?) {
            (Evaluated::Series(l), Evaluated::Series(r)) => self.zip(l, r, strict, f),
            (Evaluated::Series(l), Evaluated::Scalar(r)) => l.map(|v| f(v, &r)),
            (Evaluated::Scalar(l), Evaluated::Series(r)) => r.map(|v| f(&l, v)),
            (Evaluated::Scalar(_), Evaluated::Scalar(_)) => Err(EvalError::TypeError(
                "element-wise operation needs at least one series operand".to_string(),
            )),
        }
    }

    fn series(&self, expr: &SeriesExpr) -> Result<Indexed> {
        match expr {
            SeriesExpr::Column { frame, name } => {
                let view = self.frame(frame)?;
                let column = &self.dataset.columns()[self.column_index(&view, name)?];
                Ok(Indexed {
                    name: Some(name.clone()),
                    values: view.rows.iter().map(|&r| column.values[r].clone()).collect(),
                    index: view.rows,
                })
            }
            SeriesExpr::Compare { op, left, right } => {
                let op = *op;
                self.binary(left, right, true, |l, r| ops::compare(op, l, r).map(Value::Bool))
            }
            SeriesExpr::Arith { op, left, right } => {
                let op = *op;
                self.binary(left, right, false, |l, r| ops::arith(op, l, r))
            }
            SeriesExpr::Logical { op, left, right } => {
                let (left, right) = (self.series(left)?, self.series(right)?);
                let op = *op;
                self.zip(left, right, false, |l, r| {
                    let (l, r) = (ops::truthy(l)?, ops::truthy(r)?);
                    Ok(Value::Bool(match op {
                        LogicalOp::And => l && r,
                        LogicalOp::Or => l || r,
                    }))
                })
            }
            SeriesExpr::Not { input } => self.series(input)?.map(|v| match v {
                Value::Bool(b) => Ok(Value::Bool(!b)),
                v if v.is_null() => Ok(Value::Null),
                other => Err(EvalError::TypeError(format!(
                    "bad operand type for unary ~: '{}'",
                    other.type_name()
                ))),
            }),
            SeriesExpr::Neg { input } => self.series(input)?.map(ops::negate),
            SeriesExpr::IsIn { input, values } => {
                let wanted: HashSet<ValueKey> = values.iter().map(|v| literal_value(v).key()).collect();
                self.series(input)?
                    .map(|v| Ok(Value::Bool(wanted.contains(&v.key()))))
            }
            SeriesExpr::IsNull { input, negated } => {
                let negated = *negated;
                self.series(input)?
                    .map(|v| Ok(Value::Bool(v.is_null() != negated)))
            }
            SeriesExpr::Between { input, low, high } => {
                let (low, high) = (self.scalar(low)?, self.scalar(high)?);
                self.series(input)?.map(|v| {
                    Ok(Value::Bool(
                        ops::compare(CmpOp::Ge, v, &low)? && ops::compare(CmpOp::Le, v, &high)?,
                    ))
                })
            }
            SeriesExpr::ToDatetime { input } => self.series(input)?.map(to_timestamp),
            SeriesExpr::Str { input, op } => {
                let series = self.series(input)?;
                if let Some(bad) = series.values.iter().find(|v| !v.is_null() && !matches!(v, Value::Str(_))) {
                    return Err(EvalError::TypeError(format!(
                        "Can only use .str accessor with string values, found '{}'",
                        bad.type_name()
                    )));
                }
                series.map(|v| Ok(string_op(op, v)))
            }
            SeriesExpr::Dt { input, field } => {
                let series = self.series(input)?;
                if let Some(bad) = series.values.iter().find(|v| !v.is_null() && !v.is_temporal()) {
                    return Err(EvalError::TypeError(format!(
                        "Can only use .dt accessor with datetimelike values, found '{}'",
                        bad.type_name()
                    )));
                }
                let field = *field;
                series.map(|v| date_part(v, field))
            }
            SeriesExpr::Filter { input, mask } => {
                let series = self.series(input)?;
                let mask = self.series(mask)?;
                let keep = self.mask_positions(&series.index, &mask)?;
                Ok(series.select(keep))
            }
            SeriesExpr::Head { input, n } | SeriesExpr::Tail { input, n } => {
                let series = self.series(input)?;
                let range = slice_range(series.values.len(), *n, matches!(expr, SeriesExpr::Tail { .. }));
                Ok(series.select(range))
            }
            SeriesExpr::Unique { input } => {
                let series = self.series(input)?;
                let mut seen = HashSet::new();
                let keep: Vec<usize> = (0..series.values.len())
                    .filter(|&i| seen.insert(series.values[i].key()))
                    .collect();
                Ok(series.select(keep))
            }
            SeriesExpr::Sort { input, ascending } => {
                let series = self.series(input)?;
                let mut order: Vec<usize> = (0..series.values.len()).collect();
                order.sort_by(|&a, &b| cmp_nulls_last(&series.values[a], &series.values[b], *ascending));
                Ok(series.select(order))
            }
            SeriesExpr::Shape { frame } => {
                let view = self.frame(frame)?;
                Ok(Indexed {
                    name: Some("shape".to_string()),
                    index: vec![0, 1],
                    values: vec![
                        Value::Int(view.rows.len() as i64),
                        Value::Int(view.columns.len() as i64),
                    ],
                })
            }
        }
    }

    /// Group the rows of a view by key columns, dropping null keys
    ///
    /// Groups are ordered by key ascending.
    fn group_rows(&self, frame: &FrameExpr, keys: &[String]) -> Result<Vec<(Vec<Value>, Vec<usize>)>> {
        let view = self.frame(frame)?;
        let key_columns = keys
            .iter()
            .map(|k| self.column_index(&view, k))
            .collect::<Result<Vec<_>>>()?;
        let columns = self.dataset.columns();

        let mut positions: HashMap<Vec<ValueKey>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Vec<usize>)> = Vec::new();

        for &row in &view.rows {
            let labels: Vec<Value> = key_columns.iter().map(|&c| columns[c].values[row].clone()).collect();
            if labels.iter().any(Value::is_null) {
                continue;
            }
            let key: Vec<ValueKey> = labels.iter().map(Value::key).collect();
            match positions.get(&key) {
                Some(&g) => groups[g].1.push(row),
                None => {
                    positions.insert(key, groups.len());
                    groups.push((labels, vec![row]));
                }
            }
        }

        groups.sort_by(|(a, _), (b, _)| {
            a.iter()
                .zip(b)
                .map(|(x, y)| x.total_cmp(y))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        Ok(groups)
    }

    fn grouped(&self, expr: &GroupedExpr) -> Result<GroupedSeries> {
        match expr {
            GroupedExpr::ValueCounts { input, normalize } => {
                let series = self.series(input)?;
                let mut positions: HashMap<ValueKey, usize> = HashMap::new();
                let mut labels: Vec<Value> = Vec::new();
                let mut counts: Vec<usize> = Vec::new();

                for value in series.values.iter().filter(|v| !v.is_null()) {
                    match positions.get(&value.key()) {
                        Some(&i) => counts[i] += 1,
                        None => {
                            positions.insert(value.key(), labels.len());
                            labels.push(value.clone());
                            counts.push(1);
                        }
                    }
                }

                // Stable: ties keep first-appearance order
                let mut order: Vec<usize> = (0..labels.len()).collect();
                order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));

                let total: usize = counts.iter().sum();
                Ok(GroupedSeries {
                    name: if *normalize { "proportion" } else { "count" }.to_string(),
                    keys: vec![series.name.unwrap_or_default()],
                    labels: order.iter().map(|&i| vec![labels[i].clone()]).collect(),
                    values: order
                        .iter()
                        .map(|&i| {
                            if *normalize {
                                Value::Float(counts[i] as f64 / total as f64)
                            } else {
                                Value::Int(counts[i] as i64)
                            }
                        })
                        .collect(),
                })
            }
            GroupedExpr::Size { frame, keys } => {
                let groups = self.group_rows(frame, keys)?;
                Ok(GroupedSeries {
                    name: "size".to_string(),
                    keys: keys.clone(),
                    values: groups.iter().map(|(_, rows)| Value::Int(rows.len() as i64)).collect(),
                    labels: groups.into_iter().map(|(labels, _)| labels).collect(),
                })
            }
            GroupedExpr::Aggregate { frame, keys, column, func } => {
                let groups = self.group_rows(frame, keys)?;
                let view = self.frame(frame)?;
                let values_column = &self.dataset.columns()[self.column_index(&view, column)?];

                let values = groups
                    .iter()
                    .map(|(_, rows)| {
                        let cells: Vec<Value> = rows.iter().map(|&r| values_column.values[r].clone()).collect();
                        ops::aggregate(*func, &cells)
                    })
                    .collect::<Result<Vec<_>>>()?;

                Ok(GroupedSeries {
                    name: column.clone(),
                    keys: keys.clone(),
                    labels: groups.into_iter().map(|(labels, _)| labels).collect(),
                    values,
                })
            }
            GroupedExpr::Head { input, n } | GroupedExpr::Tail { input, n } => {
                let grouped = self.grouped(input)?;
                let range = slice_range(grouped.len(), *n, matches!(expr, GroupedExpr::Tail { .. }));
                Ok(grouped.slice(range.start, range.end))
            }
            GroupedExpr::Sort { input, ascending } => {
                let grouped = self.grouped(input)?;
                let mut order: Vec<usize> = (0..grouped.len()).collect();
                order.sort_by(|&a, &b| cmp_nulls_last(&grouped.values[a], &grouped.values[b], *ascending));
                Ok(GroupedSeries {
                    labels: order.iter().map(|&i| grouped.labels[i].clone()).collect(),
                    values: order.iter().map(|&i| grouped.values[i].clone()).collect(),
                    ..grouped
                })
            }
        }
    }

    fn scalar(&self, expr: &ScalarExpr) -> Result<Value> {
        match expr {
            ScalarExpr::Literal { value } => Ok(literal_value(value)),
            ScalarExpr::Now => Ok(Value::Timestamp(self.now)),
            ScalarExpr::Timestamp { value } => match self.scalar(value)? {
                Value::Str(s) if matches!(s.trim(), "now" | "today") => Ok(Value::Timestamp(self.now)),
                other => to_timestamp(&other),
            },
            ScalarExpr::Timedelta { seconds } => TimeDelta::try_seconds(*seconds)
                .map(Value::Duration)
                .ok_or_else(|| EvalError::ValueError("Timedelta out of range".to_string())),
            ScalarExpr::Normalize { value } => match self.scalar(value)? {
                v if v.is_null() => Ok(Value::Null),
                v => v
                    .as_timestamp()
                    .and_then(|ts| ts.date().and_hms_opt(0, 0, 0))
                    .map(Value::Timestamp)
                    .ok_or_else(|| {
                        EvalError::TypeError(format!("'{}' object has no attribute 'normalize'", v.type_name()))
                    }),
            },
            ScalarExpr::Part { value, field } => date_part(&self.scalar(value)?, *field),
            ScalarExpr::Len { value } => {
                let len = match self.query(value)? {
                    QueryOutput::Scalar(Value::Str(s)) => s.chars().count(),
                    QueryOutput::Scalar(other) => {
                        return Err(EvalError::TypeError(format!(
                            "object of type '{}' has no len()",
                            other.type_name()
                        )))
                    }
                    output => output.len(),
                };
                Ok(Value::Int(len as i64))
            }
            ScalarExpr::Shape { frame, axis } => {
                let view = self.frame(frame)?;
                match *axis {
                    0 => Ok(Value::Int(view.rows.len() as i64)),
                    1 => Ok(Value::Int(view.columns.len() as i64)),
                    _ => Err(EvalError::Indexing("tuple index out of range".to_string())),
                }
            }
            ScalarExpr::Aggregate { input, func } => {
                let series = self.series(input)?;
                ops::aggregate(*func, &series.values)
            }
            ScalarExpr::Lookup { input, key } => {
                let grouped = self.grouped(input)?;
                let key = literal_value(key);
                let wanted = key.key();
                grouped
                    .labels
                    .iter()
                    .position(|labels| labels.len() == 1 && labels[0].key() == wanted)
                    .map(|i| grouped.values[i].clone())
                    .ok_or_else(|| EvalError::KeyError(key.to_string()))
            }
            ScalarExpr::GroupedAggregate { input, func } => ops::aggregate(*func, &self.grouped(input)?.values),
            ScalarExpr::IdxExtreme { input, func } => {
                let grouped = self.grouped(input)?;
                let target = ops::aggregate(*func, &grouped.values)?;
                let position = (!target.is_null())
                    .then(|| grouped.values.iter().position(|v| v.key() == target.key()))
                    .flatten()
                    .ok_or_else(|| {
                        let name = if *func == AggFunc::Max { "argmax" } else { "argmin" };
                        EvalError::ValueError(format!("attempt to get {} of an empty sequence", name))
                    })?;
                match grouped.labels[position].as_slice() {
                    [label] => Ok(label.clone()),
                    _ => Ok(Value::Str(grouped.label_text(position))),
                }
            }
            ScalarExpr::Arith { op, left, right } => ops::scalar_arith(*op, &self.scalar(left)?, &self.scalar(right)?),
            ScalarExpr::Compare { op, left, right } => {
                ops::compare(*op, &self.scalar(left)?, &self.scalar(right)?).map(Value::Bool)
            }
            ScalarExpr::Logical { op, left, right } => {
                let (l, r) = (self.scalar(left)?, self.scalar(right)?);
                let (l, r) = (ops::truthy(&l)?, ops::truthy(&r)?);
                Ok(Value::Bool(match op {
                    LogicalOp::And => l && r,
                    LogicalOp::Or => l || r,
                }))
            }
            ScalarExpr::Neg { value } => ops::negate(&self.scalar(value)?),
        }
    }
}

fn to_timestamp(value: &Value) -> Result<Value> {
    match value {
        v if v.is_null() => Ok(Value::Null),
        Value::Timestamp(_) => Ok(value.clone()),
        Value::Date(d) => Ok(d.and_hms_opt(0, 0, 0).map(Value::Timestamp).unwrap_or(Value::Null)),
        Value::Str(s) => parse_datetime(s)
            .map(Value::Timestamp)
            .ok_or_else(|| EvalError::ValueError(format!("could not convert string to Timestamp: '{}'", s))),
        other => Err(EvalError::TypeError(format!(
            "cannot convert '{}' to Timestamp",
            other.type_name()
        ))),
    }
}

fn string_op(op: &StrOp, value: &Value) -> Value {
    let Value::Str(s) = value else {
        return match op {
            StrOp::Contains { na, .. } => Value::Bool(*na),
            StrOp::StartsWith { .. } | StrOp::EndsWith { .. } => Value::Bool(false),
            StrOp::Lower | StrOp::Upper => Value::Null,
        };
    };
    match op {
        StrOp::Contains { pattern, case: true, .. } => Value::Bool(s.contains(pattern.as_str())),
        StrOp::Contains { pattern, case: false, .. } => {
            Value::Bool(s.to_lowercase().contains(&pattern.to_lowercase()))
        }
        StrOp::StartsWith { pattern } => Value::Bool(s.starts_with(pattern.as_str())),
        StrOp::EndsWith { pattern } => Value::Bool(s.ends_with(pattern.as_str())),
        StrOp::Lower => Value::Str(s.to_lowercase()),
        StrOp::Upper => Value::Str(s.to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            Column::new("id", vec![Value::Int(1), Value::Int(2), Value::Int(3), Value::Int(4)]),
            Column::new(
                "category",
                vec!["FRAUD".into(), "OTHERS".into(), "FRAUD".into(), Value::Null],
            ),
            Column::new(
                "amount",
                vec![Value::Float(10.0), Value::Float(5.0), Value::Null, Value::Float(1.0)],
            ),
        ])
        .unwrap()
    }

    fn now() -> NaiveDateTime {
        parse_datetime("2025-08-02 12:00:00").unwrap()
    }

    fn column(name: &str) -> SeriesExpr {
        SeriesExpr::Column {
            frame: Box::new(FrameExpr::Dataset),
            name: name.to_string(),
        }
    }

    fn equals(name: &str, value: &str) -> SeriesExpr {
        SeriesExpr::Compare {
            op: CmpOp::Eq,
            left: Box::new(Operand::Series(column(name))),
            right: Box::new(Operand::Scalar(ScalarExpr::literal(Literal::String(value.to_string())))),
        }
    }

    #[test]
    fn test_filter_frame() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let out = eval
            .query(&Query::Frame(FrameExpr::Filter {
                input: Box::new(FrameExpr::Dataset),
                mask: Box::new(equals("category", "FRAUD")),
            }))
            .unwrap();
        let QueryOutput::Table(table) = out else {
            panic!("expected table");
        };
        assert_eq!(table.height(), 2);
        assert_eq!(table.column("id").unwrap().values, vec![Value::Int(1), Value::Int(3)]);
    }

    #[test]
    fn test_mask_from_smaller_frame_is_unalignable() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let filtered = FrameExpr::Filter {
            input: Box::new(FrameExpr::Dataset),
            mask: Box::new(equals("category", "FRAUD")),
        };
        let mask = SeriesExpr::Compare {
            op: CmpOp::Gt,
            left: Box::new(Operand::Series(SeriesExpr::Column {
                frame: Box::new(filtered),
                name: "id".to_string(),
            })),
            right: Box::new(Operand::Scalar(ScalarExpr::literal(Literal::Int(0)))),
        };
        let err = eval
            .query(&Query::Frame(FrameExpr::Filter {
                input: Box::new(FrameExpr::Dataset),
                mask: Box::new(mask),
            }))
            .unwrap_err();
        assert!(matches!(err, EvalError::Indexing(_)));
    }

    #[test]
    fn test_missing_column_is_key_error() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let err = eval.query(&Query::Series(column("missing_col"))).unwrap_err();
        assert_eq!(err.to_string(), "KeyError: 'missing_col'");
    }

    #[test]
    fn test_value_counts_order_and_nulls() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let grouped = eval
            .grouped(&GroupedExpr::ValueCounts {
                input: Box::new(column("category")),
                normalize: false,
            })
            .unwrap();
        assert_eq!(grouped.name, "count");
        assert_eq!(grouped.labels, vec![vec![Value::from("FRAUD")], vec![Value::from("OTHERS")]]);
        assert_eq!(grouped.values, vec![Value::Int(2), Value::Int(1)]);
    }

    #[test]
    fn test_groupby_aggregate_sorted_by_key() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let grouped = eval
            .grouped(&GroupedExpr::Aggregate {
                frame: Box::new(FrameExpr::Dataset),
                keys: vec!["category".to_string()],
                column: "amount".to_string(),
                func: AggFunc::Sum,
            })
            .unwrap();
        assert_eq!(grouped.label_text(0), "FRAUD");
        assert_eq!(grouped.label_text(1), "OTHERS");
        assert_eq!(grouped.values, vec![Value::Float(10.0), Value::Float(5.0)]);
    }

    #[test]
    fn test_sort_nulls_last_descending() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let QueryOutput::Table(table) = eval
            .query(&Query::Frame(FrameExpr::Sort {
                input: Box::new(FrameExpr::Dataset),
                by: vec!["amount".to_string()],
                ascending: false,
            }))
            .unwrap()
        else {
            panic!("expected table");
        };
        assert_eq!(
            table.column("id").unwrap().values,
            vec![Value::Int(1), Value::Int(2), Value::Int(4), Value::Int(3)]
        );
    }

    #[test]
    fn test_lookup_and_len() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let counts = GroupedExpr::ValueCounts {
            input: Box::new(column("category")),
            normalize: false,
        };
        let fraud = eval
            .scalar(&ScalarExpr::Lookup {
                input: Box::new(counts.clone()),
                key: Literal::String("FRAUD".to_string()),
            })
            .unwrap();
        assert_eq!(fraud, Value::Int(2));

        let missing = eval
            .scalar(&ScalarExpr::Lookup {
                input: Box::new(counts),
                key: Literal::String("REFUND_PENDING".to_string()),
            })
            .unwrap_err();
        assert_eq!(missing.to_string(), "KeyError: 'REFUND_PENDING'");

        let len = eval
            .scalar(&ScalarExpr::Len {
                value: Box::new(Query::Frame(FrameExpr::Dataset)),
            })
            .unwrap();
        assert_eq!(len, Value::Int(4));
    }

    #[test]
    fn test_timestamp_literals() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let today = eval
            .scalar(&ScalarExpr::Timestamp {
                value: Box::new(ScalarExpr::literal(Literal::String("today".to_string()))),
            })
            .unwrap();
        assert_eq!(today, Value::Timestamp(now()));

        let err = eval
            .scalar(&ScalarExpr::Timestamp {
                value: Box::new(ScalarExpr::literal(Literal::String("someday".to_string()))),
            })
            .unwrap_err();
        assert!(matches!(err, EvalError::ValueError(_)));
    }

    #[test]
    fn test_dt_requires_temporal_values() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let err = eval
            .series(&SeriesExpr::Dt {
                input: Box::new(column("category")),
                field: DateField::Date,
            })
            .unwrap_err();
        assert!(matches!(err, EvalError::TypeError(_)));
    }

    #[test]
    fn test_str_contains_null_entries() {
        let df = sample();
        let eval = Evaluator::new(&df, now());
        let series = eval
            .series(&SeriesExpr::Str {
                input: Box::new(column("category")),
                op: StrOp::Contains {
                    pattern: "fra".to_string(),
                    case: false,
                    na: false,
                },
            })
            .unwrap();
        assert_eq!(
            series.values,
            vec![Value::Bool(true), Value::Bool(false), Value::Bool(true), Value::Bool(false)]
        );
    }
}
