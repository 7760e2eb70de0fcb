//! Cell values stored in a [`DataFrame`](crate::DataFrame)

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta};
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;

/// A single cell value
///
/// Floating point NaN is treated as null everywhere, mirroring how the
/// dataset's missing markers behave after loading.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Duration(TimeDelta),
}

impl Value {
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Type name used in error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Date(_) => "date",
            Value::Timestamp(_) => "Timestamp",
            Value::Duration(_) => "Timedelta",
        }
    }

    /// Numeric view of the value; booleans count as 0/1
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Bool(_) | Value::Int(_)) || matches!(self, Value::Float(f) if !f.is_nan())
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Value::Date(_) | Value::Timestamp(_))
    }

    /// Point in time for dates and timestamps (dates map to midnight)
    pub fn as_timestamp(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Timestamp(ts) => Some(*ts),
            Value::Date(d) => d.and_hms_opt(0, 0, 0),
            _ => None,
        }
    }

    /// Hashable identity used for grouping, distinct counts, and join keys
    pub fn key(&self) -> ValueKey {
        match self {
            Value::Null => ValueKey::Null,
            Value::Bool(b) => ValueKey::Bool(*b),
            Value::Int(i) => ValueKey::Int(*i),
            Value::Float(f) if f.is_nan() => ValueKey::Null,
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < 9.0e15 {
                    ValueKey::Int(*f as i64)
                } else {
                    ValueKey::Float(f.to_bits())
                }
            }
            Value::Str(s) => ValueKey::Str(s.clone()),
            Value::Date(d) => ValueKey::Date(*d),
            Value::Timestamp(ts) => ValueKey::Timestamp(*ts),
            Value::Duration(d) => ValueKey::Duration(*d),
        }
    }

    /// Total order used for sorting: numbers, strings, temporal values,
    /// durations, booleans-as-numbers, and nulls last.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Duration(a), Value::Duration(b)) => a.cmp(b),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let (x, y) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
                x.total_cmp(&y)
            }
            (a, b) if a.is_temporal() && b.is_temporal() => a.as_timestamp().cmp(&b.as_timestamp()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }

    fn rank(&self) -> u8 {
        if self.is_null() {
            return 5;
        }
        match self {
            Value::Bool(_) | Value::Int(_) | Value::Float(_) => 0,
            Value::Str(_) => 1,
            Value::Date(_) | Value::Timestamp(_) => 2,
            Value::Duration(_) => 3,
            Value::Null => 5,
        }
    }
}

/// Hashable projection of a [`Value`]
///
/// Integral floats collapse onto integers so `1` and `1.0` group together.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Null,
    Bool(bool),
    Int(i64),
    Float(u64),
    Str(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    Duration(TimeDelta),
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Parse the date/time spellings accepted by CSV sources and query literals
pub fn parse_datetime(raw: &str) -> Option<NaiveDateTime> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Some(ts.naive_utc());
    }

    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn format_duration(d: &TimeDelta) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.unsigned_abs();
    let days = total / 86_400;
    let rem = total % 86_400;
    format!(
        "{}{} days {:02}:{:02}:{:02}",
        sign,
        days,
        rem / 3600,
        (rem % 3600) / 60,
        rem % 60
    )
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NaN"),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => write!(f, "NaN"),
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e16 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            Value::Timestamp(ts) => write!(f, "{}", ts.format("%Y-%m-%d %H:%M:%S")),
            Value::Duration(d) => write!(f, "{}", format_duration(d)),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(f) if f.is_nan() => serializer.serialize_none(),
            Value::Float(f) => serializer.serialize_f64(*f),
            Value::Str(s) => serializer.serialize_str(s),
            other => serializer.collect_str(other),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(ts: NaiveDateTime) -> Self {
        Value::Timestamp(ts)
    }
}
