//! Element-wise comparison, arithmetic and reductions over cell values

use crate::EvalError;
use chrono::TimeDelta;
use disputeql_frame::{parse_datetime, Value, ValueKey};
use disputeql_ir::{AggFunc, ArithOp, CmpOp};
use std::cmp::Ordering;
use std::collections::HashSet;

type Result<T> = std::result::Result<T, EvalError>;

/// Broad families of mutually comparable values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Family {
    Numeric,
    Text,
    Temporal,
    Duration,
}

fn family(value: &Value) -> Option<Family> {
    match value {
        Value::Bool(_) | Value::Int(_) | Value::Float(_) => Some(Family::Numeric),
        Value::Str(_) => Some(Family::Text),
        Value::Date(_) | Value::Timestamp(_) => Some(Family::Temporal),
        Value::Duration(_) => Some(Family::Duration),
        Value::Null => None,
    }
}

fn as_int(value: &Value) -> Option<i64> {
    match value {
        Value::Int(i) => Some(*i),
        Value::Bool(b) => Some(*b as i64),
        _ => None,
    }
}

/// Ordering between two non-null values, if they are comparable
///
/// Temporal values compare with strings that parse as dates.
fn ordering(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Duration(a), Value::Duration(b)) => Some(a.cmp(b)),
        (a, b) if as_int(a).is_some() && as_int(b).is_some() => Some(as_int(a)?.cmp(&as_int(b)?)),
        (a, b) if a.is_numeric() && b.is_numeric() => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (a, b) if a.is_temporal() && b.is_temporal() => Some(a.as_timestamp()?.cmp(&b.as_timestamp()?)),
        (a, Value::Str(s)) if a.is_temporal() => Some(a.as_timestamp()?.cmp(&parse_datetime(s)?)),
        (Value::Str(s), b) if b.is_temporal() => Some(parse_datetime(s)?.cmp(&b.as_timestamp()?)),
        _ => None,
    }
}

/// Compare two values; nulls compare unequal to everything
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    if left.is_null() || right.is_null() {
        return Ok(op == CmpOp::Ne);
    }
    match ordering(left, right) {
        Some(ord) => Ok(op.holds(ord)),
        None if op.is_equality() => Ok(op == CmpOp::Ne),
        None => Err(EvalError::TypeError(format!(
            "'{}' not supported between instances of '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ))),
    }
}

fn unsupported(op: ArithOp, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeError(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op,
        left.type_name(),
        right.type_name()
    ))
}

/// Floored modulo; `b` must be non-zero
fn python_mod_i64(a: i64, b: i64) -> i64 {
    // i64::MIN % -1 overflows but divides exactly
    let Some(r) = a.checked_rem(b) else {
        return 0;
    };
    if r != 0 && ((r < 0) != (b < 0)) {
        r + b
    } else {
        r
    }
}

fn float_arith(op: ArithOp, a: f64, b: f64) -> f64 {
    match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => a / b,
        ArithOp::Mod => {
            if b == 0.0 {
                return f64::NAN;
            }
            let r = a % b;
            if r != 0.0 && ((r < 0.0) != (b < 0.0)) {
                r + b
            } else {
                r
            }
        }
    }
}

fn int_arith(op: ArithOp, a: i64, b: i64) -> Value {
    let checked = match op {
        ArithOp::Add => a.checked_add(b),
        ArithOp::Sub => a.checked_sub(b),
        ArithOp::Mul => a.checked_mul(b),
        ArithOp::Div => return Value::Float(a as f64 / b as f64),
        ArithOp::Mod if b == 0 => return Value::Null,
        ArithOp::Mod => Some(python_mod_i64(a, b)),
    };
    checked
        .map(Value::Int)
        .unwrap_or_else(|| Value::Float(float_arith(op, a as f64, b as f64)))
}

fn scale_duration(d: &TimeDelta, factor: f64) -> Result<Value> {
    let millis = d.num_milliseconds() as f64 * factor;
    if !millis.is_finite() {
        return Ok(Value::Null);
    }
    TimeDelta::try_milliseconds(millis.round() as i64)
        .map(Value::Duration)
        .ok_or_else(|| EvalError::ValueError("Timedelta out of range".to_string()))
}

/// Apply an arithmetic operator; nulls propagate
pub fn arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value> {
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }

    let out_of_range = || EvalError::ValueError("Timestamp out of range".to_string());

    match (left, right) {
        (a, b) if as_int(a).is_some() && as_int(b).is_some() => {
            Ok(int_arith(op, as_int(a).unwrap_or(0), as_int(b).unwrap_or(0)))
        }
        (a, b) if a.is_numeric() && b.is_numeric() => Ok(Value::Float(float_arith(
            op,
            a.as_f64().unwrap_or(f64::NAN),
            b.as_f64().unwrap_or(f64::NAN),
        ))),
        (Value::Str(a), Value::Str(b)) if op == ArithOp::Add => Ok(Value::Str(format!("{}{}", a, b))),

        (a, Value::Duration(d)) if a.is_temporal() && matches!(op, ArithOp::Add | ArithOp::Sub) => {
            let ts = a.as_timestamp().ok_or_else(out_of_range)?;
            let shifted = if op == ArithOp::Add {
                ts.checked_add_signed(*d)
            } else {
                ts.checked_sub_signed(*d)
            };
            shifted.map(Value::Timestamp).ok_or_else(out_of_range)
        }
        (Value::Duration(d), b) if b.is_temporal() && op == ArithOp::Add => {
            let ts = b.as_timestamp().ok_or_else(out_of_range)?;
            ts.checked_add_signed(*d).map(Value::Timestamp).ok_or_else(out_of_range)
        }
        (a, b) if a.is_temporal() && b.is_temporal() && op == ArithOp::Sub => {
            let (a, b) = (
                a.as_timestamp().ok_or_else(out_of_range)?,
                b.as_timestamp().ok_or_else(out_of_range)?,
            );
            Ok(Value::Duration(a.signed_duration_since(b)))
        }

        (Value::Duration(a), Value::Duration(b)) => match op {
            ArithOp::Add => a.checked_add(b).map(Value::Duration).ok_or_else(out_of_range),
            ArithOp::Sub => a.checked_sub(b).map(Value::Duration).ok_or_else(out_of_range),
            ArithOp::Div => Ok(Value::Float(
                a.num_milliseconds() as f64 / b.num_milliseconds() as f64,
            )),
            _ => Err(unsupported(op, left, right)),
        },
        (Value::Duration(d), n) if n.is_numeric() && matches!(op, ArithOp::Mul | ArithOp::Div) => {
            let factor = n.as_f64().unwrap_or(f64::NAN);
            scale_duration(d, if op == ArithOp::Mul { factor } else { 1.0 / factor })
        }
        (n, Value::Duration(d)) if n.is_numeric() && op == ArithOp::Mul => {
            scale_duration(d, n.as_f64().unwrap_or(f64::NAN))
        }

        _ => Err(unsupported(op, left, right)),
    }
}

/// Arithmetic between two single values
///
/// Unlike element-wise arithmetic, dividing a number by zero is an error.
pub fn scalar_arith(op: ArithOp, left: &Value, right: &Value) -> Result<Value> {
    let zero_divisor = left.is_numeric() && right.is_numeric() && right.as_f64() == Some(0.0);
    match op {
        ArithOp::Div if zero_divisor => Err(EvalError::ZeroDivision("division by zero".to_string())),
        ArithOp::Mod if zero_divisor => Err(EvalError::ZeroDivision("modulo by zero".to_string())),
        _ => arith(op, left, right),
    }
}

/// Arithmetic negation
pub fn negate(value: &Value) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Int(i) => Ok(i.checked_neg().map(Value::Int).unwrap_or(Value::Float(-(*i as f64)))),
        Value::Bool(b) => Ok(Value::Int(-(*b as i64))),
        Value::Float(f) => Ok(Value::Float(-f)),
        Value::Duration(d) => Ok(Value::Duration(-*d)),
        other => Err(EvalError::TypeError(format!(
            "bad operand type for unary -: '{}'",
            other.type_name()
        ))),
    }
}

/// Truth value of a mask entry; nulls are false
pub fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        v if v.is_null() => Ok(false),
        other => Err(EvalError::TypeError(format!(
            "boolean values expected, got '{}'",
            other.type_name()
        ))),
    }
}

fn check_family<'a>(values: &[&'a Value], what: &str) -> Result<Option<Family>> {
    let mut seen: Option<(Family, &'a Value)> = None;
    for &value in values {
        let Some(fam) = family(value) else { continue };
        match seen {
            None => seen = Some((fam, value)),
            Some((first, first_value)) if first != fam => {
                return Err(EvalError::TypeError(format!(
                    "cannot compute {} of mixed '{}' and '{}' values",
                    what,
                    first_value.type_name(),
                    value.type_name()
                )))
            }
            _ => {}
        }
    }
    Ok(seen.map(|(fam, _)| fam))
}

fn numeric_values(values: &[&Value], what: &str) -> Result<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            v.as_f64().ok_or_else(|| {
                EvalError::TypeError(format!(
                    "could not convert '{}' to numeric for {}",
                    v.type_name(),
                    what
                ))
            })
        })
        .collect()
}

fn sum(values: &[&Value]) -> Result<Value> {
    match check_family(values, "sum")? {
        None => Ok(Value::Int(0)),
        Some(Family::Numeric) => {
            if values.iter().all(|v| as_int(v).is_some()) {
                let mut total: i64 = 0;
                for v in values {
                    match total.checked_add(as_int(v).unwrap_or(0)) {
                        Some(t) => total = t,
                        None => {
                            return Ok(Value::Float(numeric_values(values, "sum")?.iter().sum()))
                        }
                    }
                }
                Ok(Value::Int(total))
            } else {
                Ok(Value::Float(numeric_values(values, "sum")?.iter().sum()))
            }
        }
        Some(Family::Duration) => {
            let mut total = TimeDelta::zero();
            for v in values {
                if let Value::Duration(d) = v {
                    total = total
                        .checked_add(d)
                        .ok_or_else(|| EvalError::ValueError("Timedelta out of range".to_string()))?;
                }
            }
            Ok(Value::Duration(total))
        }
        Some(Family::Text) => Ok(Value::Str(values.iter().map(|v| v.to_string()).collect())),
        Some(Family::Temporal) => Err(EvalError::TypeError(
            "datetime64 type does not support sum operations".to_string(),
        )),
    }
}

fn mean(values: &[&Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    match check_family(values, "mean")? {
        Some(Family::Duration) => {
            let out_of_range = || EvalError::ValueError("Timedelta out of range".to_string());
            let millis = values.iter().try_fold(0i64, |total, v| match v {
                Value::Duration(d) => total.checked_add(d.num_milliseconds()).ok_or_else(out_of_range),
                _ => Ok(total),
            })?;
            let total = TimeDelta::try_milliseconds(millis).ok_or_else(out_of_range)?;
            scale_duration(&total, 1.0 / values.len() as f64)
        }
        _ => {
            let numbers = numeric_values(values, "mean")?;
            Ok(Value::Float(numbers.iter().sum::<f64>() / numbers.len() as f64))
        }
    }
}

fn median(values: &[&Value]) -> Result<Value> {
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let mut numbers = numeric_values(values, "median")?;
    numbers.sort_by(|a, b| a.total_cmp(b));
    let mid = numbers.len() / 2;
    let median = if numbers.len() % 2 == 0 {
        (numbers[mid - 1] + numbers[mid]) / 2.0
    } else {
        numbers[mid]
    };
    Ok(Value::Float(median))
}

fn extreme(values: &[&Value], func: AggFunc) -> Result<Value> {
    check_family(values, func.name())?;
    let pick = values.iter().copied().reduce(|best, v| {
        let ord = v.total_cmp(best);
        let better = if func == AggFunc::Min {
            ord == Ordering::Less
        } else {
            ord == Ordering::Greater
        };
        if better {
            v
        } else {
            best
        }
    });
    Ok(pick.cloned().unwrap_or(Value::Null))
}

/// Reduce a sequence of values; nulls are skipped except by `size`
pub fn aggregate(func: AggFunc, values: &[Value]) -> Result<Value> {
    let present: Vec<&Value> = values.iter().filter(|v| !v.is_null()).collect();
    match func {
        AggFunc::Count => Ok(Value::Int(present.len() as i64)),
        AggFunc::Size => Ok(Value::Int(values.len() as i64)),
        AggFunc::NUnique => {
            let distinct: HashSet<ValueKey> = present.iter().map(|v| v.key()).collect();
            Ok(Value::Int(distinct.len() as i64))
        }
        AggFunc::Sum => sum(&present),
        AggFunc::Mean => mean(&present),
        AggFunc::Median => median(&present),
        AggFunc::Min | AggFunc::Max => extreme(&present, func),
    }
}
