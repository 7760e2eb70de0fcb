//! disputeql query plan
//!
//! A closed, typed representation of the dataframe expressions the sandbox
//! accepts. Plans are produced by lowering a parsed expression against the
//! whitelist registry and consumed by the interpreter. Every node is
//! deterministically serializable so a plan can be fingerprinted for logs.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

mod types;
pub use types::*;

/// Rows returned by `head()`/`tail()` without an argument
pub const DEFAULT_HEAD_ROWS: usize = 5;

/// A complete query, classified by the shape of its result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expr", rename_all = "snake_case")]
pub enum Query {
    Frame(FrameExpr),
    Series(SeriesExpr),
    Grouped(GroupedExpr),
    Scalar(ScalarExpr),
}

impl Query {
    /// Calculate fingerprint (SHA-256) of the canonical JSON form
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self));
        let mut hasher = Sha256::new();
        hasher.update(json.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Query::Frame(_) => "frame",
            Query::Series(_) => "series",
            Query::Grouped(_) => "grouped",
            Query::Scalar(_) => "scalar",
        }
    }
}

/// Table-valued expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum FrameExpr {
    /// The combined dataset
    Dataset,
    Filter {
        input: Box<FrameExpr>,
        mask: Box<SeriesExpr>,
    },
    Project {
        input: Box<FrameExpr>,
        columns: Vec<String>,
    },
    Head {
        input: Box<FrameExpr>,
        n: usize,
    },
    Tail {
        input: Box<FrameExpr>,
        n: usize,
    },
    Sort {
        input: Box<FrameExpr>,
        by: Vec<String>,
        ascending: bool,
    },
}

/// Column-valued expressions, indexed by dataset row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SeriesExpr {
    Column {
        frame: Box<FrameExpr>,
        name: String,
    },
    Compare {
        op: CmpOp,
        left: Box<Operand>,
        right: Box<Operand>,
    },
    Arith {
        op: ArithOp,
        left: Box<Operand>,
        right: Box<Operand>,
    },
    Logical {
        op: LogicalOp,
        left: Box<SeriesExpr>,
        right: Box<SeriesExpr>,
    },
    Not {
        input: Box<SeriesExpr>,
    },
    Neg {
        input: Box<SeriesExpr>,
    },
    IsIn {
        input: Box<SeriesExpr>,
        values: Vec<Literal>,
    },
    IsNull {
        input: Box<SeriesExpr>,
        negated: bool,
    },
    Between {
        input: Box<SeriesExpr>,
        low: Box<ScalarExpr>,
        high: Box<ScalarExpr>,
    },
    ToDatetime {
        input: Box<SeriesExpr>,
    },
    Str {
        input: Box<SeriesExpr>,
        op: StrOp,
    },
    Dt {
        input: Box<SeriesExpr>,
        field: DateField,
    },
    Filter {
        input: Box<SeriesExpr>,
        mask: Box<SeriesExpr>,
    },
    Head {
        input: Box<SeriesExpr>,
        n: usize,
    },
    Tail {
        input: Box<SeriesExpr>,
        n: usize,
    },
    Unique {
        input: Box<SeriesExpr>,
    },
    Sort {
        input: Box<SeriesExpr>,
        ascending: bool,
    },
    /// `(rows, columns)` of a frame as a two-entry series
    Shape {
        frame: Box<FrameExpr>,
    },
}

/// Series indexed by group labels (frequency counts and grouped reductions)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum GroupedExpr {
    ValueCounts {
        input: Box<SeriesExpr>,
        normalize: bool,
    },
    Size {
        frame: Box<FrameExpr>,
        keys: Vec<String>,
    },
    Aggregate {
        frame: Box<FrameExpr>,
        keys: Vec<String>,
        column: String,
        func: AggFunc,
    },
    Head {
        input: Box<GroupedExpr>,
        n: usize,
    },
    Tail {
        input: Box<GroupedExpr>,
        n: usize,
    },
    Sort {
        input: Box<GroupedExpr>,
        ascending: bool,
    },
}

/// Single-valued expressions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum ScalarExpr {
    Literal {
        value: Literal,
    },
    /// Current wall-clock time
    Now,
    /// Coerce a value (usually a date string) to a timestamp
    Timestamp {
        value: Box<ScalarExpr>,
    },
    Timedelta {
        seconds: i64,
    },
    /// Midnight of the same day
    Normalize {
        value: Box<ScalarExpr>,
    },
    Part {
        value: Box<ScalarExpr>,
        field: DateField,
    },
    Len {
        value: Box<Query>,
    },
    Shape {
        frame: Box<FrameExpr>,
        axis: usize,
    },
    Aggregate {
        input: Box<SeriesExpr>,
        func: AggFunc,
    },
    Lookup {
        input: Box<GroupedExpr>,
        key: Literal,
    },
    /// Reduce the values of a grouped series
    GroupedAggregate {
        input: Box<GroupedExpr>,
        func: AggFunc,
    },
    /// Label of the first largest (`Max`) or smallest (`Min`) value
    IdxExtreme {
        input: Box<GroupedExpr>,
        func: AggFunc,
    },
    Arith {
        op: ArithOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Compare {
        op: CmpOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Logical {
        op: LogicalOp,
        left: Box<ScalarExpr>,
        right: Box<ScalarExpr>,
    },
    Neg {
        value: Box<ScalarExpr>,
    },
}

impl ScalarExpr {
    pub fn literal(value: Literal) -> Self {
        ScalarExpr::Literal { value }
    }
}

/// Either side of an element-wise binary operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "expr", rename_all = "snake_case")]
pub enum Operand {
    Series(SeriesExpr),
    Scalar(ScalarExpr),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unresolved_fraud() -> Query {
        let category = SeriesExpr::Column {
            frame: Box::new(FrameExpr::Dataset),
            name: "predicted_category".to_string(),
        };
        let action = SeriesExpr::Column {
            frame: Box::new(FrameExpr::Dataset),
            name: "suggested_action".to_string(),
        };
        Query::Frame(FrameExpr::Filter {
            input: Box::new(FrameExpr::Dataset),
            mask: Box::new(SeriesExpr::Logical {
                op: LogicalOp::And,
                left: Box::new(SeriesExpr::Compare {
                    op: CmpOp::Eq,
                    left: Box::new(Operand::Series(category)),
                    right: Box::new(Operand::Scalar(ScalarExpr::literal(Literal::String(
                        "FRAUD".to_string(),
                    )))),
                }),
                right: Box::new(SeriesExpr::Compare {
                    op: CmpOp::Ne,
                    left: Box::new(Operand::Series(action)),
                    right: Box::new(Operand::Scalar(ScalarExpr::literal(Literal::String(
                        "Auto-refund".to_string(),
                    )))),
                }),
            }),
        })
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let query = unresolved_fraud();
        assert_eq!(query.fingerprint(), query.clone().fingerprint());
        assert_eq!(query.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_distinguishes_plans() {
        let other = Query::Frame(FrameExpr::Head {
            input: Box::new(FrameExpr::Dataset),
            n: DEFAULT_HEAD_ROWS,
        });
        assert_ne!(unresolved_fraud().fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_json_round_trip() {
        let query = unresolved_fraud();
        let json = serde_json::to_string(&query).unwrap();
        let back: Query = serde_json::from_str(&json).unwrap();
        assert_eq!(query, back);
    }

    #[test]
    fn test_json_shape() {
        let query = Query::Scalar(ScalarExpr::Len {
            value: Box::new(Query::Frame(FrameExpr::Dataset)),
        });
        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["kind"], "scalar");
        assert_eq!(json["expr"]["node"], "len");
        assert_eq!(json["expr"]["value"]["expr"]["node"], "dataset");
    }

    #[test]
    fn test_cmp_op_holds() {
        use std::cmp::Ordering::*;
        assert!(CmpOp::Le.holds(Equal));
        assert!(CmpOp::Le.holds(Less));
        assert!(!CmpOp::Gt.holds(Equal));
        assert_eq!(CmpOp::Lt.flip(), CmpOp::Gt);
        assert_eq!(CmpOp::Ge.to_string(), ">=");
    }
}
