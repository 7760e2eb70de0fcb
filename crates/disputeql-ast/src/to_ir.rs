//! Lower a syntax tree to a query plan, checking every name against the registry

use crate::ast::*;
use disputeql_ir::{self as ir, CmpOp, FrameExpr, GroupedExpr, Operand, ScalarExpr, SeriesExpr};
use disputeql_registry::{ArgBinding, ArgSlot, Binding, Kind, RegistryError, SandboxRegistry};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LowerError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{0}")]
    Unsupported(String),

    #[error("{0}")]
    InvalidArgument(String),
}

impl LowerError {
    /// True when the expression reached outside the whitelist
    pub fn is_sandbox_violation(&self) -> bool {
        matches!(
            self,
            LowerError::Registry(
                RegistryError::UnknownName(_)
                    | RegistryError::PrivateMember(_)
                    | RegistryError::UnknownMember { .. }
                    | RegistryError::NotCallable { .. }
            )
        )
    }
}

type Result<T> = std::result::Result<T, LowerError>;

impl Expr {
    /// Convert the expression to a query plan
    pub fn to_ir(&self, registry: &SandboxRegistry) -> Result<ir::Query> {
        let lowered = Lowerer { registry }.lower(self)?;
        match lowered {
            Lowered::Frame(frame) => Ok(ir::Query::Frame(frame)),
            Lowered::Series(series) => Ok(ir::Query::Series(series)),
            Lowered::Grouped(grouped) => Ok(ir::Query::Grouped(grouped)),
            Lowered::Scalar(scalar) => Ok(ir::Query::Scalar(scalar)),
            Lowered::Shape(frame) => Ok(ir::Query::Series(SeriesExpr::Shape { frame: Box::new(frame) })),
            other => Err(LowerError::Unsupported(format!(
                "expression evaluates to a '{}' object, not a table, series or value",
                other.kind()
            ))),
        }
    }
}

/// Intermediate values while walking the tree
#[derive(Debug, Clone)]
enum Lowered {
    Pandas,
    TimestampClass,
    Len,
    Frame(FrameExpr),
    Series(SeriesExpr),
    GroupBy {
        frame: FrameExpr,
        keys: Vec<String>,
    },
    GroupByColumn {
        frame: FrameExpr,
        keys: Vec<String>,
        column: String,
    },
    Grouped(GroupedExpr),
    Dt(SeriesExpr),
    Str(SeriesExpr),
    Scalar(ScalarExpr),
    Shape(FrameExpr),
    List(Vec<ir::Literal>),
}

impl Lowered {
    fn kind(&self) -> Kind {
        match self {
            Lowered::Pandas => Kind::Pandas,
            Lowered::TimestampClass => Kind::TimestampClass,
            Lowered::Len => Kind::Builtins,
            Lowered::Frame(_) => Kind::Frame,
            Lowered::Series(_) => Kind::Series,
            Lowered::GroupBy { .. } => Kind::GroupBy,
            Lowered::GroupByColumn { .. } => Kind::GroupByColumn,
            Lowered::Grouped(_) => Kind::Grouped,
            Lowered::Dt(_) => Kind::DtAccessor,
            Lowered::Str(_) => Kind::StrAccessor,
            Lowered::Scalar(_) => Kind::Scalar,
            Lowered::Shape(_) => Kind::Shape,
            Lowered::List(_) => Kind::Scalar,
        }
    }

    fn literal(&self) -> Option<&ir::Literal> {
        match self {
            Lowered::Scalar(ScalarExpr::Literal { value }) => Some(value),
            _ => None,
        }
    }
}

fn convert_literal(lit: &Literal) -> ir::Literal {
    match lit {
        Literal::Int(i) => ir::Literal::Int(*i),
        Literal::Float(f) => ir::Literal::Float(*f),
        Literal::Str(s) => ir::Literal::String(s.clone()),
        Literal::Bool(b) => ir::Literal::Bool(*b),
        Literal::None => ir::Literal::Null,
    }
}

/// Call arguments resolved against a method signature
struct CallArgs<'e> {
    binding: ArgBinding,
    positional: Vec<&'e Expr>,
    keywords: Vec<&'e Expr>,
}

impl<'e> CallArgs<'e> {
    fn get(&self, param: &str) -> Option<&'e Expr> {
        match self.binding.get(param)? {
            ArgSlot::Positional(i) => self.positional.get(i).copied(),
            ArgSlot::Keyword(i) => self.keywords.get(i).copied(),
        }
    }
}

struct Lowerer<'r> {
    registry: &'r SandboxRegistry,
}

impl<'r> Lowerer<'r> {
    fn lower(&self, expr: &Expr) -> Result<Lowered> {
        match expr {
            Expr::Literal(lit) => Ok(Lowered::Scalar(ScalarExpr::literal(convert_literal(lit)))),
            Expr::Name(name) => Ok(match self.registry.resolve(name)? {
                Binding::Dataset => Lowered::Frame(FrameExpr::Dataset),
                Binding::Pandas => Lowered::Pandas,
                Binding::Len => Lowered::Len,
            }),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| {
                        self.lower(item)?.literal().cloned().ok_or_else(|| {
                            LowerError::Unsupported("list elements must be literal values".to_string())
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Lowered::List(values))
            }
            Expr::Attribute { value, attr } => {
                let receiver = self.lower(value)?;
                self.lower_attribute(receiver, attr)
            }
            Expr::Call { func, args } => self.lower_call(func, args),
            Expr::Subscript { value, index } => {
                let receiver = self.lower(value)?;
                let index = self.lower(index)?;
                self.lower_subscript(receiver, index)
            }
            Expr::UnaryOp { op, operand } => {
                let operand = self.lower(operand)?;
                match (op, operand) {
                    (UnaryOp::Invert, Lowered::Series(input)) => Ok(Lowered::Series(SeriesExpr::Not {
                        input: Box::new(input),
                    })),
                    (UnaryOp::Neg, Lowered::Series(input)) => Ok(Lowered::Series(SeriesExpr::Neg {
                        input: Box::new(input),
                    })),
                    (UnaryOp::Neg, Lowered::Scalar(value)) => Ok(Lowered::Scalar(ScalarExpr::Neg {
                        value: Box::new(value),
                    })),
                    (op, other) => Err(LowerError::Unsupported(format!(
                        "bad operand type for unary {}: '{}'",
                        if *op == UnaryOp::Invert { "~" } else { "-" },
                        other.kind()
                    ))),
                }
            }
            Expr::BinaryOp { op, left, right } => {
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                self.lower_binary(*op, left, right)
            }
            Expr::Compare { op, left, right } => {
                let left = self.lower(left)?;
                let right = self.lower(right)?;
                self.lower_compare(*op, left, right)
            }
        }
    }

    fn lower_attribute(&self, receiver: Lowered, attr: &str) -> Result<Lowered> {
        if let Lowered::Frame(frame) = receiver {
            // Unknown DataFrame attributes resolve to columns
            return match self.registry.attribute(Kind::Frame, attr) {
                Ok(_) => Ok(Lowered::Shape(frame)),
                Err(RegistryError::UnknownMember { .. }) => Ok(Lowered::Series(SeriesExpr::Column {
                    frame: Box::new(frame),
                    name: attr.to_string(),
                })),
                Err(e) => Err(e.into()),
            };
        }

        let sig = self.registry.attribute(receiver.kind(), attr)?;

        match (receiver, sig.name) {
            (Lowered::Pandas, "Timestamp") => Ok(Lowered::TimestampClass),
            (Lowered::Series(series), "dt") => Ok(Lowered::Dt(series)),
            (Lowered::Series(series), "str") => Ok(Lowered::Str(series)),
            (Lowered::Dt(series), name) => Ok(Lowered::Series(SeriesExpr::Dt {
                input: Box::new(series),
                field: date_field(name)?,
            })),
            (Lowered::Scalar(value), name) => Ok(Lowered::Scalar(ScalarExpr::Part {
                value: Box::new(value),
                field: date_field(name)?,
            })),
            (other, name) => Err(LowerError::Unsupported(format!(
                "attribute '{}' of '{}' is not supported",
                name,
                other.kind()
            ))),
        }
    }

    fn lower_call(&self, func: &Expr, args: &[Argument]) -> Result<Lowered> {
        let (receiver, name) = match func {
            Expr::Attribute { value, attr } => (self.lower(value)?, attr.as_str()),
            other => match self.lower(other)? {
                Lowered::Len => (Lowered::Len, disputeql_registry::LEN_IDENT),
                Lowered::TimestampClass => (Lowered::Pandas, "Timestamp"),
                callee => {
                    return Err(LowerError::Unsupported(format!(
                        "'{}' object is not callable",
                        callee.kind()
                    )))
                }
            },
        };

        let sig = self.registry.method(receiver.kind(), name)?;

        let positional: Vec<&Expr> = args.iter().filter(|a| a.keyword.is_none()).map(|a| &a.value).collect();
        let keyword_names: Vec<&str> = args.iter().filter_map(|a| a.keyword.as_deref()).collect();
        let keywords: Vec<&Expr> = args.iter().filter(|a| a.keyword.is_some()).map(|a| &a.value).collect();

        let call = CallArgs {
            binding: sig.bind(positional.len(), &keyword_names)?,
            positional,
            keywords,
        };

        self.lower_method(receiver, sig.name, &call)
    }

    fn lower_method(&self, receiver: Lowered, name: &str, call: &CallArgs) -> Result<Lowered> {
        match (receiver, name) {
            (Lowered::Len, _) => self.lower_len(self.required(call, "obj")?),

            (Lowered::Pandas, "Timestamp") => {
                let value = self.scalar_arg(self.required(call, "ts_input")?, "Timestamp")?;
                Ok(Lowered::Scalar(ScalarExpr::Timestamp { value: Box::new(value) }))
            }
            (Lowered::Pandas, "to_datetime") => match self.lower(self.required(call, "arg")?)? {
                Lowered::Series(input) => Ok(Lowered::Series(SeriesExpr::ToDatetime {
                    input: Box::new(input),
                })),
                Lowered::Scalar(value) => Ok(Lowered::Scalar(ScalarExpr::Timestamp { value: Box::new(value) })),
                other => Err(LowerError::InvalidArgument(format!(
                    "to_datetime() cannot convert a '{}' object",
                    other.kind()
                ))),
            },
            (Lowered::Pandas, "Timedelta") => Ok(Lowered::Scalar(ScalarExpr::Timedelta {
                seconds: self.timedelta_seconds(call)?,
            })),
            (Lowered::TimestampClass, _) => Ok(Lowered::Scalar(ScalarExpr::Now)),

            (Lowered::Frame(frame), "head") => Ok(Lowered::Frame(FrameExpr::Head {
                input: Box::new(frame),
                n: self.row_count(call)?,
            })),
            (Lowered::Frame(frame), "tail") => Ok(Lowered::Frame(FrameExpr::Tail {
                input: Box::new(frame),
                n: self.row_count(call)?,
            })),
            (Lowered::Frame(frame), "groupby") => Ok(Lowered::GroupBy {
                frame,
                keys: self.column_names(self.required(call, "by")?, "groupby")?,
            }),
            (Lowered::Frame(frame), "sort_values") => Ok(Lowered::Frame(FrameExpr::Sort {
                input: Box::new(frame),
                by: self.column_names(self.required(call, "by")?, "sort_values")?,
                ascending: self.bool_arg(call, "ascending", true)?,
            })),

            (Lowered::Series(series), "head") => Ok(Lowered::Series(SeriesExpr::Head {
                input: Box::new(series),
                n: self.row_count(call)?,
            })),
            (Lowered::Series(series), "tail") => Ok(Lowered::Series(SeriesExpr::Tail {
                input: Box::new(series),
                n: self.row_count(call)?,
            })),
            (Lowered::Series(series), "value_counts") => Ok(Lowered::Grouped(GroupedExpr::ValueCounts {
                input: Box::new(series),
                normalize: self.bool_arg(call, "normalize", false)?,
            })),
            (Lowered::Series(series), "unique") => Ok(Lowered::Series(SeriesExpr::Unique {
                input: Box::new(series),
            })),
            (Lowered::Series(series), "isin") => {
                let values = match self.lower(self.required(call, "values")?)? {
                    Lowered::List(values) => values,
                    other => {
                        return Err(LowerError::InvalidArgument(format!(
                            "only list-like objects are allowed to be passed to isin(), you passed a '{}'",
                            other.kind()
                        )))
                    }
                };
                Ok(Lowered::Series(SeriesExpr::IsIn {
                    input: Box::new(series),
                    values,
                }))
            }
            (Lowered::Series(series), "isna" | "isnull" | "notna" | "notnull") => {
                Ok(Lowered::Series(SeriesExpr::IsNull {
                    input: Box::new(series),
                    negated: name.starts_with("not"),
                }))
            }
            (Lowered::Series(series), "between") => Ok(Lowered::Series(SeriesExpr::Between {
                input: Box::new(series),
                low: Box::new(self.scalar_arg(self.required(call, "left")?, "between")?),
                high: Box::new(self.scalar_arg(self.required(call, "right")?, "between")?),
            })),
            (Lowered::Series(series), "sort_values") => Ok(Lowered::Series(SeriesExpr::Sort {
                input: Box::new(series),
                ascending: self.bool_arg(call, "ascending", true)?,
            })),
            (Lowered::Series(series), reduction) => Ok(Lowered::Scalar(ScalarExpr::Aggregate {
                input: Box::new(series),
                func: agg_func(reduction)?,
            })),

            (Lowered::Str(series), "contains") => {
                let pattern = self.string_arg(self.required(call, "pat")?, "contains")?;
                let case = self.bool_arg(call, "case", true)?;
                let na = match call.get("na") {
                    None => false,
                    Some(expr) => match self.literal_arg(expr, "na")? {
                        ir::Literal::Bool(b) => b,
                        ir::Literal::Null => false,
                        other => {
                            return Err(LowerError::InvalidArgument(format!(
                                "contains() na must be a boolean, got {}",
                                other
                            )))
                        }
                    },
                };
                // Patterns are matched literally whatever regex= says
                self.bool_arg(call, "regex", true)?;
                Ok(Lowered::Series(SeriesExpr::Str {
                    input: Box::new(series),
                    op: ir::StrOp::Contains { pattern, case, na },
                }))
            }
            (Lowered::Str(series), "startswith") => Ok(Lowered::Series(SeriesExpr::Str {
                input: Box::new(series),
                op: ir::StrOp::StartsWith {
                    pattern: self.string_arg(self.required(call, "pat")?, "startswith")?,
                },
            })),
            (Lowered::Str(series), "endswith") => Ok(Lowered::Series(SeriesExpr::Str {
                input: Box::new(series),
                op: ir::StrOp::EndsWith {
                    pattern: self.string_arg(self.required(call, "pat")?, "endswith")?,
                },
            })),
            (Lowered::Str(series), "lower") => Ok(Lowered::Series(SeriesExpr::Str {
                input: Box::new(series),
                op: ir::StrOp::Lower,
            })),
            (Lowered::Str(series), "upper") => Ok(Lowered::Series(SeriesExpr::Str {
                input: Box::new(series),
                op: ir::StrOp::Upper,
            })),

            (Lowered::GroupBy { frame, keys }, "size") | (Lowered::GroupByColumn { frame, keys, .. }, "size") => {
                Ok(Lowered::Grouped(GroupedExpr::Size {
                    frame: Box::new(frame),
                    keys,
                }))
            }
            (Lowered::GroupByColumn { frame, keys, column }, reduction) => {
                Ok(Lowered::Grouped(GroupedExpr::Aggregate {
                    frame: Box::new(frame),
                    keys,
                    column,
                    func: agg_func(reduction)?,
                }))
            }

            (Lowered::Grouped(grouped), "head") => Ok(Lowered::Grouped(GroupedExpr::Head {
                input: Box::new(grouped),
                n: self.row_count(call)?,
            })),
            (Lowered::Grouped(grouped), "tail") => Ok(Lowered::Grouped(GroupedExpr::Tail {
                input: Box::new(grouped),
                n: self.row_count(call)?,
            })),
            (Lowered::Grouped(grouped), "sort_values") => Ok(Lowered::Grouped(GroupedExpr::Sort {
                input: Box::new(grouped),
                ascending: self.bool_arg(call, "ascending", true)?,
            })),
            (Lowered::Grouped(grouped), "idxmax" | "idxmin") => Ok(Lowered::Scalar(ScalarExpr::IdxExtreme {
                input: Box::new(grouped),
                func: if name == "idxmax" { ir::AggFunc::Max } else { ir::AggFunc::Min },
            })),
            (Lowered::Grouped(grouped), reduction) => Ok(Lowered::Scalar(ScalarExpr::GroupedAggregate {
                input: Box::new(grouped),
                func: agg_func(reduction)?,
            })),

            (Lowered::Scalar(value), "date") => Ok(Lowered::Scalar(ScalarExpr::Part {
                value: Box::new(value),
                field: ir::DateField::Date,
            })),
            (Lowered::Scalar(value), "normalize") => Ok(Lowered::Scalar(ScalarExpr::Normalize {
                value: Box::new(value),
            })),

            (other, name) => Err(LowerError::Unsupported(format!(
                "method '{}' of '{}' is not supported",
                name,
                other.kind()
            ))),
        }
    }

    fn lower_len(&self, arg: &Expr) -> Result<Lowered> {
        let query = match self.lower(arg)? {
            Lowered::Frame(frame) => ir::Query::Frame(frame),
            Lowered::Series(series) => ir::Query::Series(series),
            Lowered::Grouped(grouped) => ir::Query::Grouped(grouped),
            Lowered::Scalar(scalar) => ir::Query::Scalar(scalar),
            Lowered::List(values) => {
                return Ok(Lowered::Scalar(ScalarExpr::literal(ir::Literal::Int(values.len() as i64))))
            }
            other => {
                return Err(LowerError::Unsupported(format!(
                    "object of type '{}' has no len()",
                    other.kind()
                )))
            }
        };
        Ok(Lowered::Scalar(ScalarExpr::Len { value: Box::new(query) }))
    }

    fn lower_subscript(&self, receiver: Lowered, index: Lowered) -> Result<Lowered> {
        match (receiver, index) {
            (Lowered::Frame(frame), Lowered::Series(mask)) => Ok(Lowered::Frame(FrameExpr::Filter {
                input: Box::new(frame),
                mask: Box::new(mask),
            })),
            (Lowered::Frame(frame), Lowered::List(values)) => Ok(Lowered::Frame(FrameExpr::Project {
                input: Box::new(frame),
                columns: strings(values, "column selection")?,
            })),
            (Lowered::Frame(frame), index) => match index.literal() {
                Some(ir::Literal::String(name)) => Ok(Lowered::Series(SeriesExpr::Column {
                    frame: Box::new(frame),
                    name: name.clone(),
                })),
                _ => Err(LowerError::Unsupported(
                    "DataFrame indexing requires a column name, a list of column names or a boolean mask"
                        .to_string(),
                )),
            },
            (Lowered::Series(series), Lowered::Series(mask)) => Ok(Lowered::Series(SeriesExpr::Filter {
                input: Box::new(series),
                mask: Box::new(mask),
            })),
            (Lowered::GroupBy { frame, keys }, index) => match index.literal() {
                Some(ir::Literal::String(column)) => Ok(Lowered::GroupByColumn {
                    frame,
                    keys,
                    column: column.clone(),
                }),
                _ => Err(LowerError::Unsupported(
                    "groupby selection requires a single column name".to_string(),
                )),
            },
            (Lowered::Grouped(grouped), index) => match index.literal() {
                Some(key) => Ok(Lowered::Scalar(ScalarExpr::Lookup {
                    input: Box::new(grouped),
                    key: key.clone(),
                })),
                None => Err(LowerError::Unsupported(
                    "grouped results can only be indexed by a label".to_string(),
                )),
            },
            (Lowered::Shape(frame), index) => match index.literal() {
                Some(ir::Literal::Int(axis @ (0 | 1))) => Ok(Lowered::Scalar(ScalarExpr::Shape {
                    frame: Box::new(frame),
                    axis: *axis as usize,
                })),
                _ => Err(LowerError::InvalidArgument("tuple index out of range".to_string())),
            },
            (receiver, _) => Err(LowerError::Unsupported(format!(
                "'{}' object is not subscriptable",
                receiver.kind()
            ))),
        }
    }

    fn lower_binary(&self, op: BinOp, left: Lowered, right: Lowered) -> Result<Lowered> {
        let arith = match op {
            BinOp::BitAnd | BinOp::BitOr => {
                let logical = if op == BinOp::BitAnd {
                    ir::LogicalOp::And
                } else {
                    ir::LogicalOp::Or
                };
                return match (left, right) {
                    (Lowered::Series(l), Lowered::Series(r)) => Ok(Lowered::Series(SeriesExpr::Logical {
                        op: logical,
                        left: Box::new(l),
                        right: Box::new(r),
                    })),
                    (Lowered::Scalar(l), Lowered::Scalar(r)) => Ok(Lowered::Scalar(ScalarExpr::Logical {
                        op: logical,
                        left: Box::new(l),
                        right: Box::new(r),
                    })),
                    (l, r) => Err(LowerError::Unsupported(format!(
                        "unsupported operand types for {}: '{}' and '{}'",
                        if op == BinOp::BitAnd { "&" } else { "|" },
                        l.kind(),
                        r.kind()
                    ))),
                };
            }
            BinOp::Add => ir::ArithOp::Add,
            BinOp::Sub => ir::ArithOp::Sub,
            BinOp::Mul => ir::ArithOp::Mul,
            BinOp::Div => ir::ArithOp::Div,
            BinOp::Mod => ir::ArithOp::Mod,
        };

        match (left, right) {
            (Lowered::Scalar(l), Lowered::Scalar(r)) => Ok(Lowered::Scalar(ScalarExpr::Arith {
                op: arith,
                left: Box::new(l),
                right: Box::new(r),
            })),
            (l, r) => Ok(Lowered::Series(SeriesExpr::Arith {
                op: arith,
                left: Box::new(operand(l, &arith.to_string())?),
                right: Box::new(operand(r, &arith.to_string())?),
            })),
        }
    }

    fn lower_compare(&self, op: CmpOp, left: Lowered, right: Lowered) -> Result<Lowered> {
        match (left, right) {
            (Lowered::Scalar(l), Lowered::Scalar(r)) => Ok(Lowered::Scalar(ScalarExpr::Compare {
                op,
                left: Box::new(l),
                right: Box::new(r),
            })),
            (l, r) => Ok(Lowered::Series(SeriesExpr::Compare {
                op,
                left: Box::new(operand(l, &op.to_string())?),
                right: Box::new(operand(r, &op.to_string())?),
            })),
        }
    }

    fn required<'e>(&self, call: &CallArgs<'e>, param: &str) -> Result<&'e Expr> {
        call.get(param).ok_or_else(|| {
            LowerError::InvalidArgument(format!("missing required argument: '{}'", param))
        })
    }

    fn scalar_arg(&self, expr: &Expr, method: &str) -> Result<ScalarExpr> {
        match self.lower(expr)? {
            Lowered::Scalar(scalar) => Ok(scalar),
            other => Err(LowerError::InvalidArgument(format!(
                "{}() expects a single value, got a '{}' object",
                method,
                other.kind()
            ))),
        }
    }

    fn literal_arg(&self, expr: &Expr, param: &str) -> Result<ir::Literal> {
        self.lower(expr)?
            .literal()
            .cloned()
            .ok_or_else(|| LowerError::InvalidArgument(format!("argument '{}' must be a literal", param)))
    }

    fn string_arg(&self, expr: &Expr, method: &str) -> Result<String> {
        match self.literal_arg(expr, method)? {
            ir::Literal::String(s) => Ok(s),
            other => Err(LowerError::InvalidArgument(format!(
                "{}() expects a string, got {}",
                method, other
            ))),
        }
    }

    fn bool_arg(&self, call: &CallArgs, param: &str, default: bool) -> Result<bool> {
        match call.get(param) {
            None => Ok(default),
            Some(expr) => match self.literal_arg(expr, param)? {
                ir::Literal::Bool(b) => Ok(b),
                other => Err(LowerError::InvalidArgument(format!(
                    "argument '{}' must be True or False, got {}",
                    param, other
                ))),
            },
        }
    }

    fn row_count(&self, call: &CallArgs) -> Result<usize> {
        match call.get("n") {
            None => Ok(ir::DEFAULT_HEAD_ROWS),
            Some(expr) => match self.literal_arg(expr, "n")? {
                ir::Literal::Int(n) if n >= 0 => Ok(n as usize),
                other => Err(LowerError::InvalidArgument(format!(
                    "row count must be a non-negative integer, got {}",
                    other
                ))),
            },
        }
    }

    fn column_names(&self, expr: &Expr, method: &str) -> Result<Vec<String>> {
        match self.lower(expr)? {
            Lowered::List(values) => strings(values, method),
            other => match other.literal() {
                Some(ir::Literal::String(name)) => Ok(vec![name.clone()]),
                _ => Err(LowerError::InvalidArgument(format!(
                    "{}() expects a column name or a list of column names",
                    method
                ))),
            },
        }
    }

    fn timedelta_seconds(&self, call: &CallArgs) -> Result<i64> {
        let mut seconds = 0.0;
        let mut any = false;

        if let Some(expr) = call.get("value") {
            any = true;
            seconds += match self.literal_arg(expr, "value")? {
                ir::Literal::String(text) => parse_timedelta(&text).ok_or_else(|| {
                    LowerError::InvalidArgument(format!("unit abbreviation w/o a number: '{}'", text))
                })?,
                other => {
                    return Err(LowerError::InvalidArgument(format!(
                        "Timedelta value {} needs a unit; use days=, hours=, minutes=, seconds= or weeks=",
                        other
                    )))
                }
            };
        }

        for (param, scale) in [
            ("weeks", 604_800.0),
            ("days", 86_400.0),
            ("hours", 3_600.0),
            ("minutes", 60.0),
            ("seconds", 1.0),
        ] {
            if let Some(expr) = call.get(param) {
                any = true;
                let amount = match self.literal_arg(expr, param)? {
                    ir::Literal::Int(i) => i as f64,
                    ir::Literal::Float(f) => f,
                    other => {
                        return Err(LowerError::InvalidArgument(format!(
                            "Timedelta {}= must be a number, got {}",
                            param, other
                        )))
                    }
                };
                seconds += amount * scale;
            }
        }

        if !any {
            return Err(LowerError::InvalidArgument(
                "Timedelta() requires a value or a unit keyword".to_string(),
            ));
        }

        Ok(seconds.round() as i64)
    }
}

fn operand(lowered: Lowered, op: &str) -> Result<Operand> {
    match lowered {
        Lowered::Series(series) => Ok(Operand::Series(series)),
        Lowered::Scalar(scalar) => Ok(Operand::Scalar(scalar)),
        other => Err(LowerError::Unsupported(format!(
            "unsupported operand type for {}: '{}'",
            op,
            other.kind()
        ))),
    }
}

fn strings(values: Vec<ir::Literal>, context: &str) -> Result<Vec<String>> {
    values
        .into_iter()
        .map(|v| match v {
            ir::Literal::String(s) => Ok(s),
            other => Err(LowerError::InvalidArgument(format!(
                "{} expects column names, got {}",
                context, other
            ))),
        })
        .collect()
}

fn date_field(name: &str) -> Result<ir::DateField> {
    ir::DateField::from_name(name)
        .ok_or_else(|| LowerError::Unsupported(format!("date part '{}' is not supported", name)))
}

fn agg_func(name: &str) -> Result<ir::AggFunc> {
    ir::AggFunc::from_name(name)
        .ok_or_else(|| LowerError::Unsupported(format!("method '{}' is not supported", name)))
}

/// Parse spellings such as `7 days`, `1 day 2 hours`, `3h`, `30min` or `2W`
fn parse_timedelta(text: &str) -> Option<f64> {
    let text = text.trim();
    let mut total = 0.0;
    let mut rest = text;
    let mut matched = false;

    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-'))
            .unwrap_or(rest.len());
        let amount: f64 = rest[..number_len].parse().ok()?;
        rest = rest[number_len..].trim_start();

        let unit_len = rest.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(rest.len());
        let unit = &rest[..unit_len];
        let scale = match unit.to_ascii_lowercase().as_str() {
            "w" | "week" | "weeks" => 604_800.0,
            "d" | "day" | "days" => 86_400.0,
            "h" | "hr" | "hour" | "hours" => 3_600.0,
            "m" | "min" | "minute" | "minutes" | "t" => 60.0,
            "s" | "sec" | "second" | "seconds" => 1.0,
            _ => return None,
        };
        total += amount * scale;
        matched = true;
        rest = rest[unit_len..].trim_start_matches(|c: char| c.is_whitespace() || c == ',');
    }

    matched.then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse;
    use disputeql_ir::{AggFunc, DateField, Query};

    fn lower(source: &str) -> Result<Query> {
        let registry = SandboxRegistry::new();
        parse(source).expect("parse").to_ir(&registry)
    }

    fn column(name: &str) -> SeriesExpr {
        SeriesExpr::Column {
            frame: Box::new(FrameExpr::Dataset),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_len_of_dataset() {
        assert_eq!(
            lower("len(df_combined)").unwrap(),
            Query::Scalar(ScalarExpr::Len {
                value: Box::new(Query::Frame(FrameExpr::Dataset)),
            })
        );
    }

    #[test]
    fn test_fallback_expression() {
        assert_eq!(
            lower("df_combined.head()").unwrap(),
            Query::Frame(FrameExpr::Head {
                input: Box::new(FrameExpr::Dataset),
                n: 5,
            })
        );
    }

    #[test]
    fn test_column_by_attribute_and_subscript() {
        let expected = Query::Series(column("predicted_category"));
        assert_eq!(lower("df_combined.predicted_category").unwrap(), expected);
        assert_eq!(lower("df_combined['predicted_category']").unwrap(), expected);
    }

    #[test]
    fn test_today_filter() {
        let query = lower(
            "len(df_combined[(df_combined['predicted_category'] == 'DUPLICATE_CHARGE') & (df_combined['created_at'].dt.date == pd.Timestamp.now().date())])",
        )
        .unwrap();

        let Query::Scalar(ScalarExpr::Len { value }) = query else {
            panic!("expected len");
        };
        let Query::Frame(FrameExpr::Filter { mask, .. }) = *value else {
            panic!("expected filter");
        };
        let SeriesExpr::Logical { right, .. } = *mask else {
            panic!("expected &");
        };
        assert_eq!(
            *right,
            SeriesExpr::Compare {
                op: CmpOp::Eq,
                left: Box::new(Operand::Series(SeriesExpr::Dt {
                    input: Box::new(column("created_at")),
                    field: DateField::Date,
                })),
                right: Box::new(Operand::Scalar(ScalarExpr::Part {
                    value: Box::new(ScalarExpr::Now),
                    field: DateField::Date,
                })),
            }
        );
    }

    #[test]
    fn test_groupby_shapes() {
        assert_eq!(
            lower("df_combined.groupby('predicted_category').size()").unwrap(),
            Query::Grouped(GroupedExpr::Size {
                frame: Box::new(FrameExpr::Dataset),
                keys: vec!["predicted_category".to_string()],
            })
        );
        assert_eq!(
            lower("df_combined.groupby(['predicted_category'])['amount'].mean()").unwrap(),
            Query::Grouped(GroupedExpr::Aggregate {
                frame: Box::new(FrameExpr::Dataset),
                keys: vec!["predicted_category".to_string()],
                column: "amount".to_string(),
                func: AggFunc::Mean,
            })
        );
    }

    #[test]
    fn test_value_counts_lookup() {
        let query = lower("df_combined['predicted_category'].value_counts()['FRAUD']").unwrap();
        assert!(matches!(query, Query::Scalar(ScalarExpr::Lookup { .. })));
    }

    #[test]
    fn test_timedelta_forms() {
        let week = Query::Scalar(ScalarExpr::Timedelta { seconds: 604_800 });
        assert_eq!(lower("pd.Timedelta(days=7)").unwrap(), week);
        assert_eq!(lower("pd.Timedelta('7 days')").unwrap(), week);
        assert_eq!(lower("pd.Timedelta(weeks=1)").unwrap(), week);
        assert_eq!(
            lower("pd.Timedelta(hours=1.5)").unwrap(),
            Query::Scalar(ScalarExpr::Timedelta { seconds: 5_400 })
        );
        assert!(lower("pd.Timedelta(7)").is_err());
    }

    #[test]
    fn test_shape_axes() {
        assert_eq!(
            lower("df_combined.shape[0]").unwrap(),
            Query::Scalar(ScalarExpr::Shape {
                frame: Box::new(FrameExpr::Dataset),
                axis: 0,
            })
        );
        assert!(lower("df_combined.shape[2]").is_err());
        assert_eq!(
            lower("df_combined.shape").unwrap(),
            Query::Series(SeriesExpr::Shape {
                frame: Box::new(FrameExpr::Dataset),
            })
        );
    }

    #[test]
    fn test_grouped_reductions() {
        let counts = GroupedExpr::ValueCounts {
            input: Box::new(column("predicted_category")),
            normalize: false,
        };
        assert_eq!(
            lower("df_combined['predicted_category'].value_counts().max()").unwrap(),
            Query::Scalar(ScalarExpr::GroupedAggregate {
                input: Box::new(counts.clone()),
                func: AggFunc::Max,
            })
        );
        assert_eq!(
            lower("df_combined['predicted_category'].value_counts().idxmin()").unwrap(),
            Query::Scalar(ScalarExpr::IdxExtreme {
                input: Box::new(counts),
                func: AggFunc::Min,
            })
        );
        assert!(matches!(
            lower("df_combined.groupby('predicted_category').size().sum()").unwrap(),
            Query::Scalar(ScalarExpr::GroupedAggregate { func: AggFunc::Sum, .. })
        ));
    }

    #[test]
    fn test_sandbox_violations() {
        for source in [
            "__import__('os')",
            "open('/etc/passwd')",
            "df_combined.__class__",
            "pd.read_csv('x.csv')",
            "df_combined['a'].apply(len)",
            "df_combined.to_csv('out.csv')",
        ] {
            let err = lower(source).unwrap_err();
            assert!(err.is_sandbox_violation(), "{} -> {:?}", source, err);
        }
    }

    #[test]
    fn test_method_must_be_called() {
        let err = lower("df_combined.head").unwrap_err();
        assert!(matches!(
            err,
            LowerError::Registry(RegistryError::MethodReference { .. })
        ));
    }

    #[test]
    fn test_argument_validation() {
        assert!(matches!(
            lower("df_combined.head(-1)").unwrap_err(),
            LowerError::InvalidArgument(_)
        ));
        assert!(matches!(
            lower("df_combined['x'].isin('FRAUD')").unwrap_err(),
            LowerError::InvalidArgument(_)
        ));
        assert!(matches!(
            lower("df_combined.head(rows=3)").unwrap_err(),
            LowerError::Registry(RegistryError::UnexpectedKeyword { .. })
        ));
    }

    #[test]
    fn test_bare_namespace_is_not_a_result() {
        assert!(matches!(lower("pd").unwrap_err(), LowerError::Unsupported(_)));
        assert!(matches!(
            lower("df_combined.groupby('x')").unwrap_err(),
            LowerError::Unsupported(_)
        ));
    }

    #[test]
    fn test_parse_timedelta() {
        assert_eq!(parse_timedelta("1 day 2 hours"), Some(93_600.0));
        assert_eq!(parse_timedelta("30min"), Some(1_800.0));
        assert_eq!(parse_timedelta("2W"), Some(1_209_600.0));
        assert_eq!(parse_timedelta("soon"), None);
        assert_eq!(parse_timedelta(""), None);
    }
}
