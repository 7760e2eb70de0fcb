//! Sandboxed executor: parse, lower against the whitelist, interpret

pub mod ops;
mod eval;
pub mod output;

pub use output::{GroupedSeries, QueryOutput};

use chrono::NaiveDateTime;
use disputeql_ast::{LowerError, ParseError};
use disputeql_frame::DataFrame;
use disputeql_ir::Query;
use disputeql_registry::SandboxRegistry;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Runtime failure while interpreting a plan
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("KeyError: '{0}'")]
    KeyError(String),

    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("ValueError: {0}")]
    ValueError(String),

    #[error("IndexingError: {0}")]
    Indexing(String),

    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Error executing query '{expression}': {source}")]
    Parse {
        expression: String,
        #[source]
        source: ParseError,
    },

    #[error("Error executing query '{expression}': {source}")]
    Lower {
        expression: String,
        #[source]
        source: LowerError,
    },

    #[error("Error executing query '{expression}': {source}")]
    Eval {
        expression: String,
        #[source]
        source: EvalError,
    },
}

impl ExecutionError {
    pub fn expression(&self) -> &str {
        match self {
            ExecutionError::Parse { expression, .. }
            | ExecutionError::Lower { expression, .. }
            | ExecutionError::Eval { expression, .. } => expression,
        }
    }

    /// The expression reached outside the whitelisted names and members
    pub fn is_sandbox_violation(&self) -> bool {
        matches!(self, ExecutionError::Lower { source, .. } if source.is_sandbox_violation())
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Evaluates single expressions against a shared, read-only dataset
#[derive(Clone)]
pub struct Executor {
    dataset: Arc<DataFrame>,
    registry: Arc<SandboxRegistry>,
    clock: fn() -> NaiveDateTime,
}

impl Executor {
    pub fn new(dataset: Arc<DataFrame>) -> Self {
        Self {
            dataset,
            registry: Arc::new(SandboxRegistry::new()),
            clock: local_now,
        }
    }

    /// Replace the clock behind `pd.Timestamp.now()` and friends
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn dataset(&self) -> &Arc<DataFrame> {
        &self.dataset
    }

    /// Parse and lower an expression into a plan without running it
    pub fn compile(&self, expression: &str) -> Result<Query, ExecutionError> {
        let expr = disputeql_ast::parse(expression).map_err(|source| ExecutionError::Parse {
            expression: expression.to_string(),
            source,
        })?;

        expr.to_ir(&self.registry).map_err(|source| ExecutionError::Lower {
            expression: expression.to_string(),
            source,
        })
    }

    pub fn run(&self, plan: &Query) -> Result<QueryOutput, EvalError> {
        eval::Evaluator::new(&self.dataset, (self.clock)()).query(plan)
    }

    pub fn execute(&self, expression: &str) -> Result<QueryOutput, ExecutionError> {
        let plan = self.compile(expression)?;
        debug!(
            fingerprint = %plan.fingerprint(),
            kind = plan.kind(),
            "Executing plan"
        );

        self.run(&plan).map_err(|source| ExecutionError::Eval {
            expression: expression.to_string(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disputeql_frame::{parse_datetime, Column, Value};

    fn fixed_now() -> NaiveDateTime {
        parse_datetime("2025-08-02 12:00:00").unwrap()
    }

    fn executor() -> Executor {
        let ts = |s: &str| Value::Timestamp(parse_datetime(s).unwrap());
        let df = DataFrame::new(vec![
            Column::new(
                "dispute_id",
                vec!["D1".into(), "D2".into(), "D3".into(), "D4".into(), "D5".into(), "D6".into()],
            ),
            Column::new(
                "created_at",
                vec![
                    ts("2025-08-02 09:00:00"),
                    ts("2025-08-01 10:00:00"),
                    ts("2025-08-02 11:30:00"),
                    ts("2025-07-20 08:00:00"),
                    ts("2025-08-02 07:15:00"),
                    Value::Null,
                ],
            ),
            Column::new(
                "predicted_category",
                vec![
                    "DUPLICATE_CHARGE".into(),
                    "FRAUD".into(),
                    "DUPLICATE_CHARGE".into(),
                    "FRAUD".into(),
                    "OTHERS".into(),
                    "FRAUD".into(),
                ],
            ),
            Column::new(
                "suggested_action",
                vec![
                    "Auto-refund".into(),
                    "Mark as potential fraud".into(),
                    "Manual review".into(),
                    "Auto-refund".into(),
                    "Ask for more info".into(),
                    Value::Null,
                ],
            ),
            Column::new(
                "amount",
                vec![
                    Value::Float(120.0),
                    Value::Float(75.5),
                    Value::Float(20.0),
                    Value::Float(300.0),
                    Value::Null,
                    Value::Float(10.0),
                ],
            ),
        ])
        .unwrap();
        Executor::new(Arc::new(df)).with_clock(fixed_now)
    }

    #[test]
    fn test_duplicate_charges_today() {
        let out = executor()
            .execute(
                "len(df_combined[(df_combined['predicted_category'] == 'DUPLICATE_CHARGE') & (df_combined['created_at'].dt.date == pd.Timestamp.now().date())])",
            )
            .unwrap();
        assert_eq!(out, QueryOutput::Scalar(Value::Int(2)));
    }

    #[test]
    fn test_unresolved_fraud() {
        let out = executor()
            .execute("df_combined[(df_combined['predicted_category'] == 'FRAUD') & (df_combined['suggested_action'] != 'Auto-refund')]")
            .unwrap();
        let QueryOutput::Table(table) = out else {
            panic!("expected table");
        };
        // A null action is not equal to 'Auto-refund'
        assert_eq!(
            table.column("dispute_id").unwrap().values,
            vec![Value::from("D2"), Value::from("D6")]
        );
    }

    #[test]
    fn test_fallback_preview() {
        let out = executor().execute("df_combined.head()").unwrap();
        assert_eq!(out.kind(), "table");
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn test_fallback_preview_on_empty_datasets() {
        let no_columns = Executor::new(Arc::new(DataFrame::default()));
        let zero_rows = Executor::new(Arc::new(
            DataFrame::new(vec![
                Column::new("dispute_id", vec![]),
                Column::new("predicted_category", vec![]),
            ])
            .unwrap(),
        ));

        for exec in [no_columns, zero_rows] {
            let out = exec.execute("df_combined.head()").unwrap();
            let QueryOutput::Table(table) = out else {
                panic!("expected table");
            };
            assert!(table.height() <= 5);
            assert_eq!(table.height(), 0);
        }
    }

    #[test]
    fn test_value_counts_reductions() {
        let exec = executor();
        let most = exec
            .execute("df_combined['predicted_category'].value_counts().idxmax()")
            .unwrap();
        assert_eq!(most, QueryOutput::Scalar(Value::from("FRAUD")));

        let least = exec
            .execute("df_combined['predicted_category'].value_counts().idxmin()")
            .unwrap();
        assert_eq!(least, QueryOutput::Scalar(Value::from("OTHERS")));

        let top = exec
            .execute("df_combined['predicted_category'].value_counts().max()")
            .unwrap();
        assert_eq!(top, QueryOutput::Scalar(Value::Int(3)));

        let total = exec
            .execute("df_combined.groupby('predicted_category').size().sum()")
            .unwrap();
        assert_eq!(total, QueryOutput::Scalar(Value::Int(6)));
    }

    #[test]
    fn test_idxmax_of_empty_counts() {
        let err = executor()
            .execute("df_combined[df_combined['predicted_category'] == 'NONE']['predicted_category'].value_counts().idxmax()")
            .unwrap_err();
        assert!(err.to_string().contains("ValueError: attempt to get argmax of an empty sequence"));
    }

    #[test]
    fn test_bare_shape() {
        let out = executor().execute("df_combined.shape").unwrap();
        let QueryOutput::Series(shape) = out else {
            panic!("expected a series");
        };
        assert_eq!(shape.values, vec![Value::Int(6), Value::Int(5)]);
    }

    #[test]
    fn test_scalar_arithmetic_errors_do_not_panic() {
        let out = executor().execute("(0 - 9223372036854775807 - 1) % -1").unwrap();
        assert_eq!(out, QueryOutput::Scalar(Value::Int(0)));

        let err = executor().execute("len(df_combined) / 0").unwrap_err();
        assert!(err.to_string().ends_with("ZeroDivisionError: division by zero"));

        // Element-wise division keeps pandas' infinities
        let QueryOutput::Series(ratio) = executor().execute("df_combined['amount'] / 0").unwrap() else {
            panic!("expected a series");
        };
        assert_eq!(ratio.values[0], Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_value_counts_breakdown() {
        let QueryOutput::Grouped(grouped) = executor()
            .execute("df_combined['predicted_category'].value_counts()")
            .unwrap()
        else {
            panic!("expected grouped output");
        };
        assert_eq!(grouped.label_text(0), "FRAUD");
        assert_eq!(grouped.values[0], Value::Int(3));
        assert_eq!(grouped.label_text(1), "DUPLICATE_CHARGE");
    }

    #[test]
    fn test_groupby_sum() {
        let QueryOutput::Grouped(grouped) = executor()
            .execute("df_combined.groupby('predicted_category')['amount'].sum()")
            .unwrap()
        else {
            panic!("expected grouped output");
        };
        assert_eq!(grouped.keys, vec!["predicted_category".to_string()]);
        assert_eq!(grouped.label_text(0), "DUPLICATE_CHARGE");
        assert_eq!(grouped.values[0], Value::Float(140.0));
    }

    #[test]
    fn test_recent_window() {
        let out = executor()
            .execute("len(df_combined[df_combined['created_at'] >= pd.Timestamp.now() - pd.Timedelta(days=7)])")
            .unwrap();
        assert_eq!(out, QueryOutput::Scalar(Value::Int(4)));
    }

    #[test]
    fn test_missing_column_mentions_expression() {
        let expr = "df_combined[df_combined['missing_col'] == 'X']";
        let err = executor().execute(expr).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("Error executing query 'df_combined["));
        assert!(message.contains("missing_col"));
        assert!(!err.is_sandbox_violation());
    }

    #[test]
    fn test_sandbox_violations() {
        for expr in [
            "__import__('os').system('ls')",
            "df_combined.__class__",
            "open('/etc/passwd')",
            "df_combined.to_csv('out.csv')",
        ] {
            let err = executor().execute(expr).unwrap_err();
            assert!(err.is_sandbox_violation(), "{expr}: {err}");
            assert_eq!(err.expression(), expr);
        }
    }

    #[test]
    fn test_syntax_error_is_reported() {
        let err = executor().execute("df_combined[").unwrap_err();
        assert!(matches!(err, ExecutionError::Parse { .. }));
        assert!(err.to_string().starts_with("Error executing query 'df_combined[':"));
    }

    #[test]
    fn test_output_json_shape() {
        let out = executor().execute("df_combined['predicted_category'].unique()").unwrap();
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["type"], "series");
        assert_eq!(json["data"]["name"], "predicted_category");
        assert_eq!(
            json["data"]["values"],
            serde_json::json!(["DUPLICATE_CHARGE", "FRAUD", "OTHERS"])
        );
    }

    #[test]
    fn test_compile_is_deterministic() {
        let exec = executor();
        let a = exec.compile("df_combined['amount'].mean()").unwrap();
        let b = exec.compile("df_combined['amount'].mean()").unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());
    }
}
