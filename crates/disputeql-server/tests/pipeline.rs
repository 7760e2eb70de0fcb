use async_trait::async_trait;
use chrono::NaiveDateTime;
use disputeql_exec::{Executor, QueryOutput};
use disputeql_frame::{load_combined, DataFrame, DataSources, Value};
use disputeql_server::{
    QueryEngine, TranslationError, TranslationProvider, TranslationRequest, EXAMPLE_QUERIES,
    FALLBACK_EXPRESSION,
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Replies with canned text and records the prompts it was given
struct MockProvider {
    reply: Result<String, String>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockProvider {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Err(message.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn slow(text: &str, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reply: Ok(text.to_string()),
            delay: Some(delay),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl TranslationProvider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn translate(&self, request: &TranslationRequest) -> Result<String, TranslationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(request.system_prompt.contains("Available DataFrame: df_combined"));
        assert_eq!(request.max_tokens, 150);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.reply.clone().map_err(TranslationError::Unavailable)
    }
}

fn fixed_now() -> NaiveDateTime {
    disputeql_frame::parse_datetime("2025-08-02 23:00:00").unwrap()
}

fn dataset() -> Arc<DataFrame> {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../data");
    Arc::new(load_combined(&DataSources::in_dir(dir)).unwrap())
}

fn engine(provider: Option<Arc<dyn TranslationProvider>>) -> QueryEngine {
    QueryEngine::with_executor(Executor::new(dataset()).with_clock(fixed_now), provider)
}

#[tokio::test]
async fn test_sample_dataset_keeps_every_dispute() {
    let data = dataset();
    assert_eq!(data.height(), 12);
    assert!(data.column("amount_dispute").is_some());
    assert!(data.column("amount_txn").is_some());

    // D011 has no matching transaction, classification or resolution
    let ids = &data.column("dispute_id").unwrap().values;
    let row = ids.iter().position(|v| *v == Value::from("D011")).unwrap();
    assert!(data.column("merchant").unwrap().values[row].is_null());
    assert!(data.column("predicted_category").unwrap().values[row].is_null());
}

#[tokio::test]
async fn test_count_all_disputes() {
    let response = engine(Some(MockProvider::replying("len(df_combined)")))
        .process_query("Count all disputes")
        .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.generated_code.as_str(), "len(df_combined)");
    assert_eq!(response.result, Some(QueryOutput::Scalar(Value::Int(12))));
}

#[tokio::test]
async fn test_no_backend_returns_preview() {
    let response = engine(None).process_query("Show fraud disputes").await;

    assert!(response.success);
    assert_eq!(response.error, None);
    assert_eq!(response.generated_code.as_str(), FALLBACK_EXPRESSION);
    match response.result {
        Some(QueryOutput::Table(table)) => assert_eq!(table.height(), 5),
        other => panic!("expected a table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_column_fails_with_expression() {
    let response = engine(Some(MockProvider::replying(
        "Here's the code: df_combined[df_combined['missing_col'] == 'X']",
    )))
    .process_query("Filter by missing column")
    .await;

    assert!(!response.success);
    assert!(response.result.is_none());
    let error = response.error.unwrap();
    assert!(error.contains("Error executing query 'df_combined[df_combined['missing_col'] == 'X']'"));
    assert!(error.contains("missing_col"));
}

#[tokio::test]
async fn test_prose_lines_are_dropped() {
    let reply = "To break down disputes by type you can use:\ndf_combined['predicted_category'].value_counts()";
    let response = engine(Some(MockProvider::replying(reply)))
        .process_query("Break down disputes by type")
        .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(
        response.generated_code.as_str(),
        "df_combined['predicted_category'].value_counts()"
    );
    let Some(QueryOutput::Grouped(grouped)) = response.result else {
        panic!("expected grouped counts");
    };
    assert_eq!(grouped.label_text(0), "DUPLICATE_CHARGE");
    assert_eq!(grouped.values[0], Value::Int(3));
    assert_eq!(grouped.label_text(1), "FRAUD");
    assert_eq!(grouped.len(), 5);
}

#[tokio::test]
async fn test_worked_examples_run_on_sample_data() {
    let duplicates_today = "len(df_combined[(df_combined['predicted_category'] == 'DUPLICATE_CHARGE') & (df_combined['created_at'].dt.date == pd.Timestamp.now().date())])";
    let response = engine(Some(MockProvider::replying(duplicates_today)))
        .process_query("How many duplicate charges today?")
        .await;
    assert_eq!(response.result, Some(QueryOutput::Scalar(Value::Int(2))));

    let unresolved_fraud = "df_combined[(df_combined['predicted_category'] == 'FRAUD') & (df_combined['suggested_action'] != 'Auto-refund')]";
    let response = engine(Some(MockProvider::replying(unresolved_fraud)))
        .process_query("List unresolved fraud disputes")
        .await;
    match response.result {
        Some(QueryOutput::Table(table)) => assert_eq!(
            table.column("dispute_id").unwrap().values,
            vec![Value::from("D002"), Value::from("D006"), Value::from("D009")]
        ),
        other => panic!("expected a table, got {:?}", other),
    }
}

#[tokio::test]
async fn test_backend_failure_falls_back() {
    let provider = MockProvider::failing("rate limited");
    let response = engine(Some(provider.clone())).process_query("Count all disputes").await;

    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert!(response.success);
    assert!(response.generated_code.is_fallback());
}

#[tokio::test]
async fn test_unusable_reply_falls_back() {
    let response = engine(Some(MockProvider::replying("I'm sorry, I can't help with that.")))
        .process_query("Tell me a joke")
        .await;
    assert!(response.success);
    assert!(response.generated_code.is_fallback());
}

#[tokio::test]
async fn test_translation_timeout_falls_back() {
    let provider = MockProvider::slow("len(df_combined)", Duration::from_secs(5));
    let response = engine(Some(provider))
        .with_timeout(Duration::from_millis(50))
        .process_query("Count all disputes")
        .await;

    assert!(response.success);
    assert!(response.generated_code.is_fallback());
}

#[tokio::test]
async fn test_sandbox_violation_is_reported() {
    let response = engine(Some(MockProvider::replying("df_combined.__class__.__init__")))
        .process_query("Escape the sandbox")
        .await;

    assert!(!response.success);
    assert!(response.error.unwrap().starts_with("Error executing query 'df_combined.__class__.__init__':"));
}

#[tokio::test]
async fn test_same_reply_is_idempotent() {
    let engine = engine(Some(MockProvider::replying(
        "df_combined.groupby('suggested_action').size()",
    )));
    let first = engine.process_query("Breakdown by action").await;
    let second = engine.process_query("Breakdown by action").await;

    assert!(first.success, "{:?}", first.error);
    assert_eq!(first.generated_code, second.generated_code);
    assert_eq!(first.result, second.result);
}

#[tokio::test]
async fn test_concurrent_queries_share_dataset() {
    let engine = engine(Some(MockProvider::replying("df_combined.shape[0]")));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let engine = engine.clone();
            tokio::spawn(async move { engine.process_query("How many rows?").await })
        })
        .collect();

    for handle in handles {
        let response = handle.await.unwrap();
        assert_eq!(response.result, Some(QueryOutput::Scalar(Value::Int(12))));
    }
}

#[tokio::test]
async fn test_example_questions_answer_without_backend() {
    let engine = engine(None);
    for question in EXAMPLE_QUERIES {
        let response = engine.process_query(question).await;
        assert!(response.success, "{question}: {:?}", response.error);
        assert_eq!(response.user_query, question);
    }
}

#[tokio::test]
async fn test_category_with_most_disputes() {
    let response = engine(Some(MockProvider::replying(
        "df_combined['predicted_category'].value_counts().idxmax()",
    )))
    .process_query("Which category has the most disputes?")
    .await;

    assert!(response.success, "{:?}", response.error);
    assert_eq!(response.result, Some(QueryOutput::Scalar(Value::from("DUPLICATE_CHARGE"))));
}
