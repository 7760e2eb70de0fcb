//! Natural-language query orchestration
//!
//! Builds the prompt from the live schema, asks the translation backend for
//! code, extracts one expression from the reply and runs it in the sandbox.

use disputeql_exec::{Executor, QueryOutput};
use disputeql_frame::DataFrame;
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Instrument};

use crate::catalog::SchemaDescription;
use crate::extract::{extract, QueryExpression};
use crate::llm::{TranslationProvider, TranslationRequest};
use crate::log_event;
use crate::prompt::build_system_prompt;

/// Questions offered to new users and run by the batch example
pub const EXAMPLE_QUERIES: [&str; 5] = [
    "How many duplicate charges today?",
    "List unresolved fraud disputes",
    "Break down disputes by type",
    "Count all disputes",
    "Show fraud disputes",
];

/// Default bound on a single translation call
pub const DEFAULT_TRANSLATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Outcome of one natural-language query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub user_query: String,
    pub generated_code: QueryExpression,
    pub result: Option<QueryOutput>,
    pub error: Option<String>,
    pub success: bool,
}

impl QueryResponse {
    fn new(user_query: &str, generated_code: QueryExpression, outcome: Result<QueryOutput, String>) -> Self {
        let (result, error) = match outcome {
            Ok(output) => (Some(output), None),
            Err(message) => (None, Some(message)),
        };
        Self {
            user_query: user_query.to_string(),
            generated_code,
            success: error.is_none(),
            result,
            error,
        }
    }
}

#[derive(Clone)]
pub struct QueryEngine {
    executor: Executor,
    provider: Option<Arc<dyn TranslationProvider>>,
    timeout: Duration,
}

impl QueryEngine {
    pub fn new(dataset: Arc<DataFrame>, provider: Option<Arc<dyn TranslationProvider>>) -> Self {
        Self::with_executor(Executor::new(dataset), provider)
    }

    pub fn with_executor(executor: Executor, provider: Option<Arc<dyn TranslationProvider>>) -> Self {
        Self {
            executor,
            provider,
            timeout: DEFAULT_TRANSLATION_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dataset(&self) -> &Arc<DataFrame> {
        self.executor.dataset()
    }

    pub fn schema(&self) -> SchemaDescription {
        SchemaDescription::describe(self.dataset())
    }

    /// Answer a natural-language question; never fails
    pub async fn process_query(&self, user_query: &str) -> QueryResponse {
        let request_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("process_query", request_id = %request_id);

        async {
            info!("Processing query: {}", user_query);
            let start = Instant::now();

            let expression = self.generate(user_query).await;
            let outcome = self
                .executor
                .execute(expression.as_str())
                .map_err(|e| e.to_string());

            match &outcome {
                Ok(output) => info!(kind = output.kind(), rows = output.len(), "Query executed successfully: {}", expression),
                Err(message) => error!("{}", message),
            }

            let response = QueryResponse::new(user_query, expression, outcome);
            log_event!(
                level: tracing::Level::INFO,
                event: "query_processed",
                generated_code: response.generated_code.as_str(),
                success: response.success,
                duration_ms: start.elapsed().as_millis()
            );
            response
        }
        .instrument(span)
        .await
    }

    /// Ask the backend for code and extract one expression from the reply
    async fn generate(&self, user_query: &str) -> QueryExpression {
        let Some(provider) = &self.provider else {
            warn!("No translation backend configured, using fallback expression");
            return QueryExpression::fallback();
        };

        let request = TranslationRequest::new(build_system_prompt(&self.schema()), user_query);

        let text = match tokio::time::timeout(self.timeout, provider.translate(&request)).await {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                error!(backend = provider.name(), "Error in query generation: {}", e);
                return QueryExpression::fallback();
            }
            Err(_) => {
                error!(
                    backend = provider.name(),
                    timeout_secs = self.timeout.as_secs_f64(),
                    "Error in query generation: translation timed out"
                );
                return QueryExpression::fallback();
            }
        };

        let expression = extract(&text);
        if expression.is_fallback() {
            error!("Error in query generation: failed to generate valid pandas code");
        } else {
            info!("Extracted expression: {}", expression);
        }
        expression
    }
}
