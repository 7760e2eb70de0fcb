//! Example: answering the stock questions in one batch
//!
//! Loads the dispute CSVs and runs each example question through the query
//! engine, printing the generated code and its result. Questions given on the
//! command line replace the stock set. Without OPENAI_API_KEY every answer is
//! the dataset preview.
//!
//! ```bash
//! cargo run -p disputeql-server --example run_queries -- "Count all disputes"
//! ```

use anyhow::Context;
use disputeql_server::config::Config;
use disputeql_server::llm::{OpenAiTranslator, TranslationProvider};
use disputeql_server::{render, QueryEngine, EXAMPLE_QUERIES};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env().context("failed to load configuration")?;
    let dataset = disputeql_frame::load_combined(&config.data.sources())
        .context("failed to load dispute data")?;

    let provider: Option<Arc<dyn TranslationProvider>> = Config::get_openai_api_key()
        .ok()
        .map(|key| Arc::new(OpenAiTranslator::new(key, &config.llm)) as Arc<dyn TranslationProvider>);
    let engine = QueryEngine::new(Arc::new(dataset), provider).with_timeout(config.llm.timeout());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let questions: Vec<&str> = if args.is_empty() {
        EXAMPLE_QUERIES.to_vec()
    } else {
        args.iter().map(String::as_str).collect()
    };

    for question in questions {
        println!("\n{}", "=".repeat(50));
        println!("Query: {}", question);
        println!("{}", "=".repeat(50));

        let response = engine.process_query(question).await;
        println!("Generated code: {}", response.generated_code);
        match (&response.result, &response.error) {
            (Some(output), _) => print!("Result:\n{}", render::render(output)),
            (None, Some(error)) => println!("Error: {}", error),
            (None, None) => println!("(no result)"),
        }
    }

    Ok(())
}
