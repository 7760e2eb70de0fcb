//! Dispute analysis MCP server
//!
//! Loads the dispute CSVs, joins them into one dataset and answers natural
//! language questions over MCP with SSE transport.

use anyhow::Context;
use disputeql_server::config::Config;
use disputeql_server::llm::{OpenAiTranslator, TranslationProvider};
use disputeql_server::mcp::DisputeServerHandler;
use disputeql_server::{logging, QueryEngine};
use rust_mcp_sdk::mcp_server::{hyper_server, HyperServerOptions};
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("failed to load configuration")?;
    config.apply_logging_env();
    logging::init();

    let sources = config.data.sources();
    info!(directory = %config.data.directory.display(), "Loading dispute data");
    let dataset = disputeql_frame::load_combined(&sources).context("failed to load dispute data")?;

    let provider: Option<Arc<dyn TranslationProvider>> = match Config::get_openai_api_key() {
        Ok(api_key) => {
            info!(model = %config.llm.model, base_url = ?config.llm.base_url, "OpenAI client configured");
            Some(Arc::new(OpenAiTranslator::new(api_key, &config.llm)))
        }
        Err(e) => {
            warn!("{}; queries will return a preview of the dataset", e);
            None
        }
    };

    let engine = QueryEngine::new(Arc::new(dataset), provider).with_timeout(config.llm.timeout());
    let handler = DisputeServerHandler::new(engine);

    info!("Starting disputeql MCP server on {}:{}", config.server.host, config.server.port);

    let server = hyper_server::create_server(
        DisputeServerHandler::server_info(),
        handler,
        HyperServerOptions {
            host: config.server.host.clone(),
            port: config.server.port,
            sse_support: true,
            ..Default::default()
        },
    );

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("MCP server failed: {}", e))?;

    Ok(())
}
