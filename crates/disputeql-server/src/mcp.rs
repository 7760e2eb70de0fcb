//! MCP (Model Context Protocol) server exposing the query pipeline

use async_trait::async_trait;
use rust_mcp_schema::{
    schema_utils::CallToolError, CallToolRequest, CallToolResult, ContentBlock, Implementation,
    InitializeResult, ListToolsRequest, ListToolsResult, RpcError, ServerCapabilities,
    ServerCapabilitiesTools, TextContent, Tool, ToolInputSchema, LATEST_PROTOCOL_VERSION,
};
use rust_mcp_sdk::{mcp_server::ServerHandler, McpServer};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::query::{QueryEngine, QueryResponse, EXAMPLE_QUERIES};
use crate::render;

pub struct DisputeServerHandler {
    engine: QueryEngine,
}

impl DisputeServerHandler {
    pub fn new(engine: QueryEngine) -> Self {
        Self { engine }
    }

    pub fn server_info() -> InitializeResult {
        InitializeResult {
            protocol_version: LATEST_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ServerCapabilitiesTools { list_changed: None }),
                ..Default::default()
            },
            server_info: Implementation {
                name: "disputeql-server".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                title: Some("Dispute Analysis Query Server".to_string()),
            },
            instructions: Some(
                "Ask questions about payment disputes in plain language with the 'query' tool. \
                 Use the 'schema' tool to see the available columns, categories and actions."
                    .to_string(),
            ),
            meta: None,
        }
    }

    fn tools() -> Vec<Tool> {
        let mut properties = HashMap::new();
        let mut query_prop = Map::new();
        query_prop.insert("type".to_string(), Value::String("string".to_string()));
        query_prop.insert(
            "description".to_string(),
            Value::String("Question about the disputes (e.g., 'How many duplicate charges today?')".to_string()),
        );
        properties.insert("query".to_string(), query_prop);

        vec![
            Tool {
                name: "query".to_string(),
                description: Some(format!(
                    "Answer a natural language question about payment disputes. \
                     Returns the generated pandas expression and its result rendered \
                     as a table, bar chart, list or value. Example questions: {}",
                    EXAMPLE_QUERIES
                        .iter()
                        .map(|q| format!("'{}'", q))
                        .collect::<Vec<_>>()
                        .join(", ")
                )),
                input_schema: ToolInputSchema::new(vec!["query".to_string()], Some(properties)),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            },
            Tool {
                name: "schema".to_string(),
                description: Some(
                    "Describe the combined disputes dataset: columns, predicted categories, \
                     suggested actions and date columns."
                        .to_string(),
                ),
                input_schema: ToolInputSchema::new(vec![], Some(HashMap::new())),
                title: None,
                annotations: None,
                meta: None,
                output_schema: None,
            },
        ]
    }

    fn text_result(text: String, is_error: bool) -> CallToolResult {
        CallToolResult {
            content: vec![ContentBlock::TextContent(TextContent::new(text, None, None))],
            is_error: is_error.then_some(true),
            meta: None,
            structured_content: None,
        }
    }

    async fn handle_query_tool(&self, arguments: Option<Map<String, Value>>) -> Result<CallToolResult, CallToolError> {
        let query = arguments
            .as_ref()
            .and_then(|args| args.get("query"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| CallToolError::from_message("Missing required argument: query"))?;

        let response = self.engine.process_query(query).await;
        Ok(Self::text_result(format_response(&response), !response.success))
    }

    fn handle_schema_tool(&self) -> CallToolResult {
        Self::text_result(self.engine.schema().to_markdown(), false)
    }
}

/// Tool output for one processed query
pub fn format_response(response: &QueryResponse) -> String {
    let body = match (&response.result, &response.error) {
        (Some(output), _) => render::render(output),
        (None, Some(error)) => format!("{}\n", error),
        (None, None) => "(no result)\n".to_string(),
    };

    format!(
        "Query: {}\n\nGenerated code:\n```python\n{}\n```\n\n{}:\n{}",
        response.user_query,
        response.generated_code,
        if response.success { "Results" } else { "Error" },
        body
    )
}

#[async_trait]
impl ServerHandler for DisputeServerHandler {
    async fn handle_list_tools_request(
        &self,
        _request: ListToolsRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<ListToolsResult, RpcError> {
        info!("Listing available tools");

        Ok(ListToolsResult {
            tools: Self::tools(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn handle_call_tool_request(
        &self,
        request: CallToolRequest,
        _runtime: Arc<dyn McpServer>,
    ) -> std::result::Result<CallToolResult, CallToolError> {
        info!("Tool called: {}", request.params.name);

        match request.params.name.as_str() {
            "query" => self.handle_query_tool(request.params.arguments).await,
            "schema" => Ok(self.handle_schema_tool()),
            _ => Err(CallToolError::unknown_tool(request.params.name.clone())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disputeql_frame::{Column, DataFrame};

    fn handler() -> DisputeServerHandler {
        let df = DataFrame::new(vec![Column::new(
            "predicted_category",
            vec!["FRAUD".into(), "OTHERS".into()],
        )])
        .unwrap();
        DisputeServerHandler::new(QueryEngine::new(Arc::new(df), None))
    }

    #[test]
    fn test_tool_names() {
        let names: Vec<String> = DisputeServerHandler::tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["query", "schema"]);
    }

    #[test]
    fn test_query_tool_lists_example_questions() {
        let tools = DisputeServerHandler::tools();
        let description = tools[0].description.as_deref().unwrap();
        for question in EXAMPLE_QUERIES {
            assert!(description.contains(question), "{question}");
        }
    }

    #[tokio::test]
    async fn test_query_tool_requires_query() {
        assert!(handler().handle_query_tool(None).await.is_err());

        let mut args = Map::new();
        args.insert("query".to_string(), Value::String("Show everything".to_string()));
        let result = handler().handle_query_tool(Some(args)).await.unwrap();
        assert_eq!(result.is_error, None);
    }

    #[test]
    fn test_schema_tool_lists_categories() {
        let result = handler().handle_schema_tool();
        let ContentBlock::TextContent(text) = &result.content[0] else {
            panic!("expected text content");
        };
        assert!(text.text.contains("- `FRAUD`"));
    }
}
