//! rmcp-backed protocol engine.
//!
//! [`GatewayServer`] is the MCP handler exposing the backend search API as a
//! single tool. [`StreamableEngine`] binds it to rmcp's streamable-HTTP
//! transport in stateless mode: no session-ID issuance, one synchronous
//! exchange per request.

use std::borrow::Cow;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use axum::{body::Body, extract::Request, response::Response};
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::*,
    service::{RequestContext, RoleServer},
};
use serde_json::json;
use tower::ServiceExt;

use crate::search::SearchBackend;
use crate::transport::{ProtocolEngine, TransportSession};

const SEARCH_TOOL: &str = "search";

/// MCP server handler exposing the backend search API as a single tool.
#[derive(Clone)]
pub struct GatewayServer {
    backend: Arc<dyn SearchBackend>,
}

impl GatewayServer {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self { backend }
    }

    fn search_tool() -> Tool {
        Tool {
            name: Cow::Borrowed(SEARCH_TOOL),
            title: None,
            description: Some(Cow::Borrowed(
                "Run a web-grounded search query and return the answer with citations.",
            )),
            input_schema: Arc::new(search_input_schema()),
            output_schema: None,
            annotations: None,
            icons: None,
            meta: None,
        }
    }
}

fn search_input_schema() -> JsonObject {
    let schema = json!({
        "type": "object",
        "properties": {
            "query": {
                "type": "string",
                "description": "The question or search query to send to the backend"
            }
        },
        "required": ["query"]
    });
    schema.as_object().cloned().unwrap_or_default()
}

fn tool_error(message: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message.into())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

impl ServerHandler for GatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "HTTP gateway exposing a web-grounded search tool backed by a \
                 chat-completions search API."
                    .to_string(),
            ),
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        std::future::ready(Ok(ListToolsResult {
            tools: vec![Self::search_tool()],
            ..Default::default()
        }))
    }

    fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        let backend = self.backend.clone();
        let name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();

        async move {
            if name != SEARCH_TOOL {
                return Err(McpError::invalid_params(
                    format!("Unknown tool: {name}"),
                    None,
                ));
            }

            let Some(query) = args.get("query").and_then(|value| value.as_str()) else {
                return Ok(tool_error("search requires a `query` string argument"));
            };

            match backend.ask(query).await {
                Ok(answer) => Ok(CallToolResult {
                    content: vec![Content::text(answer)],
                    structured_content: None,
                    is_error: Some(false),
                    meta: None,
                }),
                Err(error) => Ok(tool_error(format!("Search failed: {error:#}"))),
            }
        }
    }
}

/// Production [`ProtocolEngine`]: a fresh rmcp streamable-HTTP service per
/// session, stateless (no session-ID continuity across requests).
pub struct StreamableEngine {
    handler: GatewayServer,
}

impl StreamableEngine {
    pub fn new(handler: GatewayServer) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl ProtocolEngine for StreamableEngine {
    async fn connect(&self) -> Result<Box<dyn TransportSession>> {
        let handler = self.handler.clone();
        let service = StreamableHttpService::new(
            move || Ok(handler.clone()),
            LocalSessionManager::default().into(),
            StreamableHttpServerConfig {
                stateful_mode: false,
                sse_keep_alive: None,
                ..Default::default()
            },
        );

        Ok(Box::new(StreamableSession {
            service: Some(service),
        }))
    }
}

struct StreamableSession {
    service: Option<StreamableHttpService<GatewayServer, LocalSessionManager>>,
}

#[async_trait]
impl TransportSession for StreamableSession {
    async fn handle_request(&mut self, request: Request) -> Result<Response> {
        let service = self
            .service
            .take()
            .ok_or_else(|| anyhow::anyhow!("transport session already consumed"))?;

        let response = service.oneshot(request).await?;
        Ok(response.map(Body::new))
    }

    fn close(&mut self) {
        // Dropping the service tears down the rmcp session state.
        self.service.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_tool_schema_requires_query() {
        let schema = search_input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"][0], "query");
        assert!(schema["properties"]["query"].is_object());
    }

    #[test]
    fn search_tool_is_advertised_with_schema() {
        let tool = GatewayServer::search_tool();
        assert_eq!(tool.name, SEARCH_TOOL);
        assert!(tool.description.is_some());
        assert!(!tool.input_schema.is_empty());
    }

    #[test]
    fn tool_error_marks_result_as_error() {
        let result = tool_error("boom");
        assert_eq!(result.is_error, Some(true));
        assert_eq!(result.content.len(), 1);
    }
}
