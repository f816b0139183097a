// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! MCP Request Handlers
//!
//! Handles JSON-RPC 2.0 requests for the MCP protocol.

use crate::mcp::protocol::*;
use crate::mcp::registry::{ToolContext, ToolError, ToolRegistry};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// MCP request handler
pub struct McpHandler {
    registry: Arc<ToolRegistry>,
}

impl McpHandler {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Handle a JSON-RPC request; notifications produce no response
    pub async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        info!(method = %request.method, "MCP request received");

        let Some(id) = request.id else {
            self.handle_notification(&request.method);
            return None;
        };

        let response = match request.method.as_str() {
            "ping" => JsonRpcResponse::success(id, json!({})),
            "initialize" => self.handle_initialize(id, request.params),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            _ => {
                warn!(method = %request.method, "Unknown MCP method");
                JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method))
            }
        };
        Some(response)
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => info!("MCP client initialized"),
            other => warn!(method = %other, "Ignoring unknown MCP notification"),
        }
    }

    fn handle_initialize(&self, id: JsonRpcId, params: Option<serde_json::Value>) -> JsonRpcResponse {
        let init_params: InitializeParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid initialize params: {}", e)),
                )
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing initialize params"),
                )
            }
        };
        info!(
            client = %init_params.client_info.name,
            client_version = %init_params.client_info.version,
            protocol_version = %init_params.protocol_version,
            "MCP client connecting"
        );

        let result = InitializeResult {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
                logging: Some(LoggingCapability {}),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        to_response(id, &result)
    }

    fn handle_tools_list(&self, id: JsonRpcId) -> JsonRpcResponse {
        let tools = self
            .registry
            .list()
            .into_iter()
            .map(|entry| Tool {
                name: entry.name,
                description: Some(entry.description),
                input_schema: entry.input_schema,
            })
            .collect();

        to_response(
            id,
            &ListToolsResult {
                tools,
                next_cursor: None,
            },
        )
    }

    async fn handle_tools_call(
        &self,
        id: JsonRpcId,
        params: Option<serde_json::Value>,
    ) -> JsonRpcResponse {
        let call_params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params(format!("Invalid tool call params: {}", e)),
                )
            }
            None => {
                return JsonRpcResponse::error(
                    id,
                    JsonRpcError::invalid_params("Missing tool call params"),
                )
            }
        };

        let context = ToolContext {
            request_id: serde_json::to_value(&id).ok(),
        };
        info!(tool = %call_params.name, "Calling MCP tool");

        let result = match self
            .registry
            .execute(&call_params.name, call_params.arguments, &context)
            .await
        {
            Ok(result) => CallToolResult::text(match result.content {
                serde_json::Value::String(text) => text,
                other => other.to_string(),
            }),
            Err(e @ (ToolError::NotFound(_) | ToolError::InvalidParams(_))) => {
                warn!(tool = %call_params.name, error = %e, "Rejected MCP tool call");
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params(e.to_string()));
            }
            Err(ToolError::Execution(message)) => {
                error!(tool = %call_params.name, error = %message, "MCP tool failed");
                CallToolResult::error(message)
            }
        };

        to_response(id, &result)
    }
}

fn to_response<T: serde::Serialize>(id: JsonRpcId, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::registry::{McpTool, ToolResult};
    use async_trait::async_trait;
    use serde_json::Value;

    struct FixedTool {
        schema: Value,
        outcome: Result<Value, String>,
    }

    #[async_trait]
    impl McpTool for FixedTool {
        fn name(&self) -> &str {
            "fixed"
        }

        fn description(&self) -> &str {
            "Returns a canned outcome"
        }

        fn input_schema(&self) -> &Value {
            &self.schema
        }

        async fn execute(&self, _params: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
            self.outcome
                .clone()
                .map(|content| ToolResult { content })
                .map_err(ToolError::Execution)
        }
    }

    fn handler(outcome: Result<Value, String>) -> McpHandler {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(FixedTool {
                schema: json!({"type": "object", "properties": {"n": {"type": "number"}}}),
                outcome,
            }))
            .unwrap();
        McpHandler::new(Arc::new(registry))
    }

    fn call(params: Value) -> JsonRpcRequest {
        JsonRpcRequest::new("tools/call", Some(params), JsonRpcId::Number(7))
    }

    #[tokio::test]
    async fn test_tool_success_is_text_content() {
        let response = handler(Ok(json!(0.8333)))
            .handle_request(call(json!({"name": "fixed", "arguments": {"n": 1}})))
            .await
            .unwrap();
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.joined_text(), "0.8333");
        assert_eq!(result.is_error, None);
        assert_eq!(response.id, JsonRpcId::Number(7));
    }

    #[tokio::test]
    async fn test_execution_failure_is_error_result() {
        let response = handler(Err("LLM credential missing".to_string()))
            .handle_request(call(json!({"name": "fixed", "arguments": {}})))
            .await
            .unwrap();
        assert!(response.error.is_none());
        let result: CallToolResult = serde_json::from_value(response.result.unwrap()).unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(result.joined_text().contains("credential"));
    }

    #[tokio::test]
    async fn test_invalid_arguments_and_unknown_tool() {
        let handler = handler(Ok(json!(1.0)));

        let response = handler
            .handle_request(call(json!({"name": "fixed", "arguments": {"n": "one"}})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);

        let response = handler
            .handle_request(call(json!({"name": "nope"})))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);

        let response = handler
            .handle_request(JsonRpcRequest::new("tools/call", None, JsonRpcId::Number(1)))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32602);
    }

    #[tokio::test]
    async fn test_protocol_methods() {
        let handler = handler(Ok(json!(1.0)));

        let response = handler
            .handle_request(JsonRpcRequest::new(
                "initialize",
                Some(json!({
                    "protocolVersion": MCP_PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {"name": "test", "version": "0.0.1"}
                })),
                JsonRpcId::Number(1),
            ))
            .await
            .unwrap();
        let result = response.result.unwrap();
        assert_eq!(result["protocolVersion"], MCP_PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let response = handler
            .handle_request(JsonRpcRequest::new("tools/list", None, JsonRpcId::Number(2)))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["tools"][0]["name"], "fixed");

        let response = handler
            .handle_request(JsonRpcRequest::new("resources/list", None, JsonRpcId::Number(3)))
            .await
            .unwrap();
        assert_eq!(response.error.unwrap().code, -32601);

        let notification = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: "notifications/initialized".to_string(),
            params: None,
            id: None,
        };
        assert!(handler.handle_request(notification).await.is_none());
    }
}
