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

//! MCP Server Implementation
//!
//! Streamable-HTTP style endpoint: JSON-RPC over `POST {path}`, health at
//! `GET {path}/health`.

use crate::mcp::handlers::McpHandler;
use crate::mcp::protocol::*;
use crate::mcp::registry::ToolRegistry;
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tracing::warn;

/// MCP Server state
#[derive(Clone)]
pub struct McpServerState {
    pub handler: Arc<McpHandler>,
}

/// MCP Server
pub struct McpServer {
    state: McpServerState,
    path: String,
}

impl McpServer {
    pub fn new(registry: Arc<ToolRegistry>, path: impl Into<String>) -> Self {
        Self {
            state: McpServerState {
                handler: Arc::new(McpHandler::new(registry)),
            },
            path: path.into(),
        }
    }

    /// Get the Axum router for the MCP server
    pub fn router(&self) -> Router {
        let path = self.path.trim_end_matches('/');
        let path = if path.is_empty() { "/mcp" } else { path };

        Router::new()
            .route(path, post(handle_mcp_request))
            .route(&format!("{}/health", path), get(handle_mcp_health))
            .with_state(self.state.clone())
    }
}

/// Handle MCP health check (GET {path}/health)
async fn handle_mcp_health(State(state): State<McpServerState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "protocol_version": MCP_PROTOCOL_VERSION,
        "server_name": SERVER_NAME,
        "server_version": env!("CARGO_PKG_VERSION"),
        "tools": state.handler.registry().len(),
    }))
}

/// Handle MCP JSON-RPC request over HTTP POST
async fn handle_mcp_request(State(state): State<McpServerState>, body: Bytes) -> Response {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Invalid JSON-RPC request");
            let response = JsonRpcResponse::error(
                JsonRpcId::Null,
                JsonRpcError::parse_error(format!("Invalid JSON: {}", e)),
            );
            return (StatusCode::OK, Json(response)).into_response();
        }
    };

    match state.handler.handle_request(request).await {
        Some(response) => (StatusCode::OK, Json(response)).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}
