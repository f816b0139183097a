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

//! Model Context Protocol (MCP) Server Implementation
//!
//! Exposes the RAG metrics as MCP tools over JSON-RPC 2.0 / HTTP POST.
//!
//! - `initialize`, `notifications/initialized`, `ping`
//! - `tools/list`: every registered tool with its JSON Schema
//! - `tools/call`: arguments are schema-validated before the tool runs;
//!   tool failures come back as results with `isError: true`

pub mod handlers;
pub mod protocol;
pub mod registry;
pub mod server;

pub use handlers::McpHandler;
pub use protocol::*;
pub use registry::{
    McpTool, RegistrationError, ToolContext, ToolError, ToolListEntry, ToolRegistry, ToolResult,
};
pub use server::{McpServer, McpServerState};
