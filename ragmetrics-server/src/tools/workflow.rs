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

//! Workflow tool: runs all five metric tools for one question/answer pair.
//!
//! Metrics run concurrently and fail independently; the result maps each
//! tool name to its score or to `{"error": message}`.

use crate::mcp::{
    CallToolParams, CallToolResult, JsonRpcId, JsonRpcRequest, JsonRpcResponse, McpTool,
    ToolContext, ToolError, ToolRegistry, ToolResult,
};
use crate::tools::metrics::MetricKind;
use async_trait::async_trait;
use futures::future::join_all;
use ragmetrics_evals::AnswerRelevancy;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const WORKFLOW_TOOL_NAME: &str = "evaluate_question_answer_with_context_workflow";

/// Invokes a metric tool by name
#[async_trait]
pub trait MetricInvoker: Send + Sync {
    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError>;
}

/// Calls metric tools registered in this process
pub struct LocalInvoker {
    registry: Arc<ToolRegistry>,
}

impl LocalInvoker {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl MetricInvoker for LocalInvoker {
    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        self.registry
            .execute(tool, arguments, &ToolContext::default())
            .await
            .map(|result| result.content)
    }
}

/// Candidate remote metric servers, health-checked in order
pub struct RemoteMetricServers {
    candidates: Vec<String>,
    http: reqwest::Client,
    health_timeout: Duration,
    call_timeout: Duration,
}

impl RemoteMetricServers {
    pub fn new(candidates: Vec<String>, health_timeout: Duration, call_timeout: Duration) -> Self {
        Self {
            candidates,
            http: reqwest::Client::new(),
            health_timeout,
            call_timeout,
        }
    }

    /// First candidate whose health endpoint answers without a server error
    pub async fn connect(&self) -> Result<RemoteInvoker, ToolError> {
        for endpoint in &self.candidates {
            let health = format!("{}/health", endpoint.trim_end_matches('/'));
            match self
                .http
                .get(&health)
                .timeout(self.health_timeout)
                .send()
                .await
            {
                Ok(resp) if !resp.status().is_server_error() => {
                    info!(endpoint = %endpoint, "Using remote metric server");
                    return Ok(RemoteInvoker {
                        endpoint: endpoint.clone(),
                        http: self.http.clone(),
                        timeout: self.call_timeout,
                        next_id: AtomicI64::new(1),
                    });
                }
                Ok(resp) => {
                    debug!(endpoint = %endpoint, status = %resp.status(), "Metric server unhealthy")
                }
                Err(e) => debug!(endpoint = %endpoint, error = %e, "Metric server unreachable"),
            }
        }

        Err(ToolError::Execution(format!(
            "No reachable metric server among: {}",
            self.candidates.join(", ")
        )))
    }
}

/// JSON-RPC `tools/call` client for one metric server
pub struct RemoteInvoker {
    endpoint: String,
    http: reqwest::Client,
    timeout: Duration,
    next_id: AtomicI64,
}

#[async_trait]
impl MetricInvoker for RemoteInvoker {
    async fn call(&self, tool: &str, arguments: Value) -> Result<Value, ToolError> {
        let params = CallToolParams {
            name: tool.to_string(),
            arguments,
        };
        let params =
            serde_json::to_value(params).map_err(|e| ToolError::Execution(e.to_string()))?;
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(params),
            JsonRpcId::Number(self.next_id.fetch_add(1, Ordering::Relaxed)),
        );

        let response = self
            .http
            .post(&self.endpoint)
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| ToolError::Execution(format!("{} request failed: {}", tool, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::Execution(format!(
                "{} returned HTTP {}",
                tool, status
            )));
        }

        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| ToolError::Execution(format!("{} returned invalid JSON-RPC: {}", tool, e)))?;
        if let Some(error) = body.error {
            return Err(ToolError::Execution(format!(
                "{} rejected ({}): {}",
                tool, error.code, error.message
            )));
        }

        let result: CallToolResult = body
            .result
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ToolError::Execution(format!("{} returned invalid result: {}", tool, e)))?
            .ok_or_else(|| ToolError::Execution(format!("{} returned no result", tool)))?;

        let text = result.joined_text();
        if result.is_error == Some(true) {
            return Err(ToolError::Execution(text));
        }
        Ok(serde_json::from_str(&text).unwrap_or(Value::String(text)))
    }
}

/// Where the workflow sends its metric calls
pub enum WorkflowBackend {
    Local(Arc<ToolRegistry>),
    Remote(RemoteMetricServers),
}

pub struct WorkflowTool {
    backend: WorkflowBackend,
    schema: Value,
}

impl WorkflowTool {
    pub fn new(backend: WorkflowBackend) -> Self {
        Self {
            backend,
            schema: workflow_schema(),
        }
    }

    /// Arguments for one metric tool: only the fields it accepts
    fn job_arguments(kind: MetricKind, args: &Map<String, Value>) -> Value {
        let mut job = Map::new();
        for field in kind.accepted_fields() {
            if let Some(value) = args.get(field) {
                job.insert(field.to_string(), value.clone());
            }
        }
        if kind == MetricKind::AnswerRelevancy {
            job.entry("strictness")
                .or_insert(json!(AnswerRelevancy::DEFAULT_STRICTNESS));
        }
        Value::Object(job)
    }

    pub async fn run(&self, args: &Map<String, Value>) -> Result<Map<String, Value>, ToolError> {
        let invoker: Box<dyn MetricInvoker> = match &self.backend {
            WorkflowBackend::Local(registry) => Box::new(LocalInvoker::new(registry.clone())),
            WorkflowBackend::Remote(servers) => Box::new(servers.connect().await?),
        };

        let jobs = MetricKind::ALL.into_iter().map(|kind| {
            let arguments = Self::job_arguments(kind, args);
            let invoker = invoker.as_ref();
            async move { (kind.tool_name(), invoker.call(kind.tool_name(), arguments).await) }
        });

        let mut scores = Map::new();
        for (name, outcome) in join_all(jobs).await {
            let value = match outcome {
                Ok(score) => score,
                Err(e) => {
                    warn!(tool = name, error = %e, "Workflow metric failed");
                    json!({ "error": e.to_string() })
                }
            };
            scores.insert(name.to_string(), value);
        }
        Ok(scores)
    }
}

fn workflow_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "user_input": {"type": "string", "description": "The original user question or input"},
            "response": {"type": "string", "description": "The generated answer to be evaluated"},
            "reference_answer": {
                "type": "string",
                "description": "The correct answer to the user input; use an empty string if not available"
            },
            "retrieved_contexts": {
                "description": "The retrieved context used to support the answer",
                "anyOf": [
                    {"type": "string"},
                    {"type": "array", "items": {"type": "string"}}
                ]
            },
            "eval_framework": {"type": "string", "default": "ragas"},
            "llm": {"type": "string", "description": "Judge model identifier (informational)"},
            "embedding_model": {"type": "string", "description": "Embedding model identifier (informational)"}
        },
        "required": ["user_input", "response", "reference_answer", "retrieved_contexts"]
    })
}

#[async_trait]
impl McpTool for WorkflowTool {
    fn name(&self) -> &str {
        WORKFLOW_TOOL_NAME
    }

    fn description(&self) -> &str {
        "Calculates faithfulness, answer relevancy, context precision, context recall and \
         answer correctness for a question-answering task with context. Returns a mapping \
         from metric tool name to score, or to an error object for metrics that failed."
    }

    fn input_schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, params: Value, _context: &ToolContext) -> Result<ToolResult, ToolError> {
        let args = match params {
            Value::Object(map) => map,
            _ => return Err(ToolError::InvalidParams("arguments must be an object".to_string())),
        };
        info!(tool = WORKFLOW_TOOL_NAME, "Running evaluation workflow");

        let scores = self.run(&args).await?;
        Ok(ToolResult {
            content: Value::Object(scores),
        })
    }
}
