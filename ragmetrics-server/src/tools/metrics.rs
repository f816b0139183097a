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

//! Metric tools: one MCP tool per RAG metric.
//!
//! Clients are resolved per call from a fresh environment snapshot, so key
//! rotation or provider changes take effect without a restart.

use crate::mcp::{McpTool, ToolContext, ToolError, ToolResult};
use async_trait::async_trait;
use ragmetrics_core::{
    supported_models, ClientFactory, ConfigError, EmbeddingClient, EnvSnapshot, LLMClient, Role,
};
use ragmetrics_evals::{
    AnswerCorrectness, AnswerRelevancy, ContextPrecision, ContextRecall, Faithfulness, Metric,
    Sample,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

pub const SUPPORTED_FRAMEWORK: &str = "ragas";

/// Supplies judge and embedding clients to the metric tools
pub trait ClientSource: Send + Sync {
    fn llm(&self) -> Result<Arc<dyn LLMClient>, ConfigError>;
    fn embeddings(&self) -> Result<Arc<dyn EmbeddingClient>, ConfigError>;
}

/// Produces the environment snapshot for one resolution
pub type SnapshotFn = Arc<dyn Fn() -> EnvSnapshot + Send + Sync>;

/// Resolves clients from an environment snapshot taken at call time
pub struct EnvClientSource {
    factory: ClientFactory,
    snapshot: SnapshotFn,
}

impl EnvClientSource {
    /// Snapshots the process environment on every call
    pub fn new(factory: ClientFactory) -> Self {
        Self::with_snapshot(factory, Arc::new(EnvSnapshot::capture))
    }

    pub fn with_snapshot(factory: ClientFactory, snapshot: SnapshotFn) -> Self {
        Self { factory, snapshot }
    }
}

impl ClientSource for EnvClientSource {
    fn llm(&self) -> Result<Arc<dyn LLMClient>, ConfigError> {
        self.factory.build_llm_client(&(self.snapshot)())
    }

    fn embeddings(&self) -> Result<Arc<dyn EmbeddingClient>, ConfigError> {
        self.factory.build_embedding_client(&(self.snapshot)())
    }
}

/// The five single-turn metrics exposed as tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Faithfulness,
    AnswerRelevancy,
    ContextPrecision,
    ContextRecall,
    AnswerCorrectness,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Faithfulness,
        MetricKind::AnswerRelevancy,
        MetricKind::ContextPrecision,
        MetricKind::ContextRecall,
        MetricKind::AnswerCorrectness,
    ];

    pub fn tool_name(&self) -> &'static str {
        match self {
            MetricKind::Faithfulness => "calculate_faithfulness",
            MetricKind::AnswerRelevancy => "calculate_answer_relevancy",
            MetricKind::ContextPrecision => "calculate_context_precision",
            MetricKind::ContextRecall => "calculate_context_recall",
            MetricKind::AnswerCorrectness => "calculate_answer_correctness",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            MetricKind::Faithfulness => {
                "Calculate faithfulness: the fraction of claims in the response that are supported by the retrieved contexts."
            }
            MetricKind::AnswerRelevancy => {
                "Calculate answer relevancy: how directly the response addresses the user input, via questions generated from the response and embedding similarity."
            }
            MetricKind::ContextPrecision => {
                "Calculate context precision: whether the retrieved contexts useful for the response are ranked first (average precision)."
            }
            MetricKind::ContextRecall => {
                "Calculate context recall: the fraction of reference answer statements that can be attributed to the retrieved contexts."
            }
            MetricKind::AnswerCorrectness => {
                "Calculate answer correctness: factual overlap (F1) and semantic similarity between the response and the reference answer."
            }
        }
    }

    pub fn needs_embeddings(&self) -> bool {
        matches!(self, MetricKind::AnswerRelevancy | MetricKind::AnswerCorrectness)
    }

    /// Required arguments besides `user_input`
    pub fn required_fields(&self) -> &'static [&'static str] {
        match self {
            MetricKind::Faithfulness | MetricKind::ContextPrecision => {
                &["response", "retrieved_contexts"]
            }
            MetricKind::AnswerRelevancy => &["response"],
            MetricKind::ContextRecall => &["retrieved_contexts", "reference_answer"],
            MetricKind::AnswerCorrectness => &["response", "reference_answer"],
        }
    }

    /// Every argument the tool accepts
    pub fn accepted_fields(&self) -> Vec<&'static str> {
        let mut fields = vec!["user_input"];
        fields.extend_from_slice(self.required_fields());
        fields.extend_from_slice(&["eval_framework", "llm"]);
        if self.needs_embeddings() {
            fields.push("embedding_model");
        }
        if *self == MetricKind::AnswerRelevancy {
            fields.push("strictness");
        }
        fields
    }

    pub fn input_schema(&self) -> Value {
        let mut properties = serde_json::Map::new();
        for field in self.accepted_fields() {
            properties.insert(field.to_string(), property_schema(field));
        }
        let mut required = vec!["user_input"];
        required.extend_from_slice(self.required_fields());

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    fn description(&self) -> String {
        let judges = model_list(Role::Llm);
        let mut description = format!(
            "{} Returns a score between 0 and 1. Supported judge models: {}.",
            self.summary(),
            judges
        );
        if self.needs_embeddings() {
            description.push_str(&format!(
                " Supported embedding models: {}.",
                model_list(Role::Embedding)
            ));
        }
        description
    }
}

fn model_list(role: Role) -> String {
    supported_models(role)
        .into_iter()
        .map(|(provider, model)| format!("{}/{}", provider, model))
        .collect::<Vec<_>>()
        .join(", ")
}

fn property_schema(field: &str) -> Value {
    match field {
        "user_input" => json!({"type": "string", "description": "The user's question"}),
        "response" => json!({"type": "string", "description": "The generated answer"}),
        "reference_answer" => json!({"type": "string", "description": "The ground-truth answer"}),
        "retrieved_contexts" => json!({
            "description": "Retrieved context passages",
            "anyOf": [
                {"type": "string"},
                {"type": "array", "items": {"type": "string"}}
            ]
        }),
        "eval_framework" => json!({
            "type": "string",
            "description": "Evaluation framework",
            "default": SUPPORTED_FRAMEWORK
        }),
        "llm" => json!({"type": "string", "description": "Judge model identifier (informational)"}),
        "embedding_model" => {
            json!({"type": "string", "description": "Embedding model identifier (informational)"})
        }
        "strictness" => json!({
            "type": "integer",
            "minimum": 1,
            "maximum": AnswerRelevancy::MAX_STRICTNESS,
            "default": AnswerRelevancy::DEFAULT_STRICTNESS,
            "description": "Number of questions generated from the response"
        }),
        _ => json!({}),
    }
}

/// `retrieved_contexts` as a single passage or a list of passages
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Contexts {
    One(String),
    Many(Vec<String>),
}

impl Contexts {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Contexts::One(text) => vec![text],
            Contexts::Many(items) => items,
        }
    }
}

/// Arguments shared by all metric tools
#[derive(Debug, Clone, Deserialize)]
pub struct MetricArgs {
    pub user_input: String,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub retrieved_contexts: Option<Contexts>,
    #[serde(default)]
    pub reference_answer: Option<String>,
    #[serde(default)]
    pub eval_framework: Option<String>,
    #[serde(default)]
    pub llm: Option<String>,
    #[serde(default)]
    pub embedding_model: Option<String>,
    #[serde(default)]
    pub strictness: Option<usize>,
}

impl MetricArgs {
    fn to_sample(&self) -> Sample {
        Sample {
            user_input: self.user_input.clone(),
            response: self.response.clone(),
            retrieved_contexts: self
                .retrieved_contexts
                .clone()
                .map(Contexts::into_vec)
                .unwrap_or_default(),
            reference: self.reference_answer.clone(),
        }
    }
}

/// Round to 4 decimal places
pub fn round_score(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// MCP tool computing one metric
pub struct MetricTool {
    kind: MetricKind,
    description: String,
    schema: Value,
    clients: Arc<dyn ClientSource>,
    timeout: Duration,
}

impl MetricTool {
    pub fn new(kind: MetricKind, clients: Arc<dyn ClientSource>, timeout: Duration) -> Self {
        Self {
            kind,
            description: kind.description(),
            schema: kind.input_schema(),
            clients,
            timeout,
        }
    }

    fn build_metric(&self, args: &MetricArgs) -> Result<Box<dyn Metric>, ToolError> {
        let llm = self.clients.llm().map_err(|e| config_failure(Role::Llm, e))?;
        check_advisory("llm", args.llm.as_deref(), llm.model_name());

        let metric: Box<dyn Metric> = match self.kind {
            MetricKind::Faithfulness => Box::new(Faithfulness::new(llm)),
            MetricKind::ContextPrecision => Box::new(ContextPrecision::new(llm)),
            MetricKind::ContextRecall => Box::new(ContextRecall::new(llm)),
            MetricKind::AnswerRelevancy | MetricKind::AnswerCorrectness => {
                let embeddings = self
                    .clients
                    .embeddings()
                    .map_err(|e| config_failure(Role::Embedding, e))?;
                check_advisory(
                    "embedding_model",
                    args.embedding_model.as_deref(),
                    embeddings.model_name(),
                );
                if self.kind == MetricKind::AnswerRelevancy {
                    let strictness = args.strictness.unwrap_or(AnswerRelevancy::DEFAULT_STRICTNESS);
                    Box::new(AnswerRelevancy::new(llm, embeddings).with_strictness(strictness))
                } else {
                    Box::new(AnswerCorrectness::new(llm, embeddings))
                }
            }
        };
        Ok(metric)
    }

    /// Compute the rounded score for already-parsed arguments
    pub async fn score(&self, args: &MetricArgs) -> Result<f64, ToolError> {
        if let Some(framework) = args.eval_framework.as_deref() {
            if !framework.eq_ignore_ascii_case(SUPPORTED_FRAMEWORK) {
                warn!(
                    tool = self.kind.tool_name(),
                    framework,
                    "Unsupported evaluation framework, using ragas"
                );
            }
        }

        let metric = self.build_metric(args)?;
        let sample = args.to_sample();

        let outcome = tokio::time::timeout(self.timeout, metric.score(&sample))
            .await
            .map_err(|_| {
                ToolError::Execution(format!(
                    "{} timed out after {}s",
                    metric.name(),
                    self.timeout.as_secs()
                ))
            })?;
        let score = outcome
            .map_err(|e| ToolError::Execution(format!("{} failed: {}", metric.name(), e)))?;

        Ok(round_score(score.value.clamp(0.0, 1.0)))
    }
}

fn config_failure(role: Role, err: ConfigError) -> ToolError {
    ToolError::Execution(format!("{} client configuration error: {}", role, err))
}

fn check_advisory(argument: &str, requested: Option<&str>, resolved: &str) {
    if let Some(requested) = requested.filter(|r| !r.trim().is_empty()) {
        // Accept both "model" and "provider/model" spellings
        let matches = requested == resolved || requested.rsplit('/').next() == Some(resolved);
        if !matches {
            info!(
                argument,
                requested,
                resolved,
                "Requested model differs from the configured one; using the configured model"
            );
        }
    }
}

#[async_trait]
impl McpTool for MetricTool {
    fn name(&self) -> &str {
        self.kind.tool_name()
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn input_schema(&self) -> &Value {
        &self.schema
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: MetricArgs =
            serde_json::from_value(params).map_err(|e| ToolError::InvalidParams(e.to_string()))?;
        info!(tool = self.kind.tool_name(), request_id = ?context.request_id, "Calculating metric");

        match self.score(&args).await {
            Ok(score) => {
                info!(tool = self.kind.tool_name(), score, "Metric calculated");
                Ok(ToolResult {
                    content: json!(score),
                })
            }
            Err(e) => {
                error!(tool = self.kind.tool_name(), error = %e, "Metric calculation failed");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{CallToolResult, JsonRpcId, JsonRpcRequest, McpHandler, ToolRegistry};
    use crate::tools::test_support::{MockClients, ScriptedJudge};
    use serde_json::json;
    use tempfile::TempDir;

    fn tool(kind: MetricKind, clients: MockClients) -> MetricTool {
        MetricTool::new(kind, Arc::new(clients), Duration::from_secs(5))
    }

    #[test]
    fn test_schema_requirements() {
        let schema = MetricKind::ContextRecall.input_schema();
        assert_eq!(
            schema["required"],
            json!(["user_input", "retrieved_contexts", "reference_answer"])
        );
        assert!(schema["properties"].get("strictness").is_none());

        let schema = MetricKind::AnswerRelevancy.input_schema();
        assert!(schema["properties"].get("strictness").is_some());
        assert!(schema["properties"].get("embedding_model").is_some());
    }

    #[test]
    fn test_description_lists_supported_models() {
        let description = MetricKind::AnswerCorrectness.description();
        assert!(description.contains("openai/gpt-4o-mini"));
        assert!(description.contains("text-embedding-3-small"));
        assert!(!MetricKind::Faithfulness.description().contains("embedding models"));
    }

    #[test]
    fn test_round_score() {
        assert_eq!(round_score(0.833333), 0.8333);
        assert_eq!(round_score(0.66666), 0.6667);
        assert_eq!(round_score(1.0), 1.0);
    }

    #[test]
    fn test_contexts_accept_string_or_list() {
        let args: MetricArgs = serde_json::from_value(json!({
            "user_input": "q",
            "retrieved_contexts": "single passage"
        }))
        .unwrap();
        assert_eq!(args.to_sample().retrieved_contexts, vec!["single passage"]);

        let args: MetricArgs = serde_json::from_value(json!({
            "user_input": "q",
            "retrieved_contexts": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(args.to_sample().retrieved_contexts, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_faithfulness_tool_scores() {
        let judge = ScriptedJudge::new()
            .on("Extract all atomic", json!({"claims": ["a", "b", "c"]}))
            .on(
                "Verify each claim",
                json!({"verifications": [
                    {"verdict": "entailed"}, {"verdict": "entailed"}, {"verdict": "neutral"}
                ]}),
            );
        let tool = tool(MetricKind::Faithfulness, MockClients::llm_only(judge));

        let result = tool
            .execute(
                json!({
                    "user_input": "q",
                    "response": "a. b. c.",
                    "retrieved_contexts": ["ctx"],
                    "eval_framework": "deepeval"
                }),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.content, json!(0.6667));
    }

    #[tokio::test]
    async fn test_llm_only_metric_ignores_missing_embedding_credential() {
        let judge = ScriptedJudge::new().on(
            "REFERENCE ANSWER",
            json!({"classifications": [{"statement": "s", "attributed": 1}]}),
        );
        let tool = tool(MetricKind::ContextRecall, MockClients::llm_only(judge));

        let result = tool
            .execute(
                json!({
                    "user_input": "q",
                    "retrieved_contexts": "ctx",
                    "reference_answer": "s"
                }),
                &ToolContext::default(),
            )
            .await
            .unwrap();
        assert_eq!(result.content, json!(1.0));
    }

    #[tokio::test]
    async fn test_missing_embedding_credential_is_execution_error() {
        let tool = tool(
            MetricKind::AnswerCorrectness,
            MockClients::llm_only(ScriptedJudge::new()),
        );
        let err = tool
            .execute(
                json!({"user_input": "q", "response": "a", "reference_answer": "r"}),
                &ToolContext::default(),
            )
            .await
            .unwrap_err();

        match err {
            ToolError::Execution(message) => {
                assert!(message.contains("embedding client configuration error"));
                assert!(message.contains("OPENAI_API_KEY"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    /// Handler whose metric tools resolve clients through a real factory
    fn env_handler(dir: &TempDir, vars: &[(&str, &str)]) -> McpHandler {
        let mut vars: Vec<(String, String)> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config_file = dir.path().join("absent.yaml");
        vars.push(("LLM_CONFIG_FILE".to_string(), config_file.display().to_string()));
        let secret_dir = dir.path().to_path_buf();

        let source = EnvClientSource::with_snapshot(
            ClientFactory::new(),
            Arc::new(move || {
                EnvSnapshot::from_vars(vars.clone()).with_secret_dir(secret_dir.clone())
            }),
        );
        let source: Arc<dyn ClientSource> = Arc::new(source);

        let registry = ToolRegistry::new();
        for kind in MetricKind::ALL {
            registry
                .register(Arc::new(MetricTool::new(kind, source.clone(), Duration::from_secs(5))))
                .unwrap();
        }
        McpHandler::new(Arc::new(registry))
    }

    async fn call_faithfulness(handler: &McpHandler) -> CallToolResult {
        let request = JsonRpcRequest::new(
            "tools/call",
            Some(json!({
                "name": "calculate_faithfulness",
                "arguments": {
                    "user_input": "What is the capital of France?",
                    "response": "Paris.",
                    "retrieved_contexts": ["Paris is the capital of France."]
                }
            })),
            JsonRpcId::Number(1),
        );
        let response = handler.handle_request(request).await.unwrap();
        assert!(response.error.is_none());
        serde_json::from_value(response.result.unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_missing_key_is_reported_as_tool_error() {
        let dir = TempDir::new().unwrap();
        let result = call_faithfulness(&env_handler(&dir, &[])).await;

        assert_eq!(result.is_error, Some(true));
        let text = result.joined_text();
        assert!(text.contains("llm client configuration error"));
        assert!(text.contains("openai"));
        assert!(text.contains("OPENAI_API_KEY"));
        assert!(text.contains("openai_api_key"));
    }

    #[tokio::test]
    async fn test_malformed_extras_are_reported_as_tool_error() {
        let dir = TempDir::new().unwrap();
        let handler = env_handler(
            &dir,
            &[("OPENAI_API_KEY", "sk-test"), ("LLM_EXTRA_PARAMS", "{not valid json")],
        );
        let result = call_faithfulness(&handler).await;

        assert_eq!(result.is_error, Some(true));
        assert!(result.joined_text().contains("LLM_EXTRA_PARAMS"));
    }

    #[test]
    fn test_strictness_schema_is_bounded() {
        let schema = MetricKind::AnswerRelevancy.input_schema();
        assert_eq!(schema["properties"]["strictness"]["maximum"], 10);
    }

    #[tokio::test]
    async fn test_registry_rejects_missing_required_argument() {
        let registry = ToolRegistry::new();
        registry
            .register(Arc::new(tool(
                MetricKind::Faithfulness,
                MockClients::llm_only(ScriptedJudge::new()),
            )))
            .unwrap();

        let err = registry
            .execute(
                "calculate_faithfulness",
                json!({"user_input": "q", "response": "a"}),
                &ToolContext::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidParams(m) if m.contains("retrieved_contexts")));
    }
}
