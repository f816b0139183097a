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

//! In-memory judge and embedding clients for tests.
//!
//! Enabled for dependents through the `test-util` feature.

use async_trait::async_trait;
use parking_lot::Mutex;
use ragmetrics_core::{
    EmbedError, EmbeddingClient, LLMClient, LLMError, LLMResponse, ProviderKind, TokenUsage,
};
use std::collections::HashMap;

/// Judge that answers by matching a marker in the prompt
pub struct ScriptedJudge {
    rules: Vec<(String, String)>,
    fallback: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl Default for ScriptedJudge {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedJudge {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply with `json` to any prompt containing `marker`; first match wins
    pub fn on(mut self, marker: &str, json: serde_json::Value) -> Self {
        self.rules.push((marker.to_string(), json.to_string()));
        self
    }

    pub fn fallback_raw(mut self, content: &str) -> Self {
        self.fallback = Some(content.to_string());
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LLMClient for ScriptedJudge {
    async fn evaluate(&self, prompt: String) -> Result<LLMResponse, LLMError> {
        let content = self
            .rules
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply.clone())
            .or_else(|| self.fallback.clone());
        self.prompts.lock().push(prompt);

        match content {
            Some(content) => Ok(LLMResponse {
                content,
                usage: TokenUsage::default(),
                model: "scripted".to_string(),
            }),
            None => Err(LLMError::InvalidResponse {
                provider: ProviderKind::OpenAI,
                message: "no scripted reply".to_string(),
            }),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }
}

/// Embeddings looked up by exact text; unknown text maps to `default`
pub struct FixedEmbeddings {
    vectors: HashMap<String, Vec<f64>>,
    default: Vec<f64>,
}

impl FixedEmbeddings {
    pub fn new(default: Vec<f64>) -> Self {
        Self {
            vectors: HashMap::new(),
            default,
        }
    }

    pub fn with(mut self, text: &str, vector: Vec<f64>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }
}

#[async_trait]
impl EmbeddingClient for FixedEmbeddings {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        Ok(texts
            .iter()
            .map(|t| self.vectors.get(t).cloned().unwrap_or_else(|| self.default.clone()))
            .collect())
    }

    fn model_name(&self) -> &str {
        "fixed"
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }
}
