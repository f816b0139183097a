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

//! LLM and embedding client handles used by the metric judges

use crate::assembler::EffectiveConfig;
use crate::env::keys;
use crate::error::ConfigError;
use crate::provider::{ProviderKind, Role};
use crate::secrets::ApiKey;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

const JUDGE_SYSTEM_PROMPT: &str = "You are an expert evaluator. Respond only with valid JSON.";

/// Trait for LLM clients used as judges
#[async_trait]
pub trait LLMClient: Send + Sync {
    /// Send a prompt and get a (JSON) completion back
    async fn evaluate(&self, prompt: String) -> Result<LLMResponse, LLMError>;

    fn model_name(&self) -> &str;

    fn provider(&self) -> ProviderKind;
}

/// Trait for embedding clients used by similarity metrics
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed a single text string
    async fn embed(&self, text: &str) -> Result<Vec<f64>, EmbedError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::InvalidResponse {
                provider: self.provider(),
                message: "No embedding returned".to_string(),
            })
    }

    /// Embed a batch of texts, one vector per input in input order
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError>;

    fn model_name(&self) -> &str;

    fn provider(&self) -> ProviderKind;
}

/// Response from LLM
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMResponse {
    pub content: String,
    pub usage: TokenUsage,
    pub model: String,
}

impl LLMResponse {
    /// Parse response as JSON
    pub fn as_json(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::from_str(&self.content)
    }
}

/// Token usage information
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Errors from LLM clients at call time
#[derive(Debug, Error)]
pub enum LLMError {
    #[error("{provider} API error (HTTP {status}): {message}")]
    ApiError {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("{provider} rate limit exceeded")]
    RateLimitExceeded { provider: ProviderKind },

    #[error("{provider} returned an invalid response: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} request failed: {source}")]
    Http {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors from embedding clients at call time
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("{provider} embedding API error (HTTP {status}): {message}")]
    ApiError {
        provider: ProviderKind,
        status: u16,
        message: String,
    },

    #[error("{provider} embedding rate limit exceeded")]
    RateLimitExceeded { provider: ProviderKind },

    #[error("{provider} returned an invalid embedding response: {message}")]
    InvalidResponse {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} embedding request failed: {source}")]
    Http {
        provider: ProviderKind,
        #[source]
        source: reqwest::Error,
    },
}

/// Where OpenAI-protocol requests are sent
#[derive(Debug, Clone, PartialEq)]
enum Endpoint {
    Standard { base_url: String },
    /// `{base}/openai/deployments/{model}/...?api-version=...`
    Azure { base_url: String, api_version: String },
}

/// OpenAI-protocol client (openai, azure, lite, custom)
pub struct OpenAIClient {
    provider: ProviderKind,
    api_key: ApiKey,
    model: String,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    endpoint: Endpoint,
    extra: BTreeMap<String, Value>,
    client: reqwest::Client,
}

impl OpenAIClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    /// Build a client from resolved settings.
    ///
    /// Fails when the base URL does not parse, or when an Azure endpoint
    /// lacks its base URL or API version.
    pub fn from_config(config: &EffectiveConfig, api_key: ApiKey) -> Result<Self, ConfigError> {
        let construction = |reason: String| ConfigError::ClientConstruction {
            role: config.role,
            provider: config.provider,
            reason,
        };

        if !config.provider.is_openai_compatible() {
            return Err(construction(
                "provider does not speak the OpenAI protocol".to_string(),
            ));
        }

        let base_url = match config.api_base.as_deref() {
            Some(base) => validate_base_url(base).map_err(construction)?,
            None => Self::DEFAULT_BASE_URL.to_string(),
        };

        let endpoint = if config.is_azure() {
            if config.api_base.is_none() {
                return Err(construction(format!(
                    "Azure endpoints need an API base URL (set {})",
                    keys::OPENAI_API_BASE
                )));
            }
            let api_version = config.api_version.clone().ok_or_else(|| {
                construction(format!(
                    "Azure endpoints need an API version (set {})",
                    keys::OPENAI_API_VERSION
                ))
            })?;
            Endpoint::Azure {
                base_url,
                api_version,
            }
        } else {
            Endpoint::Standard { base_url }
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| construction(e.to_string()))?;

        Ok(Self {
            provider: config.provider,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            endpoint,
            extra: config.extra.clone(),
            client,
        })
    }

    fn url(&self, operation: &str) -> String {
        match &self.endpoint {
            Endpoint::Standard { base_url } => format!("{}/{}", base_url, operation),
            Endpoint::Azure { base_url, .. } => format!(
                "{}/openai/deployments/{}/{}",
                base_url, self.model, operation
            ),
        }
    }

    fn post(&self, operation: &str) -> reqwest::RequestBuilder {
        let request = self
            .client
            .post(self.url(operation))
            .header("Content-Type", "application/json");

        match &self.endpoint {
            Endpoint::Standard { .. } => request.header(
                "Authorization",
                format!("Bearer {}", self.api_key.expose()),
            ),
            Endpoint::Azure { api_version, .. } => request
                .header("api-key", self.api_key.expose())
                .query(&[("api-version", api_version.as_str())]),
        }
    }
}

#[async_trait]
impl EmbeddingClient for OpenAIClient {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f64>>, EmbedError> {
        let provider = self.provider;
        let mut request = serde_json::json!({
            "model": self.model,
            "input": texts
        });
        merge_extra(&mut request, &self.extra);

        let response = self
            .post("embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|source| EmbedError::Http { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(EmbedError::RateLimitExceeded { provider });
            }
            let message = response.text().await.unwrap_or_default();
            return Err(EmbedError::ApiError {
                provider,
                status: status.as_u16(),
                message,
            });
        }

        let response_data: serde_json::Value = response
            .json()
            .await
            .map_err(|source| EmbedError::Http { provider, source })?;

        let mut indexed = Vec::new();
        if let Some(data) = response_data["data"].as_array() {
            for (position, item) in data.iter().enumerate() {
                if let Some(embedding_vec) = item["embedding"].as_array() {
                    let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
                    let vec: Vec<f64> = embedding_vec.iter().filter_map(|v| v.as_f64()).collect();
                    indexed.push((index, vec));
                }
            }
        }
        indexed.sort_by_key(|(index, _)| *index);

        if indexed.len() != texts.len() {
            return Err(EmbedError::InvalidResponse {
                provider,
                message: format!("Expected {} embeddings, got {}", texts.len(), indexed.len()),
            });
        }

        Ok(indexed.into_iter().map(|(_, vec)| vec).collect())
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> ProviderKind {
        self.provider
    }
}

#[async_trait]
impl LLMClient for OpenAIClient {
    async fn evaluate(&self, prompt: String) -> Result<LLMResponse, LLMError> {
        let provider = self.provider;
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": JUDGE_SYSTEM_PROMPT
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "response_format": { "type": "json_object" }
        });
        if let Some(temperature) = self.temperature {
            request["temperature"] = serde_json::json!(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            request["max_tokens"] = serde_json::json!(max_tokens);
        }
        merge_extra(&mut request, &self.extra);

        let response = self
            .post("chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|source| LLMError::Http { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded { provider });
            }
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                provider,
                status: status.as_u16(),
                message,
            });
        }

        let response_data: serde_json::Value = response
            .json()
            .await
            .map_err(|source| LLMError::Http { provider, source })?;

        let content = response_data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse {
                provider,
                message: "Missing content".to_string(),
            })?
            .to_string();

        let usage_data = &response_data["usage"];
        let usage = TokenUsage {
            prompt_tokens: usage_data["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            completion_tokens: usage_data["completion_tokens"].as_u64().unwrap_or(0) as u32,
            total_tokens: usage_data["total_tokens"].as_u64().unwrap_or(0) as u32,
        };

        Ok(LLMResponse {
            content,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> ProviderKind {
        self.provider
    }
}

/// Anthropic Claude client implementation
pub struct AnthropicClient {
    api_key: ApiKey,
    model: String,
    temperature: Option<f64>,
    max_tokens: u32,
    base_url: String,
    extra: BTreeMap<String, Value>,
    client: reqwest::Client,
}

impl AnthropicClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.anthropic.com/v1";
    const API_VERSION: &'static str = "2023-06-01";

    pub fn from_config(config: &EffectiveConfig, api_key: ApiKey) -> Result<Self, ConfigError> {
        let construction = |reason: String| ConfigError::ClientConstruction {
            role: config.role,
            provider: config.provider,
            reason,
        };

        if config.provider != ProviderKind::Anthropic || config.role != Role::Llm {
            return Err(construction(
                "Anthropic clients only serve the llm role".to_string(),
            ));
        }

        let base_url = match config.api_base.as_deref() {
            Some(base) => validate_base_url(base).map_err(construction)?,
            None => Self::DEFAULT_BASE_URL.to_string(),
        };

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| construction(e.to_string()))?;

        Ok(Self {
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens.unwrap_or(1024),
            base_url,
            extra: config.extra.clone(),
            client,
        })
    }
}

#[async_trait]
impl LLMClient for AnthropicClient {
    async fn evaluate(&self, prompt: String) -> Result<LLMResponse, LLMError> {
        let provider = ProviderKind::Anthropic;
        let mut request = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "system": JUDGE_SYSTEM_PROMPT
        });
        if let Some(temperature) = self.temperature {
            request["temperature"] = serde_json::json!(temperature);
        }
        merge_extra(&mut request, &self.extra);

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.api_key.expose())
            .header("anthropic-version", Self::API_VERSION)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|source| LLMError::Http { provider, source })?;

        if !response.status().is_success() {
            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(LLMError::RateLimitExceeded { provider });
            }
            let message = response.text().await.unwrap_or_default();
            return Err(LLMError::ApiError {
                provider,
                status: status.as_u16(),
                message,
            });
        }

        let response_data: serde_json::Value = response
            .json()
            .await
            .map_err(|source| LLMError::Http { provider, source })?;

        let content = response_data["content"][0]["text"]
            .as_str()
            .ok_or_else(|| LLMError::InvalidResponse {
                provider,
                message: "Missing content".to_string(),
            })?
            .to_string();

        let usage_data = &response_data["usage"];
        let input_tokens = usage_data["input_tokens"].as_u64().unwrap_or(0);
        let output_tokens = usage_data["output_tokens"].as_u64().unwrap_or(0);
        let usage = TokenUsage {
            prompt_tokens: input_tokens as u32,
            completion_tokens: output_tokens as u32,
            total_tokens: (input_tokens + output_tokens) as u32,
        };

        Ok(LLMResponse {
            content,
            usage,
            model: self.model.clone(),
        })
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }
}

/// Passthrough parameters override request fields of the same name
fn merge_extra(request: &mut Value, extra: &BTreeMap<String, Value>) {
    if let Some(body) = request.as_object_mut() {
        for (key, value) in extra {
            body.insert(key.clone(), value.clone());
        }
    }
}

fn validate_base_url(raw: &str) -> Result<String, String> {
    let parsed = url::Url::parse(raw).map_err(|e| format!("invalid API base URL '{}': {}", raw, e))?;
    match parsed.scheme() {
        "http" | "https" => Ok(raw.trim_end_matches('/').to_string()),
        scheme => Err(format!(
            "invalid API base URL '{}': unsupported scheme '{}'",
            raw, scheme
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn config(role: Role, provider: ProviderKind, base: &str) -> EffectiveConfig {
        let defaults = provider.defaults(role).unwrap();
        EffectiveConfig {
            role,
            provider,
            model: defaults.model.to_string(),
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            api_base: Some(base.to_string()),
            api_type: defaults.api_type.map(str::to_string),
            api_version: None,
            extra: BTreeMap::new(),
        }
    }

    fn chat_body(content: &str) -> String {
        json!({
            "choices": [{"message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_openai_chat_request_carries_merged_params() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.2,
                "max_tokens": 64,
                "top_p": 0.9
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(chat_body(r#"{"ok": true}"#))
            .create_async()
            .await;

        let mut cfg = config(Role::Llm, ProviderKind::OpenAI, &server.url());
        cfg.temperature = Some(0.2);
        cfg.max_tokens = Some(64);
        cfg.extra.insert("top_p".to_string(), json!(0.9));

        let client = OpenAIClient::from_config(&cfg, ApiKey::new("sk-test")).unwrap();
        let response = client.evaluate("judge this".to_string()).await.unwrap();

        assert_eq!(response.as_json().unwrap()["ok"], json!(true));
        assert_eq!(response.usage.total_tokens, 15);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_azure_deployment_url_and_header() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/openai/deployments/gpt-4o-mini/chat/completions")
            .match_query(Matcher::UrlEncoded(
                "api-version".into(),
                "2024-02-01".into(),
            ))
            .match_header("api-key", "az-key")
            .with_status(200)
            .with_body(chat_body("{}"))
            .create_async()
            .await;

        let mut cfg = config(Role::Llm, ProviderKind::Azure, &server.url());
        cfg.api_version = Some("2024-02-01".to_string());

        let client = OpenAIClient::from_config(&cfg, ApiKey::new("az-key")).unwrap();
        client.evaluate("prompt".to_string()).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rate_limit_carries_provider() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .create_async()
            .await;

        let cfg = config(Role::Llm, ProviderKind::Lite, &server.url());
        let client = OpenAIClient::from_config(&cfg, ApiKey::new("lk")).unwrap();
        let err = client.evaluate("prompt".to_string()).await.unwrap_err();
        assert!(matches!(
            err,
            LLMError::RateLimitExceeded {
                provider: ProviderKind::Lite
            }
        ));
    }

    #[tokio::test]
    async fn test_api_error_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(401)
            .with_body("invalid api key")
            .create_async()
            .await;

        let cfg = config(Role::Llm, ProviderKind::Custom, &server.url());
        let client = OpenAIClient::from_config(&cfg, ApiKey::new("bad")).unwrap();
        let err = client.evaluate("prompt".to_string()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("custom"));
        assert!(message.contains("401"));
        assert!(message.contains("invalid api key"));
    }

    #[tokio::test]
    async fn test_embeddings_are_returned_in_input_order() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .match_body(Matcher::PartialJson(json!({
                "model": "text-embedding-3-small",
                "dimensions": 2
            })))
            .with_status(200)
            .with_body(
                json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let mut cfg = config(Role::Embedding, ProviderKind::OpenAI, &server.url());
        cfg.extra.insert("dimensions".to_string(), json!(2));
        let client = OpenAIClient::from_config(&cfg, ApiKey::new("sk")).unwrap();

        let vectors = client
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_embedding_count_mismatch() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(200)
            .with_body(json!({"data": []}).to_string())
            .create_async()
            .await;

        let cfg = config(Role::Embedding, ProviderKind::OpenAI, &server.url());
        let client = OpenAIClient::from_config(&cfg, ApiKey::new("sk")).unwrap();
        let err = client.embed("text").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn test_anthropic_messages_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/messages")
            .match_header("x-api-key", "ak-test")
            .match_header("anthropic-version", "2023-06-01")
            .match_body(Matcher::PartialJson(json!({
                "model": "claude-2",
                "max_tokens": 1024
            })))
            .with_status(200)
            .with_body(
                json!({
                    "content": [{"type": "text", "text": "{\"verdict\": 1}"}],
                    "usage": {"input_tokens": 10, "output_tokens": 4}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let cfg = config(Role::Llm, ProviderKind::Anthropic, &server.url());
        let client = AnthropicClient::from_config(&cfg, ApiKey::new("ak-test")).unwrap();
        let response = client.evaluate("prompt".to_string()).await.unwrap();

        assert_eq!(response.as_json().unwrap()["verdict"], json!(1));
        assert_eq!(response.usage.total_tokens, 14);
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url_is_construction_error() {
        let cfg = config(Role::Llm, ProviderKind::OpenAI, "not a url");
        let err = OpenAIClient::from_config(&cfg, ApiKey::new("sk")).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::ClientConstruction {
                role: Role::Llm,
                provider: ProviderKind::OpenAI,
                ..
            }
        ));
        assert!(err.to_string().contains("not a url"));

        let cfg = config(Role::Llm, ProviderKind::OpenAI, "ftp://files.example.com");
        assert!(OpenAIClient::from_config(&cfg, ApiKey::new("sk")).is_err());
    }

    #[test]
    fn test_azure_requires_version() {
        let cfg = config(Role::Llm, ProviderKind::Azure, "https://myres.openai.azure.com");
        let err = OpenAIClient::from_config(&cfg, ApiKey::new("az")).err().unwrap();
        assert!(err.to_string().contains("OPENAI_API_VERSION"));
    }

    #[test]
    fn test_base_url_trailing_slash() {
        assert_eq!(
            validate_base_url("http://litellm:4000/v1/").unwrap(),
            "http://litellm:4000/v1"
        );
    }
}
