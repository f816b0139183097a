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

//! Optional YAML/JSON override document with a top-level `llm` section.
//!
//! ```yaml
//! llm:
//!   provider: openai
//!   model: gpt-4o-mini
//!   temperature: 0.2
//!   extra_params: { top_p: 0.9 }
//!   embedding:
//!     model: text-embedding-3-large
//! ```

use crate::env::{keys, EnvSnapshot};
use crate::error::{ConfigError, Result};
use crate::provider::Role;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "/app/mcp_config.yaml";

/// Key of the nested embedding-role section inside `llm`
const EMBEDDING_SECTION: &str = "embedding";

/// Path from `LLM_CONFIG_FILE`, else the default location
pub fn config_file_path(env: &EnvSnapshot) -> PathBuf {
    env.get(keys::LLM_CONFIG_FILE)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load the `llm` section of the config file at `path`.
///
/// Returns `Ok(None)` when no path is given or the file does not exist,
/// and an empty map when the document has no `llm` key. The format is
/// detected from content: a document starting with `{` is JSON, anything
/// else is YAML.
pub fn load_config_file(path: Option<&Path>) -> Result<Option<Map<String, Value>>> {
    let Some(path) = path else {
        return Ok(None);
    };

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No LLM config file, using defaults");
            return Ok(None);
        }
        Err(e) => return Err(ConfigError::malformed_file(path, e.to_string())),
    };

    let document = parse_document(&content).map_err(|reason| ConfigError::malformed_file(path, reason))?;

    let section = match document {
        Value::Null => Map::new(),
        Value::Object(mut root) => match root.remove("llm") {
            None | Some(Value::Null) => Map::new(),
            Some(Value::Object(section)) => section,
            Some(other) => {
                return Err(ConfigError::malformed_file(
                    path,
                    format!("'llm' must be a mapping, found {}", type_name(&other)),
                ))
            }
        },
        other => {
            return Err(ConfigError::malformed_file(
                path,
                format!("top level must be a mapping, found {}", type_name(&other)),
            ))
        }
    };

    tracing::info!(path = %path.display(), keys = section.len(), "Loaded LLM config file");
    Ok(Some(section))
}

fn parse_document(content: &str) -> std::result::Result<Value, String> {
    let trimmed = content.trim_start();
    if trimmed.is_empty() {
        return Ok(Value::Null);
    }

    // JSON documents go through serde_json; flow-style YAML mappings also
    // start with '{' and land in the YAML parser when that fails.
    if trimmed.starts_with('{') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return Ok(value);
        }
    }
    serde_yaml::from_str(content).map_err(|e| format!("invalid YAML or JSON: {}", e))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

/// Typed view of one role's settings from the config file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoleSection {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub api_base: Option<String>,
    pub api_type: Option<String>,
    pub api_version: Option<String>,
    /// `extra_params` merged with any unrecognised keys
    pub extra: BTreeMap<String, Value>,
}

impl RoleSection {
    /// Extract the section for `role` from a loaded `llm` mapping.
    ///
    /// The LLM role reads the mapping itself, the embedding role reads
    /// `llm.embedding`. `temperature` and `max_tokens` are only typed for
    /// the LLM role; for embeddings they are passthrough keys.
    pub fn from_llm_section(
        llm: &Map<String, Value>,
        role: Role,
        path: &Path,
    ) -> Result<Option<Self>> {
        let (mapping, prefix) = match role {
            Role::Llm => (llm, "llm"),
            Role::Embedding => match llm.get(EMBEDDING_SECTION) {
                None | Some(Value::Null) => return Ok(None),
                Some(Value::Object(m)) => (m, "llm.embedding"),
                Some(other) => {
                    return Err(ConfigError::malformed_file(
                        path,
                        format!("'llm.embedding' must be a mapping, found {}", type_name(other)),
                    ))
                }
            },
        };

        let mut section = RoleSection::default();
        let field = |key: &str| format!("{}.{}", prefix, key);

        for (key, value) in mapping {
            match key.as_str() {
                EMBEDDING_SECTION if role == Role::Llm => {}
                "provider" => section.provider = Some(expect_string(value, &field(key), path)?),
                "model" => section.model = Some(expect_string(value, &field(key), path)?),
                "api_base" => section.api_base = Some(expect_string(value, &field(key), path)?),
                "api_type" => section.api_type = Some(expect_string(value, &field(key), path)?),
                "api_version" => {
                    section.api_version = Some(expect_string(value, &field(key), path)?)
                }
                "temperature" if role == Role::Llm => {
                    section.temperature = Some(value.as_f64().ok_or_else(|| {
                        ConfigError::malformed_file(
                            path,
                            format!("'{}' must be a number, found {}", field(key), type_name(value)),
                        )
                    })?)
                }
                "max_tokens" if role == Role::Llm => {
                    let tokens = value
                        .as_u64()
                        .filter(|t| *t > 0)
                        .and_then(|t| u32::try_from(t).ok())
                        .ok_or_else(|| {
                            ConfigError::malformed_file(
                                path,
                                format!("'{}' must be a positive integer, found {}", field(key), value),
                            )
                        })?;
                    section.max_tokens = Some(tokens);
                }
                "extra_params" => match value {
                    Value::Null => {}
                    Value::Object(extra) => {
                        for (k, v) in extra {
                            section.extra.insert(k.clone(), v.clone());
                        }
                    }
                    other => {
                        return Err(ConfigError::malformed_file(
                            path,
                            format!(
                                "'{}' must be a mapping, found {}",
                                field(key),
                                type_name(other)
                            ),
                        ))
                    }
                },
                _ => {
                    // extra_params entries win over same-named loose keys
                    section.extra.entry(key.clone()).or_insert_with(|| value.clone());
                }
            }
        }

        Ok(Some(section))
    }
}

fn expect_string(value: &Value, field: &str, path: &Path) -> Result<String> {
    value.as_str().map(str::to_string).ok_or_else(|| {
        ConfigError::malformed_file(
            path,
            format!("'{}' must be a string, found {}", field, type_name(value)),
        )
    })
}
