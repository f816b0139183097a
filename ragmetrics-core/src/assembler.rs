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

//! Parameter assembly.
//!
//! Layers, lowest to highest precedence:
//!
//! 1. per-provider defaults table
//! 2. config file section for the role
//! 3. role environment variables (`LLM_MODEL`, `LLM_TEMPERATURE`, `LLM_MAX_TOKENS`,
//!    `EMBEDDING_MODEL`) and endpoint variables (`OPENAI_API_BASE`, `OPENAI_API_TYPE`,
//!    `OPENAI_API_VERSION`, then `LITE_API_BASE` / `CUSTOM_API_BASE` / `ANTHROPIC_API_BASE`)
//! 4. the JSON extra-parameters object (`LLM_EXTRA_PARAMS` / `EMBEDDING_EXTRA_PARAMS`)
//!
//! File and extras endpoint settings only apply to OpenAI-compatible
//! providers. Anthropic takes its base URL from `ANTHROPIC_API_BASE` alone.

use crate::config_file::RoleSection;
use crate::env::{keys, EnvSnapshot};
use crate::error::{ConfigError, Result};
use crate::provider::{ProviderKind, Role};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

/// Upper bound on passthrough parameters per role
pub const MAX_EXTRA_PARAMS: usize = 64;

/// Fully merged settings for one client
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub role: Role,
    pub provider: ProviderKind,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    /// Provider-specific passthrough parameters, forwarded verbatim
    pub extra: BTreeMap<String, Value>,
}

impl EffectiveConfig {
    /// Whether requests go to an Azure OpenAI deployment
    pub fn is_azure(&self) -> bool {
        self.api_type
            .as_deref()
            .map(|t| t.eq_ignore_ascii_case("azure") || t.eq_ignore_ascii_case("azure_ad"))
            .unwrap_or(false)
    }
}

/// Merge every layer for `role` on `provider`.
///
/// `extra_params_json` is the raw JSON string from the role's extras
/// variable. Numeric overrides are parsed here and a bad value fails with
/// the name of the variable it came from.
pub fn assemble(
    role: Role,
    provider: ProviderKind,
    file_section: Option<&RoleSection>,
    extra_params_json: Option<&str>,
    env: &EnvSnapshot,
) -> Result<EffectiveConfig> {
    let defaults = provider
        .defaults(role)
        .ok_or_else(|| ConfigError::UnsupportedProvider {
            provider,
            role,
            variable: role.provider_var().to_string(),
        })?;

    let protocol = provider.is_openai_compatible();

    // Layer 1: defaults
    let mut config = EffectiveConfig {
        role,
        provider,
        model: defaults.model.to_string(),
        temperature: defaults.temperature,
        max_tokens: defaults.max_tokens,
        api_base: None,
        api_type: defaults.api_type.map(str::to_string),
        api_version: None,
        extra: BTreeMap::new(),
    };

    // Layer 2: config file
    if let Some(section) = file_section {
        if let Some(model) = &section.model {
            config.model = model.clone();
        }
        if role == Role::Llm {
            if let Some(temperature) = section.temperature {
                config.temperature = Some(check_temperature("llm.temperature", temperature)?);
            }
            if section.max_tokens.is_some() {
                config.max_tokens = section.max_tokens;
            }
        }
        if protocol {
            if section.api_base.is_some() {
                config.api_base = section.api_base.clone();
            }
            if section.api_type.is_some() {
                config.api_type = section.api_type.clone();
            }
            if section.api_version.is_some() {
                config.api_version = section.api_version.clone();
            }
        }
        for (key, value) in &section.extra {
            config.extra.insert(key.clone(), value.clone());
        }
    }

    // Layer 3: environment
    if let Some(model) = env.get(role.model_var()) {
        config.model = model.to_string();
    }
    if role == Role::Llm {
        if let Some(raw) = env.get(keys::LLM_TEMPERATURE) {
            let value = raw.parse::<f64>().map_err(|e| {
                ConfigError::invalid_number(keys::LLM_TEMPERATURE, raw, e.to_string())
            })?;
            config.temperature = Some(check_temperature(keys::LLM_TEMPERATURE, value)?);
        }
        if let Some(raw) = env.get(keys::LLM_MAX_TOKENS) {
            config.max_tokens = Some(parse_max_tokens(keys::LLM_MAX_TOKENS, raw)?);
        }
    }
    if protocol {
        if let Some(base) = env.get(keys::OPENAI_API_BASE) {
            config.api_base = Some(base.to_string());
        }
        if let Some(api_type) = env.get(keys::OPENAI_API_TYPE) {
            config.api_type = Some(api_type.to_string());
        }
        if let Some(version) = env.get(keys::OPENAI_API_VERSION) {
            config.api_version = Some(version.to_string());
        }
    }
    if let Some(base) = provider.api_base_var().and_then(|var| env.get(var)) {
        config.api_base = Some(base.to_string());
    }

    // Layer 4: extras
    if let Some(raw) = extra_params_json {
        let variable = role.extra_params_var();
        let extras = parse_extra_params(variable, raw)?;
        for (key, value) in extras {
            let field = format!("{}.{}", variable, key);
            match key.as_str() {
                "model" => config.model = expect_string(&field, &value)?,
                "temperature" if role == Role::Llm => {
                    let temperature = value
                        .as_f64()
                        .ok_or_else(|| ConfigError::invalid_number(&field, &value, "not a number"))?;
                    config.temperature = Some(check_temperature(&field, temperature)?);
                }
                "max_tokens" if role == Role::Llm => {
                    let tokens = match &value {
                        Value::String(s) => parse_max_tokens(&field, s)?,
                        other => parse_max_tokens(&field, &other.to_string())?,
                    };
                    config.max_tokens = Some(tokens);
                }
                "api_base" | "api_type" | "api_version" if !protocol => {
                    tracing::debug!(provider = %provider, key = %key, "Ignoring OpenAI protocol override");
                }
                "api_base" => config.api_base = Some(expect_string(&field, &value)?),
                "api_type" => config.api_type = Some(expect_string(&field, &value)?),
                "api_version" => config.api_version = Some(expect_string(&field, &value)?),
                _ => {
                    config.extra.insert(key, value);
                }
            }
        }
    }

    if config.extra.len() > MAX_EXTRA_PARAMS {
        return Err(ConfigError::InvalidExtraParams {
            variable: role.extra_params_var().to_string(),
            reason: format!(
                "{} passthrough parameters exceed the limit of {}",
                config.extra.len(),
                MAX_EXTRA_PARAMS
            ),
        });
    }

    if config.model.trim().is_empty() {
        return Err(ConfigError::ClientConstruction {
            role,
            provider,
            reason: format!("empty model name (set {})", role.model_var()),
        });
    }

    Ok(config)
}

/// Parse the extras string into key/value pairs. Only shape is checked.
fn parse_extra_params(variable: &str, raw: &str) -> Result<serde_json::Map<String, Value>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(serde_json::Map::new());
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => {
            if map.keys().any(|k| k.trim().is_empty()) {
                return Err(ConfigError::InvalidExtraParams {
                    variable: variable.to_string(),
                    reason: "empty parameter name".to_string(),
                });
            }
            Ok(map)
        }
        Ok(Value::Null) => Ok(serde_json::Map::new()),
        Ok(_) => Err(ConfigError::InvalidExtraParams {
            variable: variable.to_string(),
            reason: "expected a JSON object".to_string(),
        }),
        Err(e) => Err(ConfigError::InvalidExtraParams {
            variable: variable.to_string(),
            reason: e.to_string(),
        }),
    }
}

fn check_temperature(variable: &str, value: f64) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ConfigError::invalid_number(variable, value, "must be finite"))
    }
}

fn parse_max_tokens(variable: &str, raw: &str) -> Result<u32> {
    match raw.trim().parse::<u32>() {
        Ok(0) => Err(ConfigError::invalid_number(variable, raw, "must be greater than zero")),
        Ok(tokens) => Ok(tokens),
        Err(e) => Err(ConfigError::invalid_number(variable, raw, e.to_string())),
    }
}

fn expect_string(field: &str, value: &Value) -> Result<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ConfigError::InvalidExtraParams {
            variable: field.to_string(),
            reason: format!("expected a string, found {}", value),
        })
}
