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

//! Provider kinds, client roles and the per-provider defaults table.

use crate::env::keys;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported model providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAI,
    Azure,
    Lite,
    Custom,
    Anthropic,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAI,
        ProviderKind::Azure,
        ProviderKind::Lite,
        ProviderKind::Custom,
        ProviderKind::Anthropic,
    ];

    /// Order in which credentials are checked when no LLM provider is named.
    pub const DETECTION_ORDER: [ProviderKind; 5] = [
        ProviderKind::OpenAI,
        ProviderKind::Azure,
        ProviderKind::Anthropic,
        ProviderKind::Lite,
        ProviderKind::Custom,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Lite => "lite",
            ProviderKind::Custom => "custom",
            ProviderKind::Anthropic => "anthropic",
        }
    }

    /// Providers speaking the OpenAI HTTP protocol
    pub fn is_openai_compatible(&self) -> bool {
        !matches!(self, ProviderKind::Anthropic)
    }

    pub fn supports(&self, role: Role) -> bool {
        match role {
            Role::Llm => true,
            Role::Embedding => self.is_openai_compatible(),
        }
    }

    /// Provider-specific API key variable, e.g. `AZURE_API_KEY`
    pub fn api_key_var(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => keys::OPENAI_API_KEY,
            ProviderKind::Azure => keys::AZURE_API_KEY,
            ProviderKind::Lite => keys::LITE_API_KEY,
            ProviderKind::Custom => keys::CUSTOM_API_KEY,
            ProviderKind::Anthropic => keys::ANTHROPIC_API_KEY,
        }
    }

    /// Endpoint variable that takes precedence over `OPENAI_API_BASE` for this provider
    pub fn api_base_var(&self) -> Option<&'static str> {
        match self {
            ProviderKind::Lite => Some(keys::LITE_API_BASE),
            ProviderKind::Custom => Some(keys::CUSTOM_API_BASE),
            ProviderKind::Anthropic => Some(keys::ANTHROPIC_API_BASE),
            ProviderKind::OpenAI | ProviderKind::Azure => None,
        }
    }

    /// Defaults for this provider in the given role, `None` if the role is unsupported
    pub fn defaults(&self, role: Role) -> Option<ProviderDefaults> {
        if !self.supports(role) {
            return None;
        }

        let defaults = match (self, role) {
            (ProviderKind::Anthropic, Role::Llm) => ProviderDefaults {
                model: "claude-2",
                temperature: Some(0.0),
                max_tokens: Some(1024),
                api_type: None,
            },
            (_, Role::Llm) => ProviderDefaults {
                model: "gpt-4o-mini",
                temperature: Some(0.0),
                max_tokens: Some(1024),
                api_type: None,
            },
            (_, Role::Embedding) => ProviderDefaults {
                model: "text-embedding-3-small",
                temperature: None,
                max_tokens: None,
                api_type: None,
            },
        };

        Some(match self {
            ProviderKind::Azure => ProviderDefaults {
                api_type: Some("azure"),
                ..defaults
            },
            _ => defaults,
        })
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ProviderKind::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ConfigError::UnknownProvider(s.to_string()))
    }
}

/// Which client a resolution is for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Llm,
    Embedding,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Llm => "llm",
            Role::Embedding => "embedding",
        }
    }

    /// Variable naming the provider explicitly
    pub fn provider_var(&self) -> &'static str {
        match self {
            Role::Llm => keys::LLM_PROVIDER,
            Role::Embedding => keys::EMBEDDING_PROVIDER,
        }
    }

    pub fn model_var(&self) -> &'static str {
        match self {
            Role::Llm => keys::LLM_MODEL,
            Role::Embedding => keys::EMBEDDING_MODEL,
        }
    }

    pub fn extra_params_var(&self) -> &'static str {
        match self {
            Role::Llm => keys::LLM_EXTRA_PARAMS,
            Role::Embedding => keys::EMBEDDING_EXTRA_PARAMS,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the defaults table
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderDefaults {
    pub model: &'static str,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub api_type: Option<&'static str>,
}

/// `provider -> default model` for every provider supporting `role`.
///
/// Used to advertise judge and embedding models in tool descriptions.
pub fn supported_models(role: Role) -> Vec<(ProviderKind, &'static str)> {
    ProviderKind::ALL
        .into_iter()
        .filter_map(|p| p.defaults(role).map(|d| (p, d.model)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("OpenAI".parse::<ProviderKind>().unwrap(), ProviderKind::OpenAI);
        assert_eq!(" anthropic ".parse::<ProviderKind>().unwrap(), ProviderKind::Anthropic);
        assert!(matches!(
            "bedrock".parse::<ProviderKind>(),
            Err(ConfigError::UnknownProvider(name)) if name == "bedrock"
        ));
    }

    #[test]
    fn test_anthropic_has_no_embedding_defaults() {
        assert!(ProviderKind::Anthropic.defaults(Role::Embedding).is_none());
        assert!(!ProviderKind::Anthropic.supports(Role::Embedding));
        assert_eq!(
            ProviderKind::Anthropic.defaults(Role::Llm).unwrap().model,
            "claude-2"
        );
    }

    #[test]
    fn test_defaults_table() {
        for provider in [
            ProviderKind::OpenAI,
            ProviderKind::Azure,
            ProviderKind::Lite,
            ProviderKind::Custom,
        ] {
            let llm = provider.defaults(Role::Llm).unwrap();
            assert_eq!(llm.model, "gpt-4o-mini");
            assert_eq!(llm.temperature, Some(0.0));
            assert_eq!(llm.max_tokens, Some(1024));

            let embedding = provider.defaults(Role::Embedding).unwrap();
            assert_eq!(embedding.model, "text-embedding-3-small");
            assert_eq!(embedding.temperature, None);
        }

        assert_eq!(ProviderKind::Azure.defaults(Role::Llm).unwrap().api_type, Some("azure"));
        assert_eq!(ProviderKind::OpenAI.defaults(Role::Llm).unwrap().api_type, None);
    }

    #[test]
    fn test_serde_names_match_display() {
        for provider in ProviderKind::ALL {
            let json = serde_json::to_string(&provider).unwrap();
            assert_eq!(json, format!("\"{}\"", provider));
        }
    }

    #[test]
    fn test_supported_embedding_models_exclude_anthropic() {
        let models = supported_models(Role::Embedding);
        assert_eq!(models.len(), 4);
        assert!(models.iter().all(|(p, _)| *p != ProviderKind::Anthropic));
    }
}
