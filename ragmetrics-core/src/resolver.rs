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

//! Provider selection per role.

use crate::env::EnvSnapshot;
use crate::error::{ConfigError, Result};
use crate::provider::{ProviderKind, Role};
use crate::secrets::read_credential;

/// An explicit provider name and where it came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderOverride<'a> {
    pub name: &'a str,
    /// Variable or config key that carried the name, used in error messages
    pub source: &'a str,
}

impl<'a> ProviderOverride<'a> {
    pub fn new(name: &'a str, source: &'a str) -> Self {
        Self { name, source }
    }
}

/// Pick the provider for `role`.
///
/// A recognised override is used as-is, or rejected when the provider has
/// no client for `role`. An unrecognised name is logged and ignored. Without
/// an override the LLM role takes the first provider in
/// [`ProviderKind::DETECTION_ORDER`] with a credential, and the embedding
/// role takes `openai`. Both fall back to `openai`, leaving a missing key to
/// be reported at client construction.
pub fn resolve_provider(
    role: Role,
    explicit_override: Option<ProviderOverride<'_>>,
    env: &EnvSnapshot,
) -> Result<ProviderKind> {
    if let Some(over) = explicit_override {
        match over.name.parse::<ProviderKind>() {
            Ok(provider) if provider.supports(role) => {
                tracing::debug!(role = %role, provider = %provider, source = over.source, "Using explicit provider");
                return Ok(provider);
            }
            Ok(provider) => {
                return Err(ConfigError::UnsupportedProvider {
                    provider,
                    role,
                    variable: over.source.to_string(),
                })
            }
            Err(_) => {
                tracing::warn!(
                    role = %role,
                    value = over.name,
                    source = over.source,
                    "Unrecognised provider override, falling back to auto-detection"
                );
            }
        }
    }

    match role {
        Role::Llm => {
            for provider in ProviderKind::DETECTION_ORDER {
                if read_credential(provider, env)?.is_some() {
                    tracing::debug!(provider = %provider, "Auto-detected LLM provider from credentials");
                    return Ok(provider);
                }
            }
            Ok(ProviderKind::OpenAI)
        }
        Role::Embedding => Ok(ProviderKind::OpenAI),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(dir: &TempDir, vars: &[(&str, &str)]) -> EnvSnapshot {
        EnvSnapshot::from_vars(vars.iter().copied()).with_secret_dir(dir.path())
    }

    #[test]
    fn test_no_credentials_defaults_to_openai() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[]);
        assert_eq!(resolve_provider(Role::Llm, None, &env).unwrap(), ProviderKind::OpenAI);
        assert_eq!(
            resolve_provider(Role::Embedding, None, &env).unwrap(),
            ProviderKind::OpenAI
        );
    }

    #[test]
    fn test_explicit_override() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[]);
        let over = ProviderOverride::new("Azure", "LLM_PROVIDER");
        assert_eq!(
            resolve_provider(Role::Llm, Some(over), &env).unwrap(),
            ProviderKind::Azure
        );
    }

    #[test]
    fn test_invalid_role_combination_fails() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[("ANTHROPIC_API_KEY", "ak-test")]);
        let over = ProviderOverride::new("anthropic", "EMBEDDING_PROVIDER");

        let err = resolve_provider(Role::Embedding, Some(over), &env).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::UnsupportedProvider {
                provider: ProviderKind::Anthropic,
                role: Role::Embedding,
                ..
            }
        ));
        assert!(err.to_string().contains("EMBEDDING_PROVIDER"));
    }

    #[test]
    fn test_unknown_override_falls_back_to_detection() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[("ANTHROPIC_API_KEY", "ak-test")]);
        let over = ProviderOverride::new("bedrock", "LLM_PROVIDER");
        assert_eq!(
            resolve_provider(Role::Llm, Some(over), &env).unwrap(),
            ProviderKind::Anthropic
        );
    }

    #[test]
    fn test_detection_order() {
        let dir = TempDir::new().unwrap();

        let both = env(&dir, &[("ANTHROPIC_API_KEY", "ak"), ("CUSTOM_API_KEY", "ck")]);
        assert_eq!(resolve_provider(Role::Llm, None, &both).unwrap(), ProviderKind::Anthropic);

        let lite_and_azure = env(&dir, &[("LITE_API_KEY", "lk"), ("AZURE_API_KEY", "az")]);
        assert_eq!(
            resolve_provider(Role::Llm, None, &lite_and_azure).unwrap(),
            ProviderKind::Azure
        );

        let generic = env(&dir, &[("API_KEY", "generic"), ("ANTHROPIC_API_KEY", "ak")]);
        assert_eq!(resolve_provider(Role::Llm, None, &generic).unwrap(), ProviderKind::OpenAI);
    }

    #[test]
    fn test_detection_sees_secret_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("azure_api_key"), "az-secret").unwrap();
        let env = env(&dir, &[]);
        assert_eq!(resolve_provider(Role::Llm, None, &env).unwrap(), ProviderKind::Azure);
    }

    #[test]
    fn test_embedding_ignores_llm_credentials() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[("AZURE_API_KEY", "az")]);
        assert_eq!(
            resolve_provider(Role::Embedding, None, &env).unwrap(),
            ProviderKind::OpenAI
        );
    }
}
