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

//! Client factory: resolver + assembler + credential lookup + construction.

use crate::assembler::{assemble, EffectiveConfig};
use crate::cache::ClientCache;
use crate::config_file::{config_file_path, load_config_file, RoleSection};
use crate::env::EnvSnapshot;
use crate::error::{ConfigError, Result};
use crate::llm_client::{AnthropicClient, EmbeddingClient, LLMClient, OpenAIClient};
use crate::provider::{ProviderKind, Role};
use crate::resolver::{resolve_provider, ProviderOverride};
use crate::secrets::{Credential, CredentialSource};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// LLM and embedding handles for one metric invocation
#[derive(Clone)]
pub struct ClientPair {
    pub llm: Arc<dyn LLMClient>,
    pub embedding: Arc<dyn EmbeddingClient>,
}

/// Resolved settings and credential for one role, ready for construction
#[derive(Debug, Clone)]
pub struct ResolvedClient {
    pub config: EffectiveConfig,
    pub credential: Credential,
}

/// The config file as read for one resolution
struct LoadedFile {
    path: PathBuf,
    llm: Option<Map<String, Value>>,
}

impl LoadedFile {
    fn load(env: &EnvSnapshot) -> Result<Self> {
        let path = config_file_path(env);
        let llm = load_config_file(Some(&path))?;
        Ok(Self { path, llm })
    }

    fn section(&self, role: Role) -> Result<Option<RoleSection>> {
        match &self.llm {
            Some(llm) => RoleSection::from_llm_section(llm, role, &self.path),
            None => Ok(None),
        }
    }
}

/// Builds clients from an [`EnvSnapshot`], optionally through a [`ClientCache`]
#[derive(Clone, Default)]
pub struct ClientFactory {
    cache: Option<Arc<ClientCache>>,
}

impl ClientFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cache(mut self, cache: Arc<ClientCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolve provider, parameters and credential for `role`
    pub fn resolve(&self, role: Role, env: &EnvSnapshot) -> Result<ResolvedClient> {
        let file = LoadedFile::load(env)?;
        resolve_role(role, env, &file)
    }

    pub fn build_llm_client(&self, env: &EnvSnapshot) -> Result<Arc<dyn LLMClient>> {
        let file = LoadedFile::load(env)?;
        self.llm_from(resolve_role(Role::Llm, env, &file)?)
    }

    pub fn build_embedding_client(&self, env: &EnvSnapshot) -> Result<Arc<dyn EmbeddingClient>> {
        let file = LoadedFile::load(env)?;
        self.embedding_from(resolve_role(Role::Embedding, env, &file)?)
    }

    /// Resolve both roles, then construct both clients.
    ///
    /// Both resolutions complete before any construction so that a bad
    /// setting in either role fails without touching the other.
    pub fn build_clients(&self, env: &EnvSnapshot) -> Result<ClientPair> {
        let file = LoadedFile::load(env)?;
        let llm = resolve_role(Role::Llm, env, &file)?;
        let embedding = resolve_role(Role::Embedding, env, &file)?;

        Ok(ClientPair {
            llm: self.llm_from(llm)?,
            embedding: self.embedding_from(embedding)?,
        })
    }

    fn llm_from(&self, resolved: ResolvedClient) -> Result<Arc<dyn LLMClient>> {
        let build = || construct_llm(&resolved);
        match &self.cache {
            Some(cache) => cache.get_or_build_llm(
                ClientCache::fingerprint(&resolved.config, &resolved.credential.key),
                build,
            ),
            None => build(),
        }
    }

    fn embedding_from(&self, resolved: ResolvedClient) -> Result<Arc<dyn EmbeddingClient>> {
        let build = || construct_embedding(&resolved);
        match &self.cache {
            Some(cache) => cache.get_or_build_embedding(
                ClientCache::fingerprint(&resolved.config, &resolved.credential.key),
                build,
            ),
            None => build(),
        }
    }
}

/// Resolve the effective configuration for `role` without a credential check
pub fn resolve_config(role: Role, env: &EnvSnapshot) -> Result<EffectiveConfig> {
    let file = LoadedFile::load(env)?;
    let section = file.section(role)?;
    resolve_effective(role, env, section.as_ref())
}

/// Build both clients without caching
pub fn build_clients(env: &EnvSnapshot) -> Result<ClientPair> {
    ClientFactory::new().build_clients(env)
}

fn resolve_effective(
    role: Role,
    env: &EnvSnapshot,
    section: Option<&RoleSection>,
) -> Result<EffectiveConfig> {
    let file_key = match role {
        Role::Llm => "llm.provider",
        Role::Embedding => "llm.embedding.provider",
    };
    let explicit = env
        .get(role.provider_var())
        .map(|name| ProviderOverride::new(name, role.provider_var()))
        .or_else(|| {
            section
                .and_then(|s| s.provider.as_deref())
                .map(|name| ProviderOverride::new(name, file_key))
        });

    let provider = resolve_provider(role, explicit, env)?;
    assemble(role, provider, section, env.get(role.extra_params_var()), env)
}

fn resolve_role(role: Role, env: &EnvSnapshot, file: &LoadedFile) -> Result<ResolvedClient> {
    let section = file.section(role)?;
    let config = resolve_effective(role, env, section.as_ref())?;

    let source = CredentialSource::for_provider(config.provider, env);
    let credential = source
        .read(env)?
        .ok_or_else(|| ConfigError::MissingCredential {
            provider: config.provider,
            role,
            checked: source.locations().iter().map(|l| l.to_string()).collect(),
        })?;

    tracing::info!(
        role = %role,
        provider = %config.provider,
        model = %config.model,
        credential = %credential.location,
        "Resolved client configuration"
    );

    Ok(ResolvedClient { config, credential })
}

fn construct_llm(resolved: &ResolvedClient) -> Result<Arc<dyn LLMClient>> {
    let key = resolved.credential.key.clone();
    Ok(match resolved.config.provider {
        ProviderKind::Anthropic => Arc::new(AnthropicClient::from_config(&resolved.config, key)?),
        ProviderKind::OpenAI | ProviderKind::Azure | ProviderKind::Lite | ProviderKind::Custom => {
            Arc::new(OpenAIClient::from_config(&resolved.config, key)?)
        }
    })
}

fn construct_embedding(resolved: &ResolvedClient) -> Result<Arc<dyn EmbeddingClient>> {
    let key = resolved.credential.key.clone();
    match resolved.config.provider {
        ProviderKind::Anthropic => Err(ConfigError::UnsupportedProvider {
            provider: ProviderKind::Anthropic,
            role: Role::Embedding,
            variable: Role::Embedding.provider_var().to_string(),
        }),
        _ => Ok(Arc::new(OpenAIClient::from_config(&resolved.config, key)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    /// Snapshot rooted in a temp dir: secrets live there and the config
    /// file path points inside it.
    fn env(dir: &TempDir, vars: &[(&str, &str)]) -> EnvSnapshot {
        let config_path = dir.path().join("mcp_config.yaml");
        EnvSnapshot::from_vars(vars.iter().copied())
            .with_var("LLM_CONFIG_FILE", config_path.to_string_lossy())
            .with_secret_dir(dir.path().join("secrets"))
    }

    #[test]
    fn test_openai_key_only() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[("OPENAI_API_KEY", "sk-test")]);

        let pair = build_clients(&env).unwrap();
        assert_eq!(pair.llm.provider(), ProviderKind::OpenAI);
        assert_eq!(pair.llm.model_name(), "gpt-4o-mini");
        assert_eq!(pair.embedding.provider(), ProviderKind::OpenAI);
        assert_eq!(pair.embedding.model_name(), "text-embedding-3-small");
    }

    #[test]
    fn test_anthropic_llm_with_openai_embeddings() {
        let dir = TempDir::new().unwrap();
        let anthropic_only = env(
            &dir,
            &[("LLM_PROVIDER", "anthropic"), ("ANTHROPIC_API_KEY", "ak-test")],
        );

        let factory = ClientFactory::new();
        let llm = factory.build_llm_client(&anthropic_only).unwrap();
        assert_eq!(llm.provider(), ProviderKind::Anthropic);
        assert_eq!(llm.model_name(), "claude-2");

        let err = factory.build_clients(&anthropic_only).err().unwrap();
        assert!(matches!(
            err,
            ConfigError::MissingCredential {
                provider: ProviderKind::OpenAI,
                role: Role::Embedding,
                ..
            }
        ));
        assert!(err.to_string().contains("OPENAI_API_KEY"));

        let with_openai = anthropic_only.with_var("OPENAI_API_KEY", "sk-test");
        let pair = factory.build_clients(&with_openai).unwrap();
        assert_eq!(pair.llm.provider(), ProviderKind::Anthropic);
        assert_eq!(pair.embedding.provider(), ProviderKind::OpenAI);
    }

    #[test]
    fn test_missing_credential_names_provider_and_role() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir, &[]);
        let err = ClientFactory::new().build_llm_client(&env).err().unwrap();
        let message = err.to_string();
        assert!(message.contains("openai"));
        assert!(message.contains("llm"));
        assert!(message.contains("openai_api_key"));
        assert!(message.contains("API_KEY"));
    }

    #[test]
    fn test_embedding_anthropic_override_rejected() {
        let dir = TempDir::new().unwrap();
        let env = env(
            &dir,
            &[("EMBEDDING_PROVIDER", "anthropic"), ("OPENAI_API_KEY", "sk")],
        );
        let err = ClientFactory::new().build_embedding_client(&env).err().unwrap();
        assert!(matches!(err, ConfigError::UnsupportedProvider { .. }));
    }

    #[test]
    fn test_config_file_layers() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("mcp_config.yaml"),
            "llm:\n  provider: custom\n  model: llama-3-70b\n  temperature: 0.2\n  api_base: http://vllm:8000/v1\n  embedding:\n    model: bge-large\n",
        )
        .unwrap();
        let env = env(&dir, &[("LLM_TEMPERATURE", "0.5"), ("API_KEY", "generic")]);

        let llm = resolve_config(Role::Llm, &env).unwrap();
        assert_eq!(llm.provider, ProviderKind::Custom);
        assert_eq!(llm.model, "llama-3-70b");
        assert_eq!(llm.temperature, Some(0.5));
        assert_eq!(llm.api_base.as_deref(), Some("http://vllm:8000/v1"));

        let embedding = resolve_config(Role::Embedding, &env).unwrap();
        assert_eq!(embedding.provider, ProviderKind::OpenAI);
        assert_eq!(embedding.model, "bge-large");

        let resolved = ClientFactory::new().resolve(Role::Llm, &env).unwrap();
        assert_eq!(resolved.credential.key.expose(), "generic");

        // env provider beats file provider
        let env = env.with_var("LLM_PROVIDER", "lite");
        assert_eq!(resolve_config(Role::Llm, &env).unwrap().provider, ProviderKind::Lite);
    }

    #[test]
    fn test_malformed_config_file_fails_fast() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("mcp_config.yaml"), "llm: [unclosed").unwrap();
        let env = env(&dir, &[("OPENAI_API_KEY", "sk")]);

        let err = build_clients(&env).err().unwrap();
        assert!(matches!(err, ConfigError::MalformedConfigFile { .. }));
        assert!(err.to_string().contains("mcp_config.yaml"));
    }

    #[test]
    fn test_invalid_api_base_surfaces_as_config_error() {
        let dir = TempDir::new().unwrap();
        let env = env(
            &dir,
            &[("OPENAI_API_KEY", "sk"), ("OPENAI_API_BASE", "::not-a-url::")],
        );
        let err = build_clients(&env).err().unwrap();
        assert!(matches!(err, ConfigError::ClientConstruction { .. }));
    }

    #[test]
    fn test_cache_reuses_until_inputs_change() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(ClientCache::new(16, Duration::from_secs(60)));
        let factory = ClientFactory::new().with_cache(cache.clone());
        let env = env(&dir, &[("OPENAI_API_KEY", "sk-test")]);

        factory.build_clients(&env).unwrap();
        factory.build_clients(&env).unwrap();
        let stats = cache.stats();
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.hits, 2);

        let changed = env.with_var("LLM_MODEL", "gpt-4o");
        let llm = factory.build_llm_client(&changed).unwrap();
        assert_eq!(llm.model_name(), "gpt-4o");
        assert_eq!(cache.stats().misses, 3);
    }

    #[test]
    fn test_secret_rotation_is_picked_up() {
        let dir = TempDir::new().unwrap();
        let secrets = dir.path().join("secrets");
        std::fs::create_dir(&secrets).unwrap();
        let env = env(&dir, &[]);

        assert!(ClientFactory::new().resolve(Role::Llm, &env).is_err());

        std::fs::write(secrets.join("openai_api_key"), "sk-rotated").unwrap();
        let resolved = ClientFactory::new().resolve(Role::Llm, &env).unwrap();
        assert_eq!(resolved.credential.key.expose(), "sk-rotated");
    }
}
