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

//! # Ragmetrics Core
//!
//! Resolves a ready-to-use LLM judge client and embedding client from
//! layered configuration sources:
//!
//! - mounted secret files (`/run/secrets/<provider>_api_key`)
//! - provider and generic API key variables
//! - an optional YAML/JSON config file (`LLM_CONFIG_FILE`)
//! - role environment variables and JSON extra parameters
//!
//! Every entry point takes an explicit [`EnvSnapshot`] instead of reading
//! the process environment, so resolution is deterministic for a given
//! snapshot.
//!
//! ```no_run
//! use ragmetrics_core::{ClientFactory, EnvSnapshot};
//!
//! let clients = ClientFactory::new().build_clients(&EnvSnapshot::capture())?;
//! println!("judge: {}", clients.llm.model_name());
//! # Ok::<(), ragmetrics_core::ConfigError>(())
//! ```

pub mod assembler;
pub mod cache;
pub mod config_file;
pub mod env;
pub mod error;
pub mod factory;
pub mod llm_client;
pub mod provider;
pub mod resolver;
pub mod secrets;

pub use assembler::{assemble, EffectiveConfig};
pub use cache::{CacheStats, ClientCache};
pub use config_file::load_config_file;
pub use env::EnvSnapshot;
pub use error::ConfigError;
pub use factory::{build_clients, resolve_config, ClientFactory, ClientPair, ResolvedClient};
pub use llm_client::{
    AnthropicClient, EmbedError, EmbeddingClient, LLMClient, LLMError, LLMResponse,
    OpenAIClient, TokenUsage,
};
pub use provider::{supported_models, ProviderKind, Role};
pub use resolver::{resolve_provider, ProviderOverride};
pub use secrets::{read_credential, ApiKey, Credential, CredentialSource};
