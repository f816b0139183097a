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

use crate::tools::metrics::ClientSource;
use ragmetrics_core::{ConfigError, EmbeddingClient, LLMClient, ProviderKind, Role};
pub use ragmetrics_evals::testing::{FixedEmbeddings, ScriptedJudge};
use std::sync::Arc;

/// Fixed clients; a missing embedding client reports a missing credential
pub struct MockClients {
    llm: Arc<dyn LLMClient>,
    embeddings: Option<Arc<dyn EmbeddingClient>>,
}

impl MockClients {
    pub fn llm_only(judge: ScriptedJudge) -> Self {
        Self {
            llm: Arc::new(judge),
            embeddings: None,
        }
    }

    pub fn with_embeddings(judge: ScriptedJudge, embeddings: FixedEmbeddings) -> Self {
        Self {
            llm: Arc::new(judge),
            embeddings: Some(Arc::new(embeddings)),
        }
    }
}

impl ClientSource for MockClients {
    fn llm(&self) -> Result<Arc<dyn LLMClient>, ConfigError> {
        Ok(self.llm.clone())
    }

    fn embeddings(&self) -> Result<Arc<dyn EmbeddingClient>, ConfigError> {
        self.embeddings
            .clone()
            .ok_or_else(|| ConfigError::MissingCredential {
                provider: ProviderKind::OpenAI,
                role: Role::Embedding,
                checked: vec![
                    "/run/secrets/openai_api_key".to_string(),
                    "OPENAI_API_KEY".to_string(),
                    "API_KEY".to_string(),
                ],
            })
    }
}
