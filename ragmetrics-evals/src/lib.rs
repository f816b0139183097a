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

//! # Ragmetrics Evaluation Metrics
//!
//! LLM-as-judge implementations of the five single-turn RAG metrics:
//!
//! - **Faithfulness**: are the response's claims supported by the context?
//! - **Answer relevancy**: does the response address the question?
//! - **Context precision**: are the useful chunks ranked first?
//! - **Context recall**: does the context cover the reference answer?
//! - **Answer correctness**: factual overlap plus semantic similarity with the reference.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragmetrics_core::{ClientFactory, EnvSnapshot};
//! use ragmetrics_evals::{evaluators::Faithfulness, Metric, Sample};
//!
//! let llm = ClientFactory::new().build_llm_client(&EnvSnapshot::capture())?;
//! let sample = Sample::new("Where is the Eiffel Tower?")
//!     .with_response("The Eiffel Tower is in Berlin.")
//!     .with_contexts(vec!["The Eiffel Tower is located in Paris.".to_string()]);
//! let score = Faithfulness::new(llm).score(&sample).await?;
//! ```

use async_trait::async_trait;
use ragmetrics_core::{EmbedError, LLMError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod evaluators;
mod judge;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use evaluators::{
    AnswerCorrectness, AnswerRelevancy, ContextPrecision, ContextRecall, Faithfulness,
};

/// One question/answer turn to score
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Sample {
    pub user_input: String,
    pub response: Option<String>,
    #[serde(default)]
    pub retrieved_contexts: Vec<String>,
    pub reference: Option<String>,
}

impl Sample {
    pub fn new(user_input: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            ..Default::default()
        }
    }

    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response = Some(response.into());
        self
    }

    pub fn with_contexts(mut self, contexts: Vec<String>) -> Self {
        self.retrieved_contexts = contexts;
        self
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub(crate) fn response(&self) -> Result<&str, EvalError> {
        self.response
            .as_deref()
            .ok_or_else(|| EvalError::MissingField("response".to_string()))
    }

    pub(crate) fn reference(&self) -> Result<&str, EvalError> {
        match self.reference.as_deref() {
            None => Err(EvalError::MissingField("reference_answer".to_string())),
            Some(r) if r.trim().is_empty() => Err(EvalError::InvalidInput(
                "reference_answer must not be empty".to_string(),
            )),
            Some(r) => Ok(r),
        }
    }

    pub(crate) fn contexts(&self) -> Result<&[String], EvalError> {
        if self.retrieved_contexts.iter().all(|c| c.trim().is_empty()) {
            return Err(EvalError::InvalidInput(
                "retrieved_contexts must contain at least one non-empty passage".to_string(),
            ));
        }
        Ok(&self.retrieved_contexts)
    }
}

/// Score produced by a metric, plus judge details for logging
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricScore {
    pub value: f64,
    pub details: serde_json::Value,
}

/// A single-turn RAG metric
#[async_trait]
pub trait Metric: Send + Sync {
    /// Metric identifier, e.g. "faithfulness"
    fn name(&self) -> &'static str;

    /// Score one sample; the value is in `[0, 1]`
    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError>;
}

/// Evaluation errors
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Judge call failed: {0}")]
    Judge(#[from] LLMError),

    #[error("Embedding call failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Unusable judge output: {0}")]
    InvalidJudgeOutput(String),
}
