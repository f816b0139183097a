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

//! Answer correctness: weighted blend of factual F1 against the reference
//! and embedding similarity between response and reference.

use super::cosine_similarity;
use crate::judge::{ask_json, fill, string_list};
use crate::{EvalError, Metric, MetricScore, Sample};
use async_trait::async_trait;
use ragmetrics_core::{EmbeddingClient, LLMClient};
use std::sync::Arc;

pub struct AnswerCorrectness {
    llm: Arc<dyn LLMClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    /// (factuality, semantic similarity)
    weights: (f64, f64),
}

impl AnswerCorrectness {
    pub const DEFAULT_WEIGHTS: (f64, f64) = (0.75, 0.25);

    const CLASSIFICATION_PROMPT: &'static str = r#"Compare the answer with the ground truth for the given question and classify statements.

- TP (true positive): statements in the answer that are supported by the ground truth
- FP (false positive): statements in the answer that are not supported by the ground truth
- FN (false negative): statements in the ground truth that are missing from the answer

QUESTION:
{question}

ANSWER:
{answer}

GROUND TRUTH:
{reference}

Respond in JSON:
{"TP": ["<statement>"], "FP": ["<statement>"], "FN": ["<statement>"]}
"#;

    pub fn new(llm: Arc<dyn LLMClient>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            llm,
            embeddings,
            weights: Self::DEFAULT_WEIGHTS,
        }
    }

    pub fn with_weights(mut self, factuality: f64, similarity: f64) -> Self {
        self.weights = (factuality, similarity);
        self
    }
}

/// F1 from statement counts; 1.0 when there is nothing to compare
pub fn f1_score(tp: usize, fp: usize, fn_: usize) -> f64 {
    let denominator = tp as f64 + 0.5 * (fp + fn_) as f64;
    if denominator == 0.0 {
        return 1.0;
    }
    tp as f64 / denominator
}

#[async_trait]
impl Metric for AnswerCorrectness {
    fn name(&self) -> &'static str {
        "answer_correctness"
    }

    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError> {
        let answer = sample.response()?;
        let reference = sample.reference()?;

        let prompt = fill(
            Self::CLASSIFICATION_PROMPT,
            &[
                ("question", sample.user_input.as_str()),
                ("answer", answer),
                ("reference", reference),
            ],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "statement classification").await?;

        let tp = string_list(&json, "TP", "statement classification")?;
        let fp = string_list(&json, "FP", "statement classification")?;
        let fn_ = string_list(&json, "FN", "statement classification")?;
        let factuality = f1_score(tp.len(), fp.len(), fn_.len());

        let vectors = self
            .embeddings
            .embed_batch(&[answer.to_string(), reference.to_string()])
            .await?;
        let similarity = match vectors.as_slice() {
            [a, b] => cosine_similarity(a, b).clamp(0.0, 1.0),
            _ => {
                return Err(EvalError::InvalidJudgeOutput(format!(
                    "embedding: expected 2 vectors, got {}",
                    vectors.len()
                )))
            }
        };

        let (w_fact, w_sim) = self.weights;
        let total = w_fact + w_sim;
        let value = if total > 0.0 {
            (w_fact * factuality + w_sim * similarity) / total
        } else {
            0.0
        };

        Ok(MetricScore {
            value: value.clamp(0.0, 1.0),
            details: serde_json::json!({
                "factuality": factuality,
                "similarity": similarity,
                "TP": tp,
                "FP": fp,
                "FN": fn_,
            }),
        })
    }
}
