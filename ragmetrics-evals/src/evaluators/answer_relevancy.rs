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

// Reverse-QAG answer relevancy:
// 1. Generate `strictness` questions the response could be answering
// 2. Embed the original question and the generated ones
// 3. Score = mean cosine similarity, 0 when the response is noncommittal

use super::cosine_similarity;
use crate::judge::{ask_json, fill, string_list, verdict};
use crate::{EvalError, Metric, MetricScore, Sample};
use async_trait::async_trait;
use ragmetrics_core::{EmbeddingClient, LLMClient};
use std::sync::Arc;

pub struct AnswerRelevancy {
    llm: Arc<dyn LLMClient>,
    embeddings: Arc<dyn EmbeddingClient>,
    strictness: usize,
}

impl AnswerRelevancy {
    pub const DEFAULT_STRICTNESS: usize = 3;
    pub const MAX_STRICTNESS: usize = 10;

    const QUESTION_GEN_PROMPT: &'static str = r#"Generate {n} different questions that the following answer could be responding to.
The questions should be diverse and capture different aspects of the answer.
Also decide whether the answer is noncommittal: evasive, vague or ambiguous
(for example "I don't know" or "I'm not sure"). Use 1 for noncommittal, 0 otherwise.

ANSWER:
{answer}

Respond in JSON:
{"questions": ["Question 1?", "Question 2?"], "noncommittal": 0}
"#;

    pub fn new(llm: Arc<dyn LLMClient>, embeddings: Arc<dyn EmbeddingClient>) -> Self {
        Self {
            llm,
            embeddings,
            strictness: Self::DEFAULT_STRICTNESS,
        }
    }

    /// Number of generated questions, clamped to `1..=MAX_STRICTNESS`
    pub fn with_strictness(mut self, strictness: usize) -> Self {
        self.strictness = strictness.clamp(1, Self::MAX_STRICTNESS);
        self
    }
}

#[async_trait]
impl Metric for AnswerRelevancy {
    fn name(&self) -> &'static str {
        "answer_relevancy"
    }

    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError> {
        let answer = sample.response()?;

        let n = self.strictness.to_string();
        let prompt = fill(
            Self::QUESTION_GEN_PROMPT,
            &[("n", n.as_str()), ("answer", answer)],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "question generation").await?;

        let noncommittal = verdict(&json["noncommittal"]).unwrap_or(false);
        let mut questions = string_list(&json, "questions", "question generation")?;
        questions.truncate(self.strictness);

        if noncommittal {
            return Ok(MetricScore {
                value: 0.0,
                details: serde_json::json!({"noncommittal": true, "questions": questions}),
            });
        }
        if questions.is_empty() {
            return Err(EvalError::InvalidJudgeOutput(
                "question generation: no questions returned".to_string(),
            ));
        }

        let mut texts = Vec::with_capacity(questions.len() + 1);
        texts.push(sample.user_input.clone());
        texts.extend(questions.iter().cloned());
        let vectors = self.embeddings.embed_batch(&texts).await?;

        let (original, generated) = vectors.split_first().ok_or_else(|| {
            EvalError::InvalidJudgeOutput("embedding: empty batch result".to_string())
        })?;
        let similarities: Vec<f64> = generated
            .iter()
            .map(|v| cosine_similarity(original, v))
            .collect();
        let mean = similarities.iter().sum::<f64>() / similarities.len().max(1) as f64;

        Ok(MetricScore {
            value: mean.clamp(0.0, 1.0),
            details: serde_json::json!({
                "noncommittal": false,
                "questions": questions,
                "similarities": similarities,
            }),
        })
    }
}
