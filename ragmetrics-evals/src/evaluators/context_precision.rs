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

//! Context precision: average precision of the retrieved chunks, using the
//! response as the relevance signal.

use crate::judge::{ask_json, fill, verdict};
use crate::{EvalError, Metric, MetricScore, Sample};
use async_trait::async_trait;
use futures::future::join_all;
use ragmetrics_core::LLMClient;
use std::sync::Arc;

pub struct ContextPrecision {
    llm: Arc<dyn LLMClient>,
}

impl ContextPrecision {
    const USEFULNESS_PROMPT: &'static str = r#"Given a question, an answer and a context passage, decide whether the context was useful in arriving at the given answer.

QUESTION:
{question}

ANSWER:
{answer}

CONTEXT:
{context}

Respond in JSON with verdict 1 if useful and 0 if not:
{"reason": "<one sentence>", "verdict": 1}
"#;

    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    async fn judge_chunk(&self, question: &str, answer: &str, chunk: &str) -> Result<bool, EvalError> {
        let prompt = fill(
            Self::USEFULNESS_PROMPT,
            &[("question", question), ("answer", answer), ("context", chunk)],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "context usefulness").await?;
        verdict(&json["verdict"]).ok_or_else(|| {
            EvalError::InvalidJudgeOutput("context usefulness: missing verdict".to_string())
        })
    }
}

/// Average precision over a ranked list of relevance verdicts
pub fn average_precision(verdicts: &[bool]) -> f64 {
    let relevant = verdicts.iter().filter(|v| **v).count();
    if relevant == 0 {
        return 0.0;
    }

    let mut hits = 0usize;
    let mut sum = 0.0;
    for (k, useful) in verdicts.iter().enumerate() {
        if *useful {
            hits += 1;
            sum += hits as f64 / (k + 1) as f64;
        }
    }
    sum / relevant as f64
}

#[async_trait]
impl Metric for ContextPrecision {
    fn name(&self) -> &'static str {
        "context_precision"
    }

    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError> {
        let answer = sample.response()?;
        let chunks = sample.contexts()?;

        let judgments = join_all(
            chunks
                .iter()
                .map(|chunk| self.judge_chunk(&sample.user_input, answer, chunk)),
        )
        .await;
        let verdicts = judgments.into_iter().collect::<Result<Vec<_>, _>>()?;

        Ok(MetricScore {
            value: average_precision(&verdicts),
            details: serde_json::json!({ "verdicts": verdicts }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedJudge;
    use serde_json::json;

    #[test]
    fn test_average_precision() {
        assert_eq!(average_precision(&[]), 0.0);
        assert_eq!(average_precision(&[false, false]), 0.0);
        assert_eq!(average_precision(&[true, true]), 1.0);
        // (1/2 + 2/3) / 2
        let ap = average_precision(&[false, true, true]);
        assert!((ap - (0.5 + 2.0 / 3.0) / 2.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_useful_chunk_ranked_second() {
        let judge = Arc::new(
            ScriptedJudge::new()
                .on("The Louvre", json!({"reason": "unrelated", "verdict": 0}))
                .on("Eiffel Tower is located in Paris", json!({"reason": "states the location", "verdict": 1})),
        );
        let sample = Sample::new("Where is the Eiffel Tower?")
            .with_response("Paris.")
            .with_contexts(vec![
                "The Louvre is a museum.".to_string(),
                "The Eiffel Tower is located in Paris.".to_string(),
            ]);

        let score = ContextPrecision::new(judge.clone()).score(&sample).await.unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
        assert_eq!(judge.prompts().len(), 2);
    }

    #[tokio::test]
    async fn test_unusable_verdict_fails() {
        let judge = Arc::new(ScriptedJudge::new().fallback_raw(r#"{"reason": "?"}"#));
        let sample = Sample::new("q").with_response("a").with_contexts(vec!["c".to_string()]);
        let err = ContextPrecision::new(judge).score(&sample).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidJudgeOutput(_)));
    }
}
