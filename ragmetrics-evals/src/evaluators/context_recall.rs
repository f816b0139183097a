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

use crate::judge::{ask_json, fill, verdict};
use crate::{EvalError, Metric, MetricScore, Sample};
use async_trait::async_trait;
use ragmetrics_core::LLMClient;
use std::sync::Arc;

/// Context recall: share of reference statements attributable to the context
pub struct ContextRecall {
    llm: Arc<dyn LLMClient>,
}

impl ContextRecall {
    const ATTRIBUTION_PROMPT: &'static str = r#"Break the reference answer into individual statements and classify whether each statement can be attributed to the given context.

QUESTION:
{question}

CONTEXT:
{context}

REFERENCE ANSWER:
{reference}

Use attributed 1 if the statement is supported by the context and 0 otherwise.

Respond in JSON:
{"classifications": [{"statement": "<statement>", "reason": "<short reason>", "attributed": 1}]}
"#;

    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Metric for ContextRecall {
    fn name(&self) -> &'static str {
        "context_recall"
    }

    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError> {
        let reference = sample.reference()?;
        let context = sample.contexts()?.join("\n\n");

        let prompt = fill(
            Self::ATTRIBUTION_PROMPT,
            &[
                ("question", sample.user_input.as_str()),
                ("context", context.as_str()),
                ("reference", reference),
            ],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "statement attribution").await?;

        let classifications = json["classifications"].as_array().ok_or_else(|| {
            EvalError::InvalidJudgeOutput(
                "statement attribution: missing 'classifications' array".to_string(),
            )
        })?;
        if classifications.is_empty() {
            return Err(EvalError::InvalidJudgeOutput(
                "statement attribution: no statements extracted from reference".to_string(),
            ));
        }

        let attributed = classifications
            .iter()
            .filter(|c| verdict(&c["attributed"]).unwrap_or(false))
            .count();

        Ok(MetricScore {
            value: attributed as f64 / classifications.len() as f64,
            details: serde_json::json!({
                "total_statements": classifications.len(),
                "attributed": attributed,
            }),
        })
    }
}
