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

//! Faithfulness: fraction of the response's claims entailed by the context.
//!
//! Decompose-then-verify with two judge calls: claim extraction, then
//! NLI verification of all claims against the joined context.

use crate::judge::{ask_json, fill, numbered, string_list};
use crate::{EvalError, Metric, MetricScore, Sample};
use async_trait::async_trait;
use ragmetrics_core::LLMClient;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// NLI verdict for a single claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NliVerdict {
    Entailed,
    Contradicted,
    Neutral,
}

impl NliVerdict {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "entailed" | "supported" | "1" | "yes" => NliVerdict::Entailed,
            "contradicted" => NliVerdict::Contradicted,
            _ => NliVerdict::Neutral,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimVerification {
    pub claim: String,
    pub verdict: NliVerdict,
    pub evidence: Option<String>,
}

pub struct Faithfulness {
    llm: Arc<dyn LLMClient>,
}

impl Faithfulness {
    const CLAIM_EXTRACTION_PROMPT: &'static str = r#"Extract all atomic factual claims from the following answer.

QUESTION:
{question}

ANSWER:
{answer}

Rules:
- Extract ONLY factual claims (not opinions, hedged statements, or questions)
- Each claim should be self-contained and independently verifiable
- Replace pronouns with the entities they refer to
- Decompose compound claims into atomic parts

Respond in JSON:
{"claims": ["<factual statement>", ...]}

If there are no factual claims, respond with: {"claims": []}
"#;

    const NLI_VERIFICATION_PROMPT: &'static str = r#"Verify each claim against the provided context.

CONTEXT:
{context}

CLAIMS TO VERIFY:
{claims}

For each claim, determine:
- "entailed": The claim is SUPPORTED by the context
- "contradicted": The claim CONTRADICTS the context
- "neutral": The claim CANNOT be verified from the context

Respond in JSON, one entry per claim in the same order:
{"verifications": [{"claim": "<the claim>", "verdict": "entailed" | "contradicted" | "neutral", "evidence": "<quote from context or null>"}]}
"#;

    pub fn new(llm: Arc<dyn LLMClient>) -> Self {
        Self { llm }
    }

    async fn extract_claims(&self, question: &str, answer: &str) -> Result<Vec<String>, EvalError> {
        let prompt = fill(
            Self::CLAIM_EXTRACTION_PROMPT,
            &[("question", question), ("answer", answer)],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "claim extraction").await?;
        string_list(&json, "claims", "claim extraction")
    }

    async fn verify_claims(
        &self,
        claims: &[String],
        context: &str,
    ) -> Result<Vec<ClaimVerification>, EvalError> {
        let claims_text = numbered(claims);
        let prompt = fill(
            Self::NLI_VERIFICATION_PROMPT,
            &[("context", context), ("claims", claims_text.as_str())],
        );
        let json = ask_json(self.llm.as_ref(), prompt, "claim verification").await?;

        let verifications = json["verifications"].as_array().ok_or_else(|| {
            EvalError::InvalidJudgeOutput("claim verification: missing 'verifications' array".into())
        })?;

        Ok(verifications
            .iter()
            .enumerate()
            .map(|(i, v)| ClaimVerification {
                claim: v["claim"]
                    .as_str()
                    .map(str::to_string)
                    .or_else(|| claims.get(i).cloned())
                    .unwrap_or_default(),
                verdict: NliVerdict::parse(v["verdict"].as_str().unwrap_or("neutral")),
                evidence: v["evidence"].as_str().map(str::to_string),
            })
            .collect())
    }
}

#[async_trait]
impl Metric for Faithfulness {
    fn name(&self) -> &'static str {
        "faithfulness"
    }

    async fn score(&self, sample: &Sample) -> Result<MetricScore, EvalError> {
        let answer = sample.response()?;
        let context = sample.contexts()?.join("\n\n");

        let claims = self.extract_claims(&sample.user_input, answer).await?;
        if claims.is_empty() {
            // No claims = vacuously faithful
            return Ok(MetricScore {
                value: 1.0,
                details: serde_json::json!({"total_claims": 0}),
            });
        }

        let verifications = self.verify_claims(&claims, &context).await?;
        if verifications.is_empty() {
            return Err(EvalError::InvalidJudgeOutput(
                "claim verification: no verdicts returned".to_string(),
            ));
        }

        // Claims the judge skipped count as unsupported
        let total = claims.len().max(verifications.len());
        let entailed = verifications
            .iter()
            .filter(|v| v.verdict == NliVerdict::Entailed)
            .count();
        let contradicted = verifications
            .iter()
            .filter(|v| v.verdict == NliVerdict::Contradicted)
            .count();

        Ok(MetricScore {
            value: entailed as f64 / total as f64,
            details: serde_json::json!({
                "total_claims": total,
                "entailed": entailed,
                "contradicted": contradicted,
                "claims": verifications,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedJudge;
    use serde_json::json;

    fn sample() -> Sample {
        Sample::new("Where is the Eiffel Tower?")
            .with_response("The Eiffel Tower is in Berlin. It was built in 1889.")
            .with_contexts(vec![
                "The Eiffel Tower is located in Paris.".to_string(),
                "It was completed in 1889.".to_string(),
            ])
    }

    #[tokio::test]
    async fn test_score_is_entailed_fraction() {
        let judge = Arc::new(
            ScriptedJudge::new()
                .on(
                    "Extract all atomic factual claims",
                    json!({"claims": ["The Eiffel Tower is in Berlin.", "The Eiffel Tower was built in 1889."]}),
                )
                .on(
                    "Verify each claim",
                    json!({"verifications": [
                        {"claim": "The Eiffel Tower is in Berlin.", "verdict": "contradicted"},
                        {"claim": "The Eiffel Tower was built in 1889.", "verdict": "entailed", "evidence": "completed in 1889"}
                    ]}),
                ),
        );

        let score = Faithfulness::new(judge.clone()).score(&sample()).await.unwrap();
        assert!((score.value - 0.5).abs() < 1e-9);
        assert_eq!(score.details["contradicted"], 1);

        let prompts = judge.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[1].contains("The Eiffel Tower is located in Paris."));
        assert!(prompts[1].contains("2. The Eiffel Tower was built in 1889."));
    }

    #[tokio::test]
    async fn test_no_claims_is_fully_faithful() {
        let judge = Arc::new(ScriptedJudge::new().on("Extract all atomic", json!({"claims": []})));
        let score = Faithfulness::new(judge.clone()).score(&sample()).await.unwrap();
        assert_eq!(score.value, 1.0);
        assert_eq!(judge.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_verdicts_count_against_score() {
        let judge = Arc::new(
            ScriptedJudge::new()
                .on("Extract all atomic", json!({"claims": ["a", "b", "c", "d"]}))
                .on("Verify each claim", json!({"verifications": [{"verdict": "entailed"}]})),
        );
        let score = Faithfulness::new(judge).score(&sample()).await.unwrap();
        assert!((score.value - 0.25).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_requires_context() {
        let judge = Arc::new(ScriptedJudge::new());
        let sample = Sample::new("q").with_response("a").with_contexts(vec!["  ".to_string()]);
        let err = Faithfulness::new(judge).score(&sample).await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidInput(_)));
    }
}
