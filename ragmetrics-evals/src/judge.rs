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

//! Helpers shared by the LLM-as-judge metrics.

use crate::EvalError;
use ragmetrics_core::LLMClient;
use serde_json::Value;

/// Send `prompt` and parse the reply as a JSON object.
///
/// Judges without a JSON response mode sometimes wrap the object in a
/// markdown fence or add a sentence around it; the outermost `{...}` is used.
pub(crate) async fn ask_json(
    llm: &dyn LLMClient,
    prompt: String,
    step: &str,
) -> Result<Value, EvalError> {
    let response = llm.evaluate(prompt).await?;
    tracing::debug!(
        step,
        model = %response.model,
        tokens = response.usage.total_tokens,
        "Judge responded"
    );

    if let Ok(json) = response.as_json() {
        return Ok(json);
    }

    let content = response.content.as_str();
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => serde_json::from_str(&content[start..=end])
            .map_err(|e| EvalError::InvalidJudgeOutput(format!("{}: {}", step, e))),
        _ => Err(EvalError::InvalidJudgeOutput(format!(
            "{}: no JSON object in judge output",
            step
        ))),
    }
}

/// Read a binary verdict written as 1/0, true/false or yes/no
pub(crate) fn verdict(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|v| v >= 0.5),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "yes" | "true" => Some(true),
            "0" | "no" | "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// String items of `json[key]`, failing when the key is not a list
pub(crate) fn string_list(json: &Value, key: &str, step: &str) -> Result<Vec<String>, EvalError> {
    json[key]
        .as_array()
        .ok_or_else(|| EvalError::InvalidJudgeOutput(format!("{}: missing '{}' array", step, key)))
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    Value::Object(obj) => obj
                        .get("statement")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    _ => None,
                })
                .collect()
        })
}

/// Fill `{name}` placeholders in one pass.
///
/// Substituted text is never scanned again, so user input containing
/// `{context}` or similar stays literal. Unknown braces are kept as written.
pub(crate) fn fill(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let placeholder = tail.find('}').and_then(|end| {
            values
                .iter()
                .find(|(name, _)| *name == &tail[1..end])
                .map(|(_, value)| (*value, end))
        });
        match placeholder {
            Some((value, end)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub(crate) fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedJudge;
    use serde_json::json;

    #[test]
    fn test_fill_is_single_pass() {
        let prompt = fill(
            "Q: {question}\nC: {context}\nReply as {\"verdict\": 1}",
            &[("question", "what is {context}?"), ("context", "Paris")],
        );
        assert_eq!(prompt, "Q: what is {context}?\nC: Paris\nReply as {\"verdict\": 1}");
    }

    #[tokio::test]
    async fn test_ask_json_unwraps_fenced_output() {
        let judge = ScriptedJudge::new().fallback_raw("```json\n{\"verdict\": 1}\n```");
        let json = ask_json(&judge, "prompt".to_string(), "test").await.unwrap();
        assert_eq!(json["verdict"], 1);
    }

    #[tokio::test]
    async fn test_ask_json_rejects_prose() {
        let judge = ScriptedJudge::new().fallback_raw("I cannot evaluate this.");
        let err = ask_json(&judge, "prompt".to_string(), "test").await.unwrap_err();
        assert!(matches!(err, EvalError::InvalidJudgeOutput(_)));
    }

    #[test]
    fn test_verdict_forms() {
        assert_eq!(verdict(&json!(1)), Some(true));
        assert_eq!(verdict(&json!(0)), Some(false));
        assert_eq!(verdict(&json!(true)), Some(true));
        assert_eq!(verdict(&json!("Yes")), Some(true));
        assert_eq!(verdict(&json!("maybe")), None);
        assert_eq!(verdict(&json!(null)), None);
    }

    #[test]
    fn test_string_list_accepts_objects() {
        let json = json!({"statements": ["a", {"statement": "b"}, "", 3]});
        assert_eq!(string_list(&json, "statements", "t").unwrap(), vec!["a", "b"]);
        assert!(string_list(&json, "missing", "t").is_err());
    }
}
