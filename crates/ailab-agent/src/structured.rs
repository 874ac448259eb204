//! Schema-checked JSON output.
//!
//! The model is told the schema in its system prompt, its reply is searched
//! for a JSON object, and the object is validated with `jsonschema` before
//! being deserialized into the caller's type.

use jsonschema::JSONSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{AgentError, Result};
use crate::llm::model::LanguageModel;
use crate::llm::types::ChatRequest;

/// A compiled schema plus its pretty-printed source for the prompt.
pub struct ObjectSchema {
    source: String,
    compiled: JSONSchema,
}

impl ObjectSchema {
    pub fn compile(schema: &Value) -> Result<Self> {
        let compiled = JSONSchema::compile(schema).map_err(|e| AgentError::InvalidSchema {
            reason: e.to_string(),
        })?;
        Ok(Self {
            source: serde_json::to_string_pretty(schema)?,
            compiled,
        })
    }

    /// Collect every violation as `<instance path>: <message>`.
    pub fn validate(&self, value: &Value) -> Result<()> {
        if let Err(errors) = self.compiled.validate(value) {
            let errors: Vec<String> = errors
                .map(|e| {
                    let path = e.instance_path.to_string();
                    if path.is_empty() {
                        e.to_string()
                    } else {
                        format!("{path}: {e}")
                    }
                })
                .collect();
            return Err(AgentError::SchemaValidation { errors });
        }
        Ok(())
    }

    /// System prompt suffix instructing the model to answer in this shape.
    pub fn instruction(&self) -> String {
        format!(
            "Respond with a single JSON object that conforms to this JSON schema. \
             Output the JSON only, with no explanation.\n\n{}",
            self.source
        )
    }
}

/// Ask `model` for an object matching `schema` and decode it as `T`.
pub async fn generate_object<T: DeserializeOwned>(
    model: &dyn LanguageModel,
    system: Option<&str>,
    prompt: &str,
    schema: &Value,
) -> Result<T> {
    let value = generate_value(model, system, prompt, schema).await?;
    Ok(serde_json::from_value(value)?)
}

/// Like [`generate_object`] but returns the validated JSON value.
pub async fn generate_value(
    model: &dyn LanguageModel,
    system: Option<&str>,
    prompt: &str,
    schema: &Value,
) -> Result<Value> {
    let schema = ObjectSchema::compile(schema)?;
    let system = match system.filter(|s| !s.trim().is_empty()) {
        Some(base) => format!("{base}\n\n{}", schema.instruction()),
        None => schema.instruction(),
    };

    let request = ChatRequest::prompt(Some(&system), prompt).with_temperature(0.0);
    let completion = model.chat(&request).await?;
    let raw = completion.as_text();
    debug!(model_id = model.model_id(), chars = raw.len(), "structured reply received");

    let value = extract_json(raw).ok_or_else(|| {
        warn!(model_id = model.model_id(), "structured reply held no JSON object");
        AgentError::NoJsonFound
    })?;
    schema.validate(&value)?;
    Ok(value)
}

/// Find the JSON object in a model reply.
///
/// Accepts a bare object, a fenced code block, or an object embedded in
/// prose (first `{` to last `}`).
pub fn extract_json(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    for candidate in fenced_blocks(trimmed) {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(candidate) {
            return Some(value);
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Bodies of ```` ``` ```` blocks, with an optional language tag removed.
fn fenced_blocks(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = content;
    while let Some(open) = rest.find("```") {
        let after = &rest[open + 3..];
        let Some(close) = after.find("```") else {
            break;
        };
        let body = &after[..close];
        let body = match body.find('\n') {
            Some(nl) if !body[..nl].trim_start().starts_with('{') => &body[nl + 1..],
            _ => body,
        };
        blocks.push(body.trim());
        rest = &after[close + 3..];
    }
    blocks
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedModel;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Recipe {
        name: String,
        minutes: u32,
    }

    fn recipe_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "minutes": {"type": "integer", "minimum": 1}
            },
            "required": ["name", "minutes"]
        })
    }

    #[test]
    fn extracts_from_fence_and_prose() {
        let fenced = "Sure:\n```json\n{\"a\": 1}\n```\nDone.";
        assert_eq!(extract_json(fenced), Some(json!({"a": 1})));

        let prose = "The answer is {\"a\": {\"b\": 2}} as requested.";
        assert_eq!(extract_json(prose), Some(json!({"a": {"b": 2}})));

        assert_eq!(extract_json("no json here"), None);
        assert_eq!(extract_json("[1, 2]"), None);
    }

    #[tokio::test]
    async fn decodes_valid_object() {
        let model = ScriptedModel::new("m").reply("```json\n{\"name\": \"番茄炒蛋\", \"minutes\": 10}\n```");
        let recipe: Recipe = generate_object(&model, Some("你是厨师"), "给我一个菜谱", &recipe_schema())
            .await
            .unwrap();
        assert_eq!(
            recipe,
            Recipe {
                name: "番茄炒蛋".into(),
                minutes: 10
            }
        );

        let system = model.requests()[0].system_text().unwrap();
        assert!(system.starts_with("你是厨师"));
        assert!(system.contains("\"minutes\""));
    }

    #[tokio::test]
    async fn schema_violation_lists_errors() {
        let model = ScriptedModel::new("m").reply(r#"{"name": "x", "minutes": 0}"#);
        match generate_object::<Recipe>(&model, None, "q", &recipe_schema()).await {
            Err(AgentError::SchemaValidation { errors }) => {
                assert_eq!(errors.len(), 1);
                assert!(errors[0].starts_with("/minutes"), "{errors:?}");
            }
            other => panic!("expected SchemaValidation, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn prose_only_reply_is_no_json() {
        let model = ScriptedModel::new("m").reply("I cannot answer that.");
        match generate_value(&model, None, "q", &recipe_schema()).await {
            Err(AgentError::NoJsonFound) => {}
            other => panic!("expected NoJsonFound, got {other:?}"),
        }
    }

    #[test]
    fn bad_schema_is_rejected() {
        match ObjectSchema::compile(&json!({"type": 12})) {
            Err(AgentError::InvalidSchema { .. }) => {}
            Err(other) => panic!("expected InvalidSchema, got {other:?}"),
            Ok(_) => panic!("expected InvalidSchema, got Ok"),
        }
    }
}
