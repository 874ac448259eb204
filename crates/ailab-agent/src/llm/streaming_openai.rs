//! SSE handling for the OpenAI Chat Completions stream.
//!
//! Each `data:` line carries a `choices[0].delta` object; the stream ends
//! with `data: [DONE]`.  The same format is spoken by every
//! OpenAI-compatible endpoint (Ollama, DeepSeek, Azure deployments).

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::streaming::parse_arguments;
use crate::llm::types::{Completion, LlmResponse, ToolCall, Usage};

/// Folds OpenAI stream chunks into a final [`Completion`].
///
/// Tool call fragments are correlated by their `index`: the id and name
/// arrive first, argument text follows across later chunks.
#[derive(Debug, Default)]
pub struct OpenAiStreamAccumulator {
    text: String,
    tool_call_builders: Vec<ToolCallBuilder>,
    finish_reason: Option<String>,
    usage: Usage,
    done: bool,
}

#[derive(Debug, Default)]
struct ToolCallBuilder {
    id: String,
    name: String,
    arguments: String,
}

impl OpenAiStreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once `[DONE]` has been seen.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed one SSE line.  Returns the text delta it carried, if any.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<String>> {
        let line = line.trim_end();
        let Some(data) = line.strip_prefix("data:") else {
            return Ok(None);
        };
        let data = data.trim();

        if data == "[DONE]" {
            self.done = true;
            return Ok(None);
        }

        let v: Value = serde_json::from_str(data).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON in OpenAI SSE data: {e}"),
        })?;

        if let Some(message) = v["error"]["message"].as_str() {
            return Err(AgentError::LlmStreamError {
                reason: message.to_owned(),
            });
        }

        // Usage arrives in a final chunk with an empty `choices` array when
        // `stream_options.include_usage` is set.
        if let Some(usage) = v.get("usage").filter(|u| !u.is_null()) {
            self.usage = Usage::new(
                usage["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                usage["completion_tokens"].as_u64().unwrap_or(0) as u32,
            );
        }

        let choice = &v["choices"][0];
        if let Some(reason) = choice["finish_reason"].as_str() {
            self.finish_reason = Some(reason.to_owned());
        }

        let delta = &choice["delta"];
        if delta.is_null() {
            return Ok(None);
        }

        if let Some(tool_calls) = delta["tool_calls"].as_array() {
            for tc in tool_calls {
                let index = tc["index"].as_u64().unwrap_or(0) as usize;
                if self.tool_call_builders.len() <= index {
                    self.tool_call_builders
                        .resize_with(index + 1, ToolCallBuilder::default);
                }
                let builder = &mut self.tool_call_builders[index];
                if let Some(id) = tc["id"].as_str() {
                    builder.id = id.to_owned();
                }
                let func = &tc["function"];
                if let Some(name) = func["name"].as_str() {
                    builder.name.push_str(name);
                }
                if let Some(args) = func["arguments"].as_str() {
                    builder.arguments.push_str(args);
                }
            }
        }

        match delta["content"].as_str() {
            Some(content) if !content.is_empty() => {
                self.text.push_str(content);
                Ok(Some(content.to_owned()))
            }
            _ => Ok(None),
        }
    }

    /// Tool calls take priority over text, as in the non-streaming path.
    pub fn into_completion(self) -> Result<Completion> {
        let response = if self.tool_call_builders.is_empty() {
            LlmResponse::Text(self.text)
        } else {
            let calls = self
                .tool_call_builders
                .into_iter()
                .map(|b| {
                    Ok(ToolCall {
                        arguments: parse_arguments(&b.name, &b.arguments)?,
                        id: b.id,
                        name: b.name,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            LlmResponse::ToolCalls(calls)
        };

        Ok(Completion {
            response,
            usage: self.usage,
            finish_reason: self.finish_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_usage_are_collected() {
        let mut acc = OpenAiStreamAccumulator::new();
        let lines = [
            r#"data: {"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":"Rust"}}]}"#,
            r#"data: {"choices":[{"index":0,"delta":{"content":" is fast"},"finish_reason":"stop"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":9,"completion_tokens":3,"total_tokens":12}}"#,
            "data: [DONE]",
        ];
        let deltas: Vec<String> = lines
            .iter()
            .filter_map(|l| acc.feed_line(l).unwrap())
            .collect();
        assert_eq!(deltas, vec!["Rust", " is fast"]);
        assert!(acc.is_done());

        let done = acc.into_completion().unwrap();
        assert_eq!(done.as_text(), "Rust is fast");
        assert_eq!(done.usage.total_tokens(), 12);
        assert_eq!(done.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn tool_call_fragments_are_joined_by_index() {
        let mut acc = OpenAiStreamAccumulator::new();
        for line in [
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","function":{"name":"get_exchange_rate","arguments":""}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","function":{"name":"get_weather","arguments":"{\"location\":\"Tokyo\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"from\":\"USD\","}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"to\":\"CNY\"}"}}]},"finish_reason":"tool_calls"}]}"#,
            "data: [DONE]",
        ] {
            acc.feed_line(line).unwrap();
        }

        match acc.into_completion().unwrap().response {
            LlmResponse::ToolCalls(calls) => {
                assert_eq!(calls.len(), 2);
                assert_eq!(calls[0].id, "call_a");
                assert_eq!(calls[0].arguments["to"], "CNY");
                assert_eq!(calls[1].arguments["location"], "Tokyo");
            }
            other => panic!("expected ToolCalls, got {other:?}"),
        }
    }

    #[test]
    fn non_data_lines_are_ignored() {
        let mut acc = OpenAiStreamAccumulator::new();
        assert!(acc.feed_line("").unwrap().is_none());
        assert!(acc.feed_line(": keepalive").unwrap().is_none());
        assert!(acc.feed_line("event: message").unwrap().is_none());
        assert!(acc.feed_line("data: {oops").is_err());
    }

    #[test]
    fn in_stream_error_is_surfaced() {
        let mut acc = OpenAiStreamAccumulator::new();
        let err = acc
            .feed_line(r#"data: {"error":{"message":"Rate limit reached for requests"}}"#)
            .unwrap_err();
        assert!(err.is_rate_limited());
    }
}
