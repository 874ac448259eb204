//! SSE handling for the Anthropic Messages stream.
//!
//! [`SseParser`] turns `event:`/`data:` line pairs into [`StreamEvent`]s and
//! [`AnthropicStreamAccumulator`] folds those events into a [`Completion`].
//! [`LineBuffer`] splits raw body chunks into lines for both providers.

use serde_json::Value;

use crate::error::{AgentError, Result};
use crate::llm::types::{Completion, LlmResponse, StreamDelta, StreamEvent, ToolCall, Usage};

// ---------------------------------------------------------------------------
// Line buffering
// ---------------------------------------------------------------------------

/// Reassembles complete lines from arbitrarily split byte chunks.
///
/// Bytes are buffered until a `\n` arrives, so a multi-byte character split
/// across two chunks is decoded correctly.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let rest = self.pending.split_off(pos + 1);
            let mut line = std::mem::replace(&mut self.pending, rest);
            line.pop();
            lines.push(decode(line)?);
        }
        Ok(lines)
    }

    /// Whatever is left after the stream ended without a trailing newline.
    pub fn finish(self) -> Result<Option<String>> {
        if self.pending.is_empty() {
            return Ok(None);
        }
        decode(self.pending).map(Some)
    }
}

fn decode(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| AgentError::LlmStreamError {
        reason: format!("invalid UTF-8 in stream: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Event parser
// ---------------------------------------------------------------------------

/// Parses Anthropic SSE lines.  The `event:` line sets the type that the
/// following `data:` line is decoded as.
#[derive(Debug, Default)]
pub struct SseParser {
    current_event_type: Option<String>,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line.  Returns an event once a `data:` line completes it.
    pub fn parse_line(&mut self, line: &str) -> Result<Option<StreamEvent>> {
        let line = line.trim_end();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }

        if let Some(event_type) = line.strip_prefix("event:") {
            self.current_event_type = Some(event_type.trim().to_owned());
            return Ok(None);
        }

        if let Some(data) = line.strip_prefix("data:") {
            let event_type = self
                .current_event_type
                .take()
                .unwrap_or_else(|| "unknown".into());
            return parse_event(&event_type, data.trim());
        }

        tracing::trace!(line, "ignoring unrecognised SSE line");
        Ok(None)
    }
}

fn parse_event(event_type: &str, data: &str) -> Result<Option<StreamEvent>> {
    let event = match event_type {
        "message_start" => {
            let v = parse_json(data)?;
            let message = &v["message"];
            StreamEvent::MessageStart {
                message_id: json_string(message, "id"),
                model: json_string(message, "model"),
                input_tokens: json_u32(&message["usage"], "input_tokens"),
            }
        }
        "content_block_start" => {
            let v = parse_json(data)?;
            let block = &v["content_block"];
            StreamEvent::ContentBlockStart {
                index: json_u32(&v, "index"),
                content_type: json_string(block, "type"),
                id: block["id"].as_str().map(String::from),
                name: block["name"].as_str().map(String::from),
            }
        }
        "content_block_delta" => {
            let v = parse_json(data)?;
            let delta = &v["delta"];
            let delta = match delta["type"].as_str() {
                Some("text_delta") => StreamDelta::TextDelta(json_string(delta, "text")),
                Some("input_json_delta") => {
                    StreamDelta::InputJsonDelta(json_string(delta, "partial_json"))
                }
                other => {
                    tracing::debug!(delta_type = ?other, "skipping unsupported delta type");
                    return Ok(None);
                }
            };
            StreamEvent::ContentBlockDelta {
                index: json_u32(&v, "index"),
                delta,
            }
        }
        "content_block_stop" => {
            let v = parse_json(data)?;
            StreamEvent::ContentBlockStop {
                index: json_u32(&v, "index"),
            }
        }
        "message_delta" => {
            let v = parse_json(data)?;
            StreamEvent::MessageDelta {
                stop_reason: v["delta"]["stop_reason"].as_str().map(String::from),
                output_tokens: json_u32(&v["usage"], "output_tokens"),
            }
        }
        "message_stop" => StreamEvent::MessageStop,
        "ping" => StreamEvent::Ping,
        "error" => {
            let v = parse_json(data)?;
            return Err(AgentError::LlmStreamError {
                reason: v["error"]["message"]
                    .as_str()
                    .unwrap_or(data)
                    .to_owned(),
            });
        }
        _ if data == "[DONE]" => StreamEvent::MessageStop,
        _ => {
            tracing::trace!(event_type, "ignoring unknown SSE event type");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// Folds Anthropic stream events into a final [`Completion`].
#[derive(Debug, Default)]
pub struct AnthropicStreamAccumulator {
    text: String,
    tool_calls: Vec<ToolCallBuilder>,
    stop_reason: Option<String>,
    usage: Usage,
}

#[derive(Debug)]
struct ToolCallBuilder {
    id: String,
    name: String,
    input_json: String,
}

impl AnthropicStreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, forwarding text deltas to `on_text`.
    pub fn apply(&mut self, event: &StreamEvent, on_text: &mut (dyn for<'s> FnMut(&'s str) + Send)) {
        match event {
            StreamEvent::MessageStart { input_tokens, .. } => {
                self.usage.input_tokens = *input_tokens;
            }
            StreamEvent::ContentBlockStart {
                content_type,
                id,
                name,
                ..
            } if content_type == "tool_use" => {
                self.tool_calls.push(ToolCallBuilder {
                    id: id.clone().unwrap_or_default(),
                    name: name.clone().unwrap_or_default(),
                    input_json: String::new(),
                });
            }
            StreamEvent::ContentBlockDelta { delta, .. } => match delta {
                StreamDelta::TextDelta(t) => {
                    self.text.push_str(t);
                    on_text(t);
                }
                StreamDelta::InputJsonDelta(j) => {
                    if let Some(builder) = self.tool_calls.last_mut() {
                        builder.input_json.push_str(j);
                    }
                }
            },
            StreamEvent::MessageDelta {
                stop_reason,
                output_tokens,
            } => {
                self.stop_reason = stop_reason.clone();
                self.usage.output_tokens = *output_tokens;
            }
            _ => {}
        }
    }

    /// Tool calls win over text when both were streamed.
    pub fn into_completion(self) -> Result<Completion> {
        let response = if self.tool_calls.is_empty() {
            LlmResponse::Text(self.text)
        } else {
            let calls = self
                .tool_calls
                .into_iter()
                .map(|b| {
                    Ok(ToolCall {
                        arguments: parse_arguments(&b.name, &b.input_json)?,
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
            finish_reason: self.stop_reason,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Parse accumulated tool arguments; an empty buffer is an empty object.
pub(crate) fn parse_arguments(tool: &str, raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(raw).map_err(|e| AgentError::LlmParseFailed {
        reason: format!("invalid JSON in tool call `{tool}` arguments: {e}"),
    })
}

fn parse_json(data: &str) -> Result<Value> {
    serde_json::from_str(data).map_err(|e| AgentError::LlmParseFailed {
        reason: format!("invalid JSON in SSE data: {e}"),
    })
}

fn json_string(v: &Value, field: &str) -> String {
    v[field].as_str().unwrap_or_default().to_owned()
}

fn json_u32(v: &Value, field: &str) -> u32 {
    v[field].as_u64().unwrap_or(0) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(parser: &mut SseParser, lines: &[&str]) -> Vec<StreamEvent> {
        lines
            .iter()
            .filter_map(|l| parser.parse_line(l).unwrap())
            .collect()
    }

    #[test]
    fn message_start_carries_input_tokens() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            &[
                "event: message_start",
                r#"data: {"type":"message_start","message":{"id":"msg_01","model":"claude-3-5-haiku","usage":{"input_tokens":12,"output_tokens":1}}}"#,
            ],
        );
        match &events[0] {
            StreamEvent::MessageStart {
                message_id,
                input_tokens,
                ..
            } => {
                assert_eq!(message_id, "msg_01");
                assert_eq!(*input_tokens, 12);
            }
            other => panic!("expected MessageStart, got {other:?}"),
        }
    }

    #[test]
    fn accumulates_text_and_usage() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            &[
                "event: message_start",
                r#"data: {"message":{"id":"m","model":"x","usage":{"input_tokens":7}}}"#,
                "event: content_block_delta",
                r#"data: {"index":0,"delta":{"type":"text_delta","text":"你好"}}"#,
                "event: content_block_delta",
                r#"data: {"index":0,"delta":{"type":"text_delta","text":"，世界"}}"#,
                "event: message_delta",
                r#"data: {"delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":4}}"#,
                "event: message_stop",
                "data: {}",
            ],
        );
        assert!(matches!(events.last(), Some(StreamEvent::MessageStop)));

        let mut acc = AnthropicStreamAccumulator::new();
        let mut seen = String::new();
        for event in &events {
            acc.apply(event, &mut |t| seen.push_str(t));
        }
        let done = acc.into_completion().unwrap();
        assert_eq!(seen, "你好，世界");
        assert_eq!(done.as_text(), "你好，世界");
        assert_eq!(done.usage, Usage::new(7, 4));
        assert_eq!(done.finish_reason.as_deref(), Some("end_turn"));
    }

    #[test]
    fn tool_use_blocks_become_calls() {
        let mut parser = SseParser::new();
        let events = feed(
            &mut parser,
            &[
                "event: content_block_start",
                r#"data: {"index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"get_weather"}}"#,
                "event: content_block_delta",
                r#"data: {"index":1,"delta":{"type":"input_json_delta","partial_json":"{\"location\":"}}"#,
                "event: content_block_delta",
                r#"data: {"index":1,"delta":{"type":"input_json_delta","partial_json":"\"Paris\"}"}}"#,
            ],
        );
        let mut acc = AnthropicStreamAccumulator::new();
        for event in &events {
            acc.apply(event, &mut |_| {});
        }
        match acc.into_completion().unwrap().response {
            LlmResponse::ToolCalls(calls) => {
                assert_eq!(calls[0].name, "get_weather");
                assert_eq!(calls[0].arguments["location"], "Paris");
            }
            other => panic!("expected ToolCalls, got {other:?}"),
        }
    }

    #[test]
    fn error_event_fails_the_stream() {
        let mut parser = SseParser::new();
        parser.parse_line("event: error").unwrap();
        let err = parser
            .parse_line(r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#)
            .unwrap_err();
        assert!(err.is_rate_limited());
    }

    #[test]
    fn line_buffer_handles_split_utf8() {
        let mut buf = LineBuffer::new();
        let bytes = "data: 你好\n".as_bytes();
        let (a, b) = bytes.split_at(8);
        assert!(buf.push(a).unwrap().is_empty());
        assert_eq!(buf.push(b).unwrap(), vec!["data: 你好".to_string()]);
        assert!(buf.finish().unwrap().is_none());
    }
}
