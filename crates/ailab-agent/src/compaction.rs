//! History summarisation.
//!
//! [`summarize_history`] squeezes a transcript into one sentence naming the
//! problem the user is working on; the contextual router feeds that into
//! its routing query.  [`compact_messages`] uses the same model call to
//! replace the older part of a long conversation with a summary message.

use tracing::{debug, info};

use crate::error::{AgentError, Result};
use crate::llm::model::LanguageModel;
use crate::llm::types::{ChatRequest, LlmResponse, Message, Role};

/// System prompt used for one-sentence history summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str =
    "你是一个对话摘要专家。请将以下对话历史压缩成一句话，重点提取用户正在尝试解决的核心问题。";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CompactionConfig {
    /// Compact once the history is longer than this.
    pub max_messages: usize,
    /// Most recent messages kept verbatim.
    pub keep_recent: usize,
}

impl Default for CompactionConfig {
    fn default() -> Self {
        Self {
            max_messages: 50,
            keep_recent: 10,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Summarise transcript lines (`"user: ..."`, `"assistant: ..."`) into one
/// sentence.
pub async fn summarize_history<S: AsRef<str>>(
    model: &dyn LanguageModel,
    lines: &[S],
) -> Result<String> {
    let transcript = lines
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("\n");
    let request = ChatRequest::prompt(Some(SUMMARY_SYSTEM_PROMPT), transcript).with_temperature(0.0);

    debug!(model_id = model.model_id(), lines = lines.len(), "summarising history");
    match model.chat(&request).await?.response {
        LlmResponse::Text(text) => Ok(text.trim().to_string()),
        LlmResponse::ToolCalls(_) => Err(AgentError::Internal(
            "summary request returned tool calls instead of text".into(),
        )),
    }
}

pub fn needs_compaction(messages: &[Message], config: &CompactionConfig) -> bool {
    messages.len() > config.max_messages
}

/// Replace all but the last `keep_recent` messages with a summary.
///
/// A leading system prompt is kept in place.  Histories too short to
/// compact are returned unchanged without calling the model.
pub async fn compact_messages(
    messages: &[Message],
    model: &dyn LanguageModel,
    config: &CompactionConfig,
) -> Result<Vec<Message>> {
    let (system_prompt, conversation) = match messages.first() {
        Some(first) if first.role == Role::System => (Some(first), &messages[1..]),
        _ => (None, messages),
    };

    if conversation.len() <= config.keep_recent {
        return Ok(messages.to_vec());
    }

    let split_point = conversation.len() - config.keep_recent;
    let (old, recent) = conversation.split_at(split_point);
    info!(old = old.len(), recent = recent.len(), "compacting conversation");

    let lines: Vec<String> = old.iter().map(transcript_line).collect();
    let summary = summarize_history(model, &lines).await?;

    let mut compacted = Vec::with_capacity(2 + recent.len());
    compacted.extend(system_prompt.cloned());
    compacted.push(Message::system(format!(
        "[Summary of {count} earlier messages]\n{summary}",
        count = old.len()
    )));
    compacted.extend_from_slice(recent);
    Ok(compacted)
}

fn transcript_line(msg: &Message) -> String {
    let mut line = format!("{}: {}", msg.role.as_str(), msg.content);
    for call in &msg.tool_calls {
        line.push_str(&format!(" [tool_call: {}({})]", call.name, call.arguments));
    }
    line
}
