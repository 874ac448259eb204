//! Provider-agnostic conversation types.
//!
//! The [`super::client`] module maps these onto the Anthropic and OpenAI
//! wire formats; everything above the client only ever sees these.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    /// Result of a tool invocation, fed back to the model.
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }

    /// Parse a stored role name.  Unknown names are treated as `user`.
    pub fn parse(name: &str) -> Self {
        match name {
            "system" => Self::System,
            "assistant" => Self::Assistant,
            "tool" => Self::Tool,
            _ => Self::User,
        }
    }
}

/// One entry of a conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    /// Text content.  Empty for assistant turns that only call tools.
    #[serde(default)]
    pub content: String,

    /// Tool calls requested by the assistant.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    /// The call this message answers (tool messages only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl Message {
    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// An assistant turn that requests tool calls.
    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::text(Role::Assistant, "")
        }
    }

    /// The answer to a tool call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(tool_call_id.into()),
            ..Self::text(Role::Tool, content)
        }
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-assigned id used to correlate the result.
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// The outcome of one tool call, ready to feed back to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// A tool the model may call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema of the tool arguments.
    pub input_schema: Value,
}

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// A single generation request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChatRequest {
    /// Model override.  Empty means the client's configured model.
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// A request with an optional system prompt followed by one user turn.
    pub fn prompt(system: Option<&str>, prompt: impl Into<String>) -> Self {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system.filter(|s| !s.is_empty()) {
            messages.push(Message::system(system));
        }
        messages.push(Message::user(prompt));
        Self::new(messages)
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated content of every system message, if any.
    pub fn system_text(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect();
        (!parts.is_empty()).then(|| parts.join("\n"))
    }

    /// The most recent user message.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// What the model produced for one turn.
#[derive(Debug, Clone, PartialEq)]
pub enum LlmResponse {
    /// A final text answer.
    Text(String),
    /// The model wants tools run before it continues.
    ToolCalls(Vec<ToolCall>),
}

/// Token accounting for one request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl Usage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    pub fn total_tokens(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// The full result of a generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub response: LlmResponse,
    pub usage: Usage,
    /// Provider stop reason (`stop`, `end_turn`, `tool_calls`, ...).
    pub finish_reason: Option<String>,
}

impl Completion {
    /// A plain text completion with no usage information.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            response: LlmResponse::Text(text.into()),
            usage: Usage::default(),
            finish_reason: Some("stop".into()),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            response: LlmResponse::ToolCalls(calls),
            usage: Usage::default(),
            finish_reason: Some("tool_calls".into()),
        }
    }

    pub fn with_usage(mut self, usage: Usage) -> Self {
        self.usage = usage;
        self
    }

    /// The text answer, or `""` when the model asked for tools.
    pub fn as_text(&self) -> &str {
        match &self.response {
            LlmResponse::Text(text) => text,
            LlmResponse::ToolCalls(_) => "",
        }
    }

    pub fn into_text(self) -> String {
        match self.response {
            LlmResponse::Text(text) => text,
            LlmResponse::ToolCalls(_) => String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming events
// ---------------------------------------------------------------------------

/// Events of the Anthropic Messages SSE stream, one per `event:` type.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    MessageStart {
        message_id: String,
        model: String,
        input_tokens: u32,
    },
    ContentBlockStart {
        index: u32,
        /// `"text"` or `"tool_use"`.
        content_type: String,
        id: Option<String>,
        name: Option<String>,
    },
    ContentBlockDelta {
        index: u32,
        delta: StreamDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        stop_reason: Option<String>,
        output_tokens: u32,
    },
    MessageStop,
    Ping,
}

/// Incremental payload inside a content block.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    TextDelta(String),
    /// A fragment of a tool call's JSON input.
    InputJsonDelta(String),
}
