//! Multi-provider HTTP client.
//!
//! Speaks the **Anthropic Messages API** and the **OpenAI Chat Completions
//! API**.  The OpenAI dialect also covers every compatible endpoint (Ollama's
//! `/v1`, DeepSeek, Google's OpenAI bridge) and Azure OpenAI deployments,
//! which differ only in URL shape and auth header.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::{Value, json};

use crate::error::{AgentError, Result};
use crate::llm::model::LanguageModel;
use crate::llm::streaming::{AnthropicStreamAccumulator, LineBuffer, SseParser};
use crate::llm::streaming_openai::OpenAiStreamAccumulator;
use crate::llm::types::{
    ChatRequest, Completion, LlmResponse, Message, Role, StreamEvent, ToolCall, ToolDefinition,
    Usage,
};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const GOOGLE_OPENAI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";

const ANTHROPIC_VERSION: &str = "2023-06-01";
const AZURE_API_VERSION: &str = "2024-10-21";
const DEFAULT_MAX_TOKENS: u32 = 4096;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Wire dialect and auth scheme of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// Anthropic Messages API, `x-api-key` auth.
    Anthropic,
    /// OpenAI Chat Completions, bearer auth (or none for local servers).
    OpenAI,
    /// Azure OpenAI deployment, `api-key` auth and `api-version` query.
    Azure,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAI => "openai",
            Self::Azure => "azure",
        }
    }
}

impl fmt::Display for LlmProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Everything needed to talk to one model on one endpoint.
#[derive(Clone)]
pub struct LlmClientConfig {
    pub provider: LlmProvider,
    pub api_key: String,
    /// Endpoint root, without the `/chat/completions` or `/v1/messages` path.
    pub base_url: String,
    /// Model used when a request leaves `model` empty.
    pub default_model: String,
    pub max_tokens: u32,
    /// Azure only.
    pub api_version: Option<String>,
    /// Whether an empty key is a configuration error.
    pub requires_key: bool,
}

impl fmt::Debug for LlmClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmClientConfig")
            .field("provider", &self.provider)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("max_tokens", &self.max_tokens)
            .field("api_version", &self.api_version)
            .finish()
    }
}

impl LlmClientConfig {
    fn base(provider: LlmProvider, api_key: String, base_url: String, model: String) -> Self {
        Self {
            provider,
            api_key,
            base_url: base_url.trim_end_matches('/').to_owned(),
            default_model: model,
            max_tokens: DEFAULT_MAX_TOKENS,
            api_version: None,
            requires_key: true,
        }
    }

    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::base(
            LlmProvider::Anthropic,
            api_key.into(),
            ANTHROPIC_BASE_URL.into(),
            model.into(),
        )
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::base(
            LlmProvider::OpenAI,
            api_key.into(),
            OPENAI_BASE_URL.into(),
            model.into(),
        )
    }

    /// Any endpoint speaking the OpenAI dialect with bearer auth.
    pub fn openai_compatible(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        Self::base(
            LlmProvider::OpenAI,
            api_key.into(),
            base_url.into(),
            model.into(),
        )
    }

    /// A local Ollama server.  No key is needed or sent.
    pub fn ollama(model: impl Into<String>, base_url: Option<&str>) -> Self {
        Self {
            requires_key: false,
            ..Self::base(
                LlmProvider::OpenAI,
                String::new(),
                base_url.unwrap_or(OLLAMA_BASE_URL).into(),
                model.into(),
            )
        }
    }

    /// An Azure OpenAI deployment on `https://<resource>.openai.azure.com`.
    pub fn azure(
        resource_name: &str,
        deployment: &str,
        api_key: impl Into<String>,
        api_version: Option<&str>,
    ) -> Self {
        Self {
            api_version: Some(api_version.unwrap_or(AZURE_API_VERSION).to_owned()),
            ..Self::base(
                LlmProvider::Azure,
                api_key.into(),
                format!("https://{resource_name}.openai.azure.com/openai/deployments/{deployment}"),
                deployment.to_owned(),
            )
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for one configured model.  Cheap to clone.
#[derive(Debug, Clone)]
pub struct LlmClient {
    config: Arc<LlmClientConfig>,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmClientConfig) -> Result<Self> {
        if config.requires_key && config.api_key.trim().is_empty() {
            return Err(AgentError::MissingApiKey {
                provider: config.provider.to_string(),
            });
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AgentError::LlmRequestFailed {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            config: Arc::new(config),
            http,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn config(&self) -> &LlmClientConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    fn endpoint(&self) -> String {
        let base = &self.config.base_url;
        match self.config.provider {
            LlmProvider::Anthropic => format!("{base}/v1/messages"),
            LlmProvider::OpenAI => format!("{base}/chat/completions"),
            LlmProvider::Azure => format!(
                "{base}/chat/completions?api-version={}",
                self.config.api_version.as_deref().unwrap_or(AZURE_API_VERSION)
            ),
        }
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let key = self.config.api_key.trim();
        let invalid = |e: reqwest::header::InvalidHeaderValue| AgentError::LlmRequestFailed {
            reason: format!("invalid auth header: {e}"),
        };

        match self.config.provider {
            LlmProvider::Anthropic => {
                headers.insert("x-api-key", HeaderValue::from_str(key).map_err(invalid)?);
                headers.insert(
                    "anthropic-version",
                    HeaderValue::from_static(ANTHROPIC_VERSION),
                );
            }
            LlmProvider::OpenAI if !key.is_empty() => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {key}")).map_err(invalid)?,
                );
            }
            LlmProvider::OpenAI => {}
            LlmProvider::Azure => {
                headers.insert("api-key", HeaderValue::from_str(key).map_err(invalid)?);
            }
        }
        Ok(headers)
    }

    fn build_body(&self, request: &ChatRequest, stream: bool) -> Value {
        match self.config.provider {
            LlmProvider::Anthropic => self.build_anthropic_body(request, stream),
            LlmProvider::OpenAI | LlmProvider::Azure => self.build_openai_body(request, stream),
        }
    }

    fn model_for<'a>(&'a self, request: &'a ChatRequest) -> &'a str {
        if request.model.is_empty() {
            &self.config.default_model
        } else {
            &request.model
        }
    }

    fn build_anthropic_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let (system, messages) = messages_to_anthropic(&request.messages);
        let mut body = json!({
            "model": self.model_for(request),
            "max_tokens": request.max_tokens.unwrap_or(self.config.max_tokens),
            "messages": messages,
        });
        if let Some(system) = system {
            body["system"] = json!(system);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_anthropic(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
        }
        body
    }

    fn build_openai_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model_for(request),
            "messages": messages_to_openai(&request.messages),
        });
        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(temp) = request.temperature {
            body["temperature"] = json!(temp);
        }
        if !request.tools.is_empty() {
            body["tools"] = tools_to_openai(&request.tools);
        }
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        body
    }

    async fn send(&self, body: &Value) -> Result<reqwest::Response> {
        let url = self.endpoint();
        tracing::debug!(
            url = %url,
            model = %body["model"],
            provider = %self.config.provider,
            "sending LLM request"
        );

        let resp = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AgentError::LlmRequestFailed {
                reason: format!("API returned {status}: {text}"),
            });
        }
        Ok(resp)
    }

    /// Feed every line of an SSE body to `on_line` until it returns `true`.
    async fn read_lines<F>(resp: reqwest::Response, mut on_line: F) -> Result<()>
    where
        F: FnMut(&str) -> Result<bool> + Send,
    {
        let mut body = resp.bytes_stream();
        let mut lines = LineBuffer::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| AgentError::LlmStreamError {
                reason: format!("stream read error: {e}"),
            })?;
            for line in lines.push(&chunk)? {
                if on_line(&line)? {
                    return Ok(());
                }
            }
        }

        if let Some(line) = lines.finish()? {
            on_line(&line)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// LanguageModel
// ---------------------------------------------------------------------------

#[async_trait]
impl LanguageModel for LlmClient {
    fn model_id(&self) -> &str {
        &self.config.default_model
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        let body = self.build_body(request, false);
        let resp = self.send(&body).await?;
        let text = resp.text().await.map_err(|e| AgentError::LlmRequestFailed {
            reason: format!("failed to read response body: {e}"),
        })?;
        let v: Value = serde_json::from_str(&text).map_err(|e| AgentError::LlmParseFailed {
            reason: format!("invalid JSON response: {e}"),
        })?;

        match self.config.provider {
            LlmProvider::Anthropic => parse_anthropic_response(&v),
            LlmProvider::OpenAI | LlmProvider::Azure => parse_openai_response(&v),
        }
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Completion> {
        let body = self.build_body(request, true);
        let resp = self.send(&body).await?;

        match self.config.provider {
            LlmProvider::Anthropic => {
                let mut parser = SseParser::new();
                let mut acc = AnthropicStreamAccumulator::new();
                Self::read_lines(resp, |line| {
                    let Some(event) = parser.parse_line(line)? else {
                        return Ok(false);
                    };
                    acc.apply(&event, on_text);
                    Ok(matches!(event, StreamEvent::MessageStop))
                })
                .await?;
                acc.into_completion()
            }
            LlmProvider::OpenAI | LlmProvider::Azure => {
                let mut acc = OpenAiStreamAccumulator::new();
                Self::read_lines(resp, |line| {
                    if let Some(delta) = acc.feed_line(line)? {
                        on_text(&delta);
                    }
                    Ok(acc.is_done())
                })
                .await?;
                acc.into_completion()
            }
        }
    }
}

// ===========================================================================
// Anthropic wire format
// ===========================================================================

/// Anthropic takes the system prompt as a top-level field and tool results
/// as `user` turns holding `tool_result` blocks.
fn messages_to_anthropic(messages: &[Message]) -> (Option<String>, Vec<Value>) {
    let mut system: Option<String> = None;
    let mut wire = Vec::with_capacity(messages.len());

    for msg in messages {
        match msg.role {
            Role::System => match &mut system {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&msg.content);
                }
                None => system = Some(msg.content.clone()),
            },
            Role::User => wire.push(json!({ "role": "user", "content": msg.content })),
            Role::Assistant if msg.tool_calls.is_empty() => {
                wire.push(json!({ "role": "assistant", "content": msg.content }));
            }
            Role::Assistant => {
                let mut content = Vec::with_capacity(msg.tool_calls.len() + 1);
                if !msg.content.is_empty() {
                    content.push(json!({ "type": "text", "text": msg.content }));
                }
                content.extend(msg.tool_calls.iter().map(|tc| {
                    json!({
                        "type": "tool_use",
                        "id": tc.id,
                        "name": tc.name,
                        "input": tc.arguments,
                    })
                }));
                wire.push(json!({ "role": "assistant", "content": content }));
            }
            Role::Tool => wire.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": msg.tool_call_id,
                    "content": msg.content,
                }],
            })),
        }
    }

    (system, wire)
}

fn tools_to_anthropic(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "input_schema": t.input_schema,
            })
        })
        .collect()
}

fn parse_anthropic_response(v: &Value) -> Result<Completion> {
    let content = v["content"]
        .as_array()
        .ok_or_else(|| AgentError::LlmParseFailed {
            reason: "missing `content` array in response".into(),
        })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in content {
        match block["type"].as_str() {
            Some("text") => text.push_str(block["text"].as_str().unwrap_or_default()),
            Some("tool_use") => tool_calls.push(ToolCall {
                id: block["id"].as_str().unwrap_or_default().to_owned(),
                name: block["name"].as_str().unwrap_or_default().to_owned(),
                arguments: block["input"].clone(),
            }),
            _ => {}
        }
    }

    let response = if tool_calls.is_empty() {
        LlmResponse::Text(text)
    } else {
        LlmResponse::ToolCalls(tool_calls)
    };

    Ok(Completion {
        response,
        usage: Usage::new(
            v["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32,
            v["usage"]["output_tokens"].as_u64().unwrap_or(0) as u32,
        ),
        finish_reason: v["stop_reason"].as_str().map(String::from),
    })
}

// ===========================================================================
// OpenAI wire format
// ===========================================================================

/// System prompts stay in the `messages` array; tool calls live in
/// `assistant.tool_calls` with stringified arguments.
pub fn messages_to_openai(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|msg| match msg.role {
            Role::Assistant if !msg.tool_calls.is_empty() => {
                let calls: Vec<Value> = msg
                    .tool_calls
                    .iter()
                    .map(|tc| {
                        json!({
                            "id": tc.id,
                            "type": "function",
                            "function": {
                                "name": tc.name,
                                "arguments": tc.arguments.to_string(),
                            }
                        })
                    })
                    .collect();
                let mut m = json!({ "role": "assistant", "tool_calls": calls });
                if !msg.content.is_empty() {
                    m["content"] = json!(msg.content);
                }
                m
            }
            Role::Tool => json!({
                "role": "tool",
                "tool_call_id": msg.tool_call_id,
                "content": msg.content,
            }),
            role => json!({ "role": role.as_str(), "content": msg.content }),
        })
        .collect()
}

pub fn tools_to_openai(tools: &[ToolDefinition]) -> Value {
    tools
        .iter()
        .map(|t| {
            json!({
                "type": "function",
                "function": {
                    "name": t.name,
                    "description": t.description,
                    "parameters": t.input_schema,
                }
            })
        })
        .collect()
}

pub fn parse_openai_response(v: &Value) -> Result<Completion> {
    let choice = &v["choices"][0];
    let message = &choice["message"];
    if message.is_null() {
        return Err(AgentError::LlmParseFailed {
            reason: "missing `choices[0].message` in response".into(),
        });
    }

    let response = match message["tool_calls"].as_array() {
        Some(calls) if !calls.is_empty() => {
            let calls = calls
                .iter()
                .map(|tc| {
                    let func = &tc["function"];
                    let name = func["name"].as_str().unwrap_or_default().to_owned();
                    let raw = func["arguments"].as_str().unwrap_or("{}");
                    Ok(ToolCall {
                        id: tc["id"].as_str().unwrap_or_default().to_owned(),
                        arguments: crate::llm::streaming::parse_arguments(&name, raw)?,
                        name,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            LlmResponse::ToolCalls(calls)
        }
        _ => LlmResponse::Text(message["content"].as_str().unwrap_or_default().to_owned()),
    };

    Ok(Completion {
        response,
        usage: Usage::new(
            v["usage"]["prompt_tokens"].as_u64().unwrap_or(0) as u32,
            v["usage"]["completion_tokens"].as_u64().unwrap_or(0) as u32,
        ),
        finish_reason: choice["finish_reason"].as_str().map(String::from),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
