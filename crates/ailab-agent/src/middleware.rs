//! Model middleware.
//!
//! A [`Middleware`] sees every request before it reaches the wrapped model
//! and every result after it returns.  [`wrap_model`] stacks middleware
//! around any [`LanguageModel`]; the wrapped model is itself a
//! `LanguageModel`, so wrapping composes.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::llm::model::{LanguageModel, SharedModel};
use crate::llm::types::{ChatRequest, Completion, Message, Role};

/// Request / response hooks around a model call.
pub trait Middleware: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Rewrite the request before it is sent.
    fn transform_request(&self, _request: &mut ChatRequest) {}

    /// Observe the outcome.  Runs for failures too.
    fn on_complete(
        &self,
        _model_id: &str,
        _request: &ChatRequest,
        _result: &Result<Completion>,
        _elapsed: Duration,
    ) {
    }
}

/// A model with a middleware stack applied.
///
/// Requests pass through the stack in order; completion hooks run in
/// reverse order.
pub struct WrappedModel {
    inner: SharedModel,
    stack: Vec<Arc<dyn Middleware>>,
}

/// Wrap `model` with `stack`.
pub fn wrap_model(model: SharedModel, stack: Vec<Arc<dyn Middleware>>) -> WrappedModel {
    WrappedModel {
        inner: model,
        stack,
    }
}

impl WrappedModel {
    fn prepare(&self, request: &ChatRequest) -> ChatRequest {
        let mut request = request.clone();
        for mw in &self.stack {
            mw.transform_request(&mut request);
        }
        request
    }

    fn finish(&self, request: &ChatRequest, result: &Result<Completion>, started: Instant) {
        let elapsed = started.elapsed();
        for mw in self.stack.iter().rev() {
            mw.on_complete(self.inner.model_id(), request, result, elapsed);
        }
    }
}

#[async_trait]
impl LanguageModel for WrappedModel {
    fn model_id(&self) -> &str {
        self.inner.model_id()
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        let request = self.prepare(request);
        let started = Instant::now();
        let result = self.inner.chat(&request).await;
        self.finish(&request, &result, started);
        result
    }

    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Completion> {
        let request = self.prepare(request);
        let started = Instant::now();
        let result = self.inner.stream_chat(&request, on_text).await;
        self.finish(&request, &result, started);
        result
    }
}

// ---------------------------------------------------------------------------
// Built-ins
// ---------------------------------------------------------------------------

/// Logs the target model and latency of every call.
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    fn transform_request(&self, request: &mut ChatRequest) {
        tracing::info!(
            messages = request.messages.len(),
            tools = request.tools.len(),
            "model call starting"
        );
    }

    fn on_complete(
        &self,
        model_id: &str,
        _request: &ChatRequest,
        result: &Result<Completion>,
        elapsed: Duration,
    ) {
        let elapsed_ms = elapsed.as_millis() as u64;
        match result {
            Ok(done) => tracing::info!(
                model_id,
                elapsed_ms,
                input_tokens = done.usage.input_tokens,
                output_tokens = done.usage.output_tokens,
                "model call finished"
            ),
            Err(e) => tracing::warn!(model_id, elapsed_ms, error = %e, "model call failed"),
        }
    }
}

/// Prepends a fixed instruction to the system prompt of every request.
#[derive(Debug, Clone)]
pub struct SystemPromptMiddleware {
    instruction: String,
}

impl SystemPromptMiddleware {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }
}

impl Middleware for SystemPromptMiddleware {
    fn name(&self) -> &str {
        "system-prompt"
    }

    fn transform_request(&self, request: &mut ChatRequest) {
        match request.messages.first_mut() {
            Some(first) if first.role == Role::System => {
                first.content = format!("{}\n\n{}", self.instruction, first.content);
            }
            _ => request
                .messages
                .insert(0, Message::system(self.instruction.clone())),
        }
    }
}

/// Running totals collected by [`UsageTracker`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageSnapshot {
    pub requests: u64,
    pub failures: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageSnapshot {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }
}

/// Counts requests and tokens across every call it observes.
#[derive(Debug, Default)]
pub struct UsageTracker {
    requests: AtomicU64,
    failures: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
}

impl UsageTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
        }
    }
}

impl Middleware for UsageTracker {
    fn name(&self) -> &str {
        "usage"
    }

    fn on_complete(
        &self,
        _model_id: &str,
        _request: &ChatRequest,
        result: &Result<Completion>,
        _elapsed: Duration,
    ) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        match result {
            Ok(done) => {
                self.input_tokens
                    .fetch_add(u64::from(done.usage.input_tokens), Ordering::Relaxed);
                self.output_tokens
                    .fetch_add(u64::from(done.usage.output_tokens), Ordering::Relaxed);
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[tokio::test]
    async fn system_prompt_is_injected_once_per_request() {
        let inner = Arc::new(ScriptedModel::new("m").reply("a").reply("b"));
        let wrapped = wrap_model(
            inner.clone(),
            vec![Arc::new(SystemPromptMiddleware::new("Always answer in Markdown."))],
        );

        wrapped
            .chat(&ChatRequest::prompt(None, "praise Rust"))
            .await
            .unwrap();
        wrapped
            .chat(&ChatRequest::prompt(Some("You are a poet."), "praise Rust"))
            .await
            .unwrap();

        let seen = inner.requests();
        assert_eq!(
            seen[0].system_text().as_deref(),
            Some("Always answer in Markdown.")
        );
        assert_eq!(
            seen[1].system_text().as_deref(),
            Some("Always answer in Markdown.\n\nYou are a poet.")
        );
        assert_eq!(seen[1].messages.len(), 2);
    }

    #[tokio::test]
    async fn usage_tracker_counts_tokens_and_failures() {
        let tracker = Arc::new(UsageTracker::new());
        let inner = Arc::new(ScriptedModel::new("m").reply("four").fail("boom"));
        let wrapped = wrap_model(inner, vec![Arc::new(LoggingMiddleware), tracker.clone()]);

        let req = ChatRequest::prompt(None, "x");
        wrapped.chat(&req).await.unwrap();
        assert!(wrapped.chat(&req).await.is_err());

        let snap = tracker.snapshot();
        assert_eq!(snap.requests, 2);
        assert_eq!(snap.failures, 1);
        assert_eq!(snap.input_tokens, 10);
        assert_eq!(snap.output_tokens, 4);
        assert_eq!(snap.total_tokens(), 14);
    }
}
