//! Deterministic in-process models.
//!
//! Used by the unit and integration tests of this workspace and by the CLI's
//! `--offline` mode, where no model server is reachable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::error::{AgentError, Result};
use crate::llm::embedding::EmbeddingModel;
use crate::llm::model::LanguageModel;
use crate::llm::model::SharedModel;
use crate::llm::types::{ChatRequest, Completion, ToolCall, Usage};
use crate::registry::{ModelEntry, ProviderStrategy};

type Responder = Box<dyn Fn(&ChatRequest) -> Result<Completion> + Send + Sync>;

enum Step {
    Reply(Completion),
    Fail(String),
}

// ---------------------------------------------------------------------------
// ScriptedModel
// ---------------------------------------------------------------------------

/// A [`LanguageModel`] that plays back queued replies and records every
/// request it receives.
///
/// Queued steps are consumed first; after that the responder (if any)
/// answers, otherwise the call fails.
pub struct ScriptedModel {
    id: String,
    script: Mutex<VecDeque<Step>>,
    responder: Option<Responder>,
    requests: Mutex<Vec<ChatRequest>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answer every unscripted call with `f(request)`.
    pub fn responding<F>(id: impl Into<String>, f: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<Completion> + Send + Sync + 'static,
    {
        Self {
            responder: Some(Box::new(f)),
            ..Self::new(id)
        }
    }

    /// Queue a text reply with a small fixed usage.
    pub fn reply(self, text: impl Into<String>) -> Self {
        let text = text.into();
        let usage = Usage::new(10, text.chars().count() as u32);
        self.push(Step::Reply(Completion::text(text).with_usage(usage)))
    }

    /// Queue a tool-call turn.
    pub fn tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.push(Step::Reply(Completion::tool_calls(calls)))
    }

    /// Queue a failure with the given request error reason.
    pub fn fail(self, reason: impl Into<String>) -> Self {
        self.push(Step::Fail(reason.into()))
    }

    fn push(self, step: Step) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(step);
        }
        self
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn chat(&self, request: &ChatRequest) -> Result<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request.clone());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Step::Reply(completion)) => Ok(completion),
            Some(Step::Fail(reason)) => Err(AgentError::LlmRequestFailed { reason }),
            None => match &self.responder {
                Some(f) => f(request),
                None => Err(AgentError::LlmRequestFailed {
                    reason: format!("script for `{}` is exhausted", self.id),
                }),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// KeywordEmbedder
// ---------------------------------------------------------------------------

/// An [`EmbeddingModel`] whose dimensions are keyword groups.
///
/// Component `i` of a vector is the number of keywords of group `i` found
/// in the text, so texts sharing vocabulary point the same way.  A text with
/// no keyword embeds to the zero vector.
pub struct KeywordEmbedder {
    id: String,
    axes: Vec<Vec<String>>,
    calls: AtomicUsize,
}

impl KeywordEmbedder {
    pub fn new<I, A, S>(id: impl Into<String>, axes: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            axes: axes
                .into_iter()
                .map(|axis| axis.into_iter().map(|k| k.into().to_lowercase()).collect())
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls served.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for KeywordEmbedder {
    fn model_id(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = text.to_lowercase();
        Ok(self
            .axes
            .iter()
            .map(|axis| axis.iter().filter(|k| text.contains(k.as_str())).count() as f32)
            .collect())
    }
}

// ---------------------------------------------------------------------------
// EchoStrategy
// ---------------------------------------------------------------------------

/// A [`ProviderStrategy`] whose models echo the last user message.
///
/// Each model answers `[<registry id>] <last user text>`.  Register it under
/// any provider name to run the chat stack without a model server.
#[derive(Debug, Default)]
pub struct EchoStrategy;

#[async_trait]
impl ProviderStrategy for EchoStrategy {
    async fn create(&self, entry: &ModelEntry) -> Result<SharedModel> {
        let id = entry.model_id.clone();
        let tag = entry.id.clone();
        Ok(Arc::new(ScriptedModel::responding(id, move |req| {
            let text = req.last_user_text().unwrap_or_default();
            Ok(Completion::text(format!("[{tag}] {text}"))
                .with_usage(Usage::new(text.chars().count() as u32, 8)))
        })))
    }
}
