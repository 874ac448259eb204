//! The [`LanguageModel`] abstraction every caller codes against.
//!
//! [`super::LlmClient`] is the HTTP implementation; middleware, fallback
//! chains and load balancers wrap other models and implement the same
//! trait, so they nest freely.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::llm::types::{ChatRequest, Completion, LlmResponse, Message};

/// A chat model.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// The provider-side model name, e.g. `qwen2.5-coder:latest`.
    fn model_id(&self) -> &str;

    /// Generate a complete response.
    async fn chat(&self, request: &ChatRequest) -> Result<Completion>;

    /// Generate a response, forwarding text fragments to `on_text` as they
    /// arrive.  The default emits the whole text once after [`chat`].
    ///
    /// [`chat`]: LanguageModel::chat
    async fn stream_chat(
        &self,
        request: &ChatRequest,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<Completion> {
        let completion = self.chat(request).await?;
        if let LlmResponse::Text(text) = &completion.response
            && !text.is_empty()
        {
            on_text(text);
        }
        Ok(completion)
    }
}

/// Shared handle to any model.
pub type SharedModel = Arc<dyn LanguageModel>;

/// One-shot generation from an optional system prompt and a user prompt.
pub async fn generate_text(
    model: &dyn LanguageModel,
    system: Option<&str>,
    prompt: &str,
) -> Result<Completion> {
    model.chat(&ChatRequest::prompt(system, prompt)).await
}

/// Generation from a full message history.
pub async fn generate_text_from(
    model: &dyn LanguageModel,
    messages: Vec<Message>,
) -> Result<Completion> {
    model.chat(&ChatRequest::new(messages)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[tokio::test]
    async fn default_stream_emits_full_text_once() {
        let model = ScriptedModel::new("echo").reply("whole answer");
        let mut chunks = Vec::new();
        let done = model
            .stream_chat(&ChatRequest::prompt(None, "q"), &mut |t| {
                chunks.push(t.to_string())
            })
            .await
            .unwrap();
        assert_eq!(chunks, vec!["whole answer"]);
        assert_eq!(done.as_text(), "whole answer");
    }

    /// Emits each word of a reply it owns, borrowed per call.
    struct WordStream;

    #[async_trait]
    impl LanguageModel for WordStream {
        fn model_id(&self) -> &str {
            "words"
        }

        async fn chat(&self, _request: &ChatRequest) -> Result<Completion> {
            Ok(Completion::text("one two three"))
        }

        async fn stream_chat(
            &self,
            request: &ChatRequest,
            on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
        ) -> Result<Completion> {
            let completion = self.chat(request).await?;
            let owned = completion.as_text().to_string();
            for word in owned.split(' ') {
                let delta = format!("{word} ");
                on_text(&delta);
            }
            Ok(completion)
        }
    }

    #[tokio::test]
    async fn stream_callback_accepts_short_lived_borrows() {
        let model: SharedModel = Arc::new(WordStream);
        let mut chunks = Vec::new();
        model
            .stream_chat(&ChatRequest::prompt(None, "q"), &mut |t| {
                chunks.push(t.trim().to_string())
            })
            .await
            .unwrap();
        assert_eq!(chunks, vec!["one", "two", "three"]);
    }

    #[tokio::test]
    async fn generate_text_builds_system_and_user_turns() {
        let model = ScriptedModel::new("echo").reply("ok");
        generate_text(&model, Some("be terse"), "hello").await.unwrap();

        let seen = model.requests();
        assert_eq!(seen[0].system_text().as_deref(), Some("be terse"));
        assert_eq!(seen[0].last_user_text(), Some("hello"));
    }
}
