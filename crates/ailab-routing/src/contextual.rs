//! Routing that takes the earlier conversation into account.
//!
//! A short request such as "I want a refund" means different things after a
//! billing dispute and after a failed install.  The history is condensed to
//! one sentence first and prepended to the request.

use std::sync::Arc;

use ailab_agent::{SharedModel, summarize_history};
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::router::Router;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextualDecision {
    /// Empty when there was no history.
    pub summary: String,
    pub query: String,
    pub route: String,
}

/// The query sent to the inner router.
pub fn enriched_query(summary: &str, input: &str) -> String {
    format!("历史背景: {summary} | 当前请求: {input}")
}

pub struct ContextualRouter {
    summarizer: SharedModel,
    inner: Arc<dyn Router>,
}

impl ContextualRouter {
    pub fn new(summarizer: SharedModel, inner: Arc<dyn Router>) -> Self {
        Self { summarizer, inner }
    }

    /// Summarise `history` and route the enriched query.  With no history
    /// the input is routed as is and no summary is requested.
    pub async fn route_with_history<S: AsRef<str>>(
        &self,
        input: &str,
        history: &[S],
    ) -> Result<ContextualDecision> {
        let (summary, query) = if history.is_empty() {
            (String::new(), input.to_string())
        } else {
            let summary = summarize_history(self.summarizer.as_ref(), history).await?;
            let query = enriched_query(&summary, input);
            (summary, query)
        };

        let route = self.inner.route(&query).await?;
        info!(inner = self.inner.name(), route = %route, history = history.len(), "contextual decision");
        Ok(ContextualDecision {
            summary,
            query,
            route,
        })
    }
}

#[async_trait]
impl Router for ContextualRouter {
    fn name(&self) -> &str {
        "contextual"
    }

    async fn route(&self, input: &str) -> Result<String> {
        let none: &[&str] = &[];
        Ok(self.route_with_history(input, none).await?.route)
    }
}
