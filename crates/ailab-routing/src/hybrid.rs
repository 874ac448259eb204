//! Keyword-then-semantic routing.

use std::fmt;
use std::sync::Arc;

use ailab_agent::EmbeddingModel;
use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::keyword::{KeywordMatch, KeywordMatcher};
use crate::route::Route;
use crate::router::Router;
use crate::semantic::{RouteScore, SemanticRouter};

/// Which layer produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingLayer {
    Keyword,
    Pattern,
    Semantic,
}

impl fmt::Display for RoutingLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Keyword => "keyword",
            Self::Pattern => "pattern",
            Self::Semantic => "semantic",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HybridDecision {
    pub route: String,
    pub layer: RoutingLayer,
    /// Similarity of the winning route; `None` for exact-match decisions.
    pub score: Option<f32>,
    /// All semantic scores, best first; empty for exact-match decisions.
    pub scores: Vec<RouteScore>,
}

/// Exact keyword rules first, embedding similarity second.
#[derive(Debug)]
pub struct HybridRouter {
    name: String,
    keywords: KeywordMatcher,
    semantic: SemanticRouter,
}

impl HybridRouter {
    pub fn new(embedder: Arc<dyn EmbeddingModel>, routes: &[Route]) -> Result<Self> {
        Ok(Self {
            name: "hybrid".into(),
            keywords: KeywordMatcher::new(routes)?,
            semantic: SemanticRouter::new(embedder, routes)?,
        })
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Mutable access to the keyword layer, e.g. to add regex routes.
    pub fn keywords_mut(&mut self) -> &mut KeywordMatcher {
        &mut self.keywords
    }

    pub fn semantic(&self) -> &SemanticRouter {
        &self.semantic
    }

    /// Route `input`.  A keyword hit never calls the embedder.
    pub async fn decide(&self, input: &str) -> Result<HybridDecision> {
        if let Some(hit) = self.keywords.find(input) {
            let layer = match hit {
                KeywordMatch::Keyword { .. } => RoutingLayer::Keyword,
                KeywordMatch::Pattern { .. } => RoutingLayer::Pattern,
            };
            info!(route = hit.route(), %layer, "hybrid decision");
            return Ok(HybridDecision {
                route: hit.route().to_string(),
                layer,
                score: None,
                scores: Vec::new(),
            });
        }

        let scores = self.semantic.scores(input).await?;
        let best = scores.first().cloned();
        let (route, score) = match best {
            Some(best) => (best.route, Some(best.score)),
            None => (String::new(), None),
        };
        info!(route = %route, score = ?score, layer = %RoutingLayer::Semantic, "hybrid decision");
        Ok(HybridDecision {
            route,
            layer: RoutingLayer::Semantic,
            score,
            scores,
        })
    }
}

#[async_trait]
impl Router for HybridRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn route(&self, input: &str) -> Result<String> {
        Ok(self.decide(input).await?.route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presets;
    use ailab_agent::testing::KeywordEmbedder;

    fn embedder() -> Arc<KeywordEmbedder> {
        Arc::new(KeywordEmbedder::new(
            "kw",
            [
                vec!["系统", "管理", "配置", "参数"],
                vec!["报错", "崩溃", "闪退", "找不到"],
            ],
        ))
    }

    #[tokio::test]
    async fn keyword_hit_skips_embeddings() {
        let embedder = embedder();
        let router = HybridRouter::new(embedder.clone(), &presets::support_routes()).unwrap();
        let decision = router.decide("sudo reset system").await.unwrap();
        assert_eq!(decision.route, "ADMIN");
        assert_eq!(decision.layer, RoutingLayer::Keyword);
        assert!(decision.scores.is_empty());
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn semantic_layer_handles_paraphrases() {
        let router = HybridRouter::new(embedder(), &presets::support_routes()).unwrap();
        let decision = router.decide("我的应用在启动时闪退了").await.unwrap();
        assert_eq!(decision.route, "SUPPORT");
        assert_eq!(decision.layer, RoutingLayer::Semantic);
        assert_eq!(decision.scores.len(), 2);
        assert_eq!(decision.score, Some(decision.scores[0].score));
    }

    #[tokio::test]
    async fn pattern_layer_is_reported() {
        let mut router = HybridRouter::new(embedder(), &presets::support_routes()).unwrap();
        router
            .keywords_mut()
            .add_pattern(r"^reset (?P<target>\w+)$", "ADMIN")
            .unwrap();
        let decision = router.decide("reset password").await.unwrap();
        assert_eq!(decision.layer, RoutingLayer::Pattern);
        assert_eq!(router.route("reset password").await.unwrap(), "ADMIN");
    }
}
