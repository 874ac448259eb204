//! Confidence bands for a single target route.

use std::fmt;
use std::sync::Arc;

use ailab_agent::EmbeddingModel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::Result;
use crate::router::Router;
use crate::similarity::cosine_similarity;

/// What to do with an input given its similarity to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoutingAction {
    AutoDispatch,
    HumanReview,
    Reject,
}

impl RoutingAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoDispatch => "AUTO_DISPATCH",
            Self::HumanReview => "HUMAN_REVIEW",
            Self::Reject => "REJECT",
        }
    }
}

impl fmt::Display for RoutingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score bands: `>= pass` dispatches, `>= review` goes to a human.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub pass: f32,
    pub review: f32,
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        Self {
            pass: 0.8,
            review: 0.6,
        }
    }
}

impl ThresholdPolicy {
    pub fn new(pass: f32, review: f32) -> Self {
        Self { pass, review }
    }

    pub fn classify(&self, score: f32) -> RoutingAction {
        if score >= self.pass {
            RoutingAction::AutoDispatch
        } else if score >= self.review {
            RoutingAction::HumanReview
        } else {
            RoutingAction::Reject
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThresholdDecision {
    pub target: String,
    pub score: f32,
    pub action: RoutingAction,
}

/// Scores inputs against one target description.
pub struct ThresholdRouter {
    embedder: Arc<dyn EmbeddingModel>,
    target: String,
    description: String,
    policy: ThresholdPolicy,
    target_vector: OnceCell<Vec<f32>>,
}

impl ThresholdRouter {
    pub fn new(
        embedder: Arc<dyn EmbeddingModel>,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            embedder,
            target: target.into(),
            description: description.into(),
            policy: ThresholdPolicy::default(),
            target_vector: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn with_policy(mut self, policy: ThresholdPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> ThresholdPolicy {
        self.policy
    }

    pub async fn evaluate(&self, input: &str) -> Result<ThresholdDecision> {
        let target = self
            .target_vector
            .get_or_try_init(|| self.embedder.embed(&self.description))
            .await?;
        let query = self.embedder.embed(input).await?;
        let score = cosine_similarity(&query, target)?;
        let action = self.policy.classify(score);
        info!(target = %self.target, score, %action, "threshold decision");
        Ok(ThresholdDecision {
            target: self.target.clone(),
            score,
            action,
        })
    }
}

#[async_trait]
impl Router for ThresholdRouter {
    fn name(&self) -> &str {
        "threshold"
    }

    /// The target name on dispatch, otherwise the action label.
    async fn route(&self, input: &str) -> Result<String> {
        let decision = self.evaluate(input).await?;
        Ok(match decision.action {
            RoutingAction::AutoDispatch => decision.target,
            other => other.as_str().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ailab_agent::testing::KeywordEmbedder;

    #[test]
    fn bands_are_inclusive_at_the_lower_edge() {
        let policy = ThresholdPolicy::default();
        assert_eq!(policy.classify(0.8), RoutingAction::AutoDispatch);
        assert_eq!(policy.classify(0.79), RoutingAction::HumanReview);
        assert_eq!(policy.classify(0.6), RoutingAction::HumanReview);
        assert_eq!(policy.classify(0.59), RoutingAction::Reject);
        assert_eq!(policy.classify(-1.0), RoutingAction::Reject);
    }

    #[tokio::test]
    async fn three_outcomes() {
        let embedder = Arc::new(KeywordEmbedder::new(
            "kw",
            [vec!["退", "钱"], vec!["不满意", "改进"], vec!["服务"]],
        ));
        let router = ThresholdRouter::new(embedder, "REFUND", "我要退钱，不满意");

        let refund = router.evaluate("把钱退给我").await.unwrap();
        assert_eq!(refund.action, RoutingAction::AutoDispatch);
        assert_eq!(router.route("把钱退给我").await.unwrap(), "REFUND");

        let feedback = router.evaluate("钱，改进一下服务").await.unwrap();
        assert_eq!(feedback.action, RoutingAction::HumanReview);

        let weather = router.evaluate("今天天气不错").await.unwrap();
        assert_eq!(weather.action, RoutingAction::Reject);
        assert_eq!(router.route("今天天气不错").await.unwrap(), "REJECT");
    }
}
