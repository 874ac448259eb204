//! Routing by structured model output.

use ailab_agent::{SharedModel, generate_object};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::info;

use crate::error::{Result, RoutingError};
use crate::router::Router;

/// A model's routing decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmDecision {
    pub route: String,
    pub reason: String,
    /// 0 to 100.
    pub confidence: f64,
}

/// Asks a model to pick one of a fixed set of routes.
pub struct LlmRouter {
    model: SharedModel,
    routes: Vec<String>,
    system_prompt: String,
}

impl LlmRouter {
    pub fn new<I, S>(model: SharedModel, routes: I, system_prompt: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            model,
            routes: routes.into_iter().map(Into::into).collect(),
            system_prompt: system_prompt.into(),
        }
    }

    pub fn routes(&self) -> &[String] {
        &self.routes
    }

    /// JSON schema of [`LlmDecision`] restricted to the allowed routes.
    pub fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "route": { "type": "string", "enum": self.routes },
                "reason": { "type": "string" },
                "confidence": { "type": "number", "minimum": 0, "maximum": 100 }
            },
            "required": ["route", "reason", "confidence"]
        })
    }

    pub async fn decide(&self, input: &str) -> Result<LlmDecision> {
        let decision: LlmDecision = generate_object(
            self.model.as_ref(),
            Some(&self.system_prompt),
            input,
            &self.schema(),
        )
        .await?;

        if !self.routes.contains(&decision.route) {
            return Err(RoutingError::UnknownRoute {
                route: decision.route,
            });
        }
        info!(
            route = %decision.route,
            confidence = decision.confidence,
            model_id = self.model.model_id(),
            "llm decision"
        );
        Ok(decision)
    }
}

#[async_trait]
impl Router for LlmRouter {
    fn name(&self) -> &str {
        "llm"
    }

    async fn route(&self, input: &str) -> Result<String> {
        Ok(self.decide(input).await?.route)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::presets;
    use ailab_agent::AgentError;
    use ailab_agent::testing::ScriptedModel;

    #[tokio::test]
    async fn decodes_decision_and_sends_few_shot_prompt() {
        let model = Arc::new(ScriptedModel::new("router").reply(
            r#"{"route":"SALES","reason":"批量购买询价","confidence":92}"#,
        ));
        let router = presets::support_llm_router(model.clone());

        let decision = router
            .decide("你们的产品很棒，但我想知道批量购买有没有折扣？")
            .await
            .unwrap();
        assert_eq!(decision.route, "SALES");
        assert_eq!(decision.confidence, 92.0);

        let system = model.requests()[0].messages[0].content.clone();
        assert!(system.starts_with("你是一个专业的企业客服中转系统"));
        assert!(system.contains("路由：BILLING"));
    }

    #[tokio::test]
    async fn route_outside_enum_fails_validation() {
        let model = Arc::new(
            ScriptedModel::new("router").reply(r#"{"route":"HR","reason":"x","confidence":10}"#),
        );
        let router = presets::support_llm_router(model);
        match router.decide("我要请假").await {
            Err(RoutingError::Agent(AgentError::SchemaValidation { .. })) => {}
            other => panic!("expected schema validation failure, got {other:?}"),
        }
    }
}
