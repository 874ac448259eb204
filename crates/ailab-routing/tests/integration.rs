//! End-to-end routing flows with deterministic models.

use std::sync::Arc;

use ailab_agent::testing::{KeywordEmbedder, ScriptedModel};
use ailab_agent::{CachedEmbedder, EmbeddingModel};
use ailab_routing::presets::{self, REFUND_TARGET};
use ailab_routing::{
    ContextualRouter, HybridRouter, RoutingAction, RoutingLayer, ThresholdPolicy, ThresholdRouter,
    evaluate,
};

fn support_embedder() -> Arc<KeywordEmbedder> {
    Arc::new(KeywordEmbedder::new(
        "kw",
        [
            vec!["系统", "管理", "配置", "参数"],
            vec!["报错", "崩溃", "闪退", "找不到"],
            vec!["退", "钱", "不满意", "退款"],
        ],
    ))
}

#[tokio::test]
async fn hybrid_demo_inputs() {
    let router = HybridRouter::new(support_embedder(), &presets::support_routes()).unwrap();

    let admin = router.decide("sudo reset system").await.unwrap();
    assert_eq!((admin.route.as_str(), admin.layer), ("ADMIN", RoutingLayer::Keyword));

    let crash = router.decide("我的应用在启动时闪退了").await.unwrap();
    assert_eq!((crash.route.as_str(), crash.layer), ("SUPPORT", RoutingLayer::Semantic));
}

#[tokio::test]
async fn cached_embedder_serves_repeated_routing() {
    let inner = support_embedder();
    let cached: Arc<dyn EmbeddingModel> = Arc::new(CachedEmbedder::new(inner.clone(), 100, 60));
    let router = ThresholdRouter::new(cached, "REFUND", REFUND_TARGET)
        .with_policy(ThresholdPolicy::new(0.8, 0.6));

    let first = router.evaluate("我不想要了，把钱退给我").await.unwrap();
    let calls = inner.calls();
    let second = router.evaluate("我不想要了，把钱退给我").await.unwrap();

    assert_eq!(first.action, RoutingAction::AutoDispatch);
    assert_eq!(first.score, second.score);
    assert_eq!(inner.calls(), calls);
    assert_eq!(
        router.evaluate("今天天气不错").await.unwrap().action,
        RoutingAction::Reject
    );
}

#[tokio::test]
async fn contextual_routing_through_the_llm_router() {
    let summarizer = Arc::new(ScriptedModel::new("summary").reply("用户安装失败多次，情绪失望"));
    let decider = Arc::new(ScriptedModel::new("router").reply(
        r#"```json
{"route":"TECHNICAL","reason":"安装问题未解决","confidence":80}
```"#,
    ));
    let router = ContextualRouter::new(
        summarizer,
        Arc::new(presets::support_llm_router(decider.clone())),
    );

    let decision = router
        .route_with_history("我想退款", &["用户: 你们的软件在安装时一直报错".to_string()])
        .await
        .unwrap();
    assert_eq!(decision.route, "TECHNICAL");
    let prompt = &decider.requests()[0].messages[1].content;
    assert_eq!(prompt, "历史背景: 用户安装失败多次，情绪失望 | 当前请求: 我想退款");
}

#[tokio::test]
async fn llm_router_benchmark_report() {
    let answers = ["BILLING", "TECHNICAL", "SALES", "BILLING", "TECHNICAL", "SALES", "SALES"];
    let mut model = ScriptedModel::new("router");
    for route in answers {
        model = model.reply(format!(
            r#"{{"route":"{route}","reason":"r","confidence":90}}"#
        ));
    }
    let router = presets::support_llm_router(Arc::new(model));

    let report = evaluate(&router, &presets::benchmark_cases()).await;
    assert_eq!(report.correct(), 6);
    assert!(report.to_string().contains("accuracy: 85.71% (6/7)"));
}
