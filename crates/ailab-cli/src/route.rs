//! Subcommands: `ailab route`, `ailab eval` and `ailab similarity`.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use ailab_routing::presets::{self, REFUND_TARGET};
use ailab_routing::{
    ContextualRouter, HybridRouter, Router, SimilarityLabel, ThresholdPolicy, ThresholdRouter,
    cosine_similarity, evaluate,
};

use crate::helpers::Lab;

/// Inputs used when none are given on the command line.
fn or_defaults(inputs: Vec<String>, defaults: &[&str]) -> Vec<String> {
    if inputs.is_empty() {
        defaults.iter().map(|s| s.to_string()).collect()
    } else {
        inputs
    }
}

pub async fn cmd_hybrid(lab: &Lab, inputs: Vec<String>) -> Result<()> {
    let router = HybridRouter::new(lab.embedder()?, &presets::support_routes())
        .context("failed to build hybrid router")?;

    for input in or_defaults(inputs, &["sudo reset system", "我的应用在启动时闪退了"]) {
        let decision = router.decide(&input).await?;
        println!("输入: {input}");
        match decision.score {
            Some(score) => println!(
                "  → {} ({} layer, score {score:.4})",
                decision.route, decision.layer
            ),
            None => println!("  → {} ({} layer)", decision.route, decision.layer),
        }
        for s in decision.scores.iter().skip(1) {
            println!("    {} {:.4}", s.route, s.score);
        }
    }
    Ok(())
}

pub async fn cmd_threshold(lab: &Lab, inputs: Vec<String>) -> Result<()> {
    let settings = lab.config.routing;
    let router = ThresholdRouter::new(lab.embedder()?, "REFUND", REFUND_TARGET)
        .with_policy(ThresholdPolicy::new(settings.pass_threshold, settings.review_threshold));

    let defaults = ["我不想要了，把钱退给我", "这个产品的颜色我觉得还可以改进", "今天天气不错"];
    for input in or_defaults(inputs, &defaults) {
        let decision = router.evaluate(&input).await?;
        println!("输入: {input}");
        println!("  score {:.4} → {}", decision.score, decision.action);
    }
    Ok(())
}

pub fn cmd_tree(inputs: Vec<String>) {
    let tree = presets::support_tree();
    let defaults = ["我需要申请退款，年度计划不符合预期", "软件在启动时提示权限不足"];
    for input in or_defaults(inputs, &defaults) {
        println!("输入: {input}");
        println!("  → {}", tree.route(&input));
    }
}

pub async fn cmd_llm(lab: &Lab, inputs: Vec<String>, model: Option<&str>) -> Result<()> {
    let router = presets::support_llm_router(lab.model(model).await?);
    let defaults = ["你们的产品很棒，但我想知道批量购买有没有折扣？"];
    for input in or_defaults(inputs, &defaults) {
        println!("输入: {input}");
        match router.decide(&input).await {
            Ok(d) => println!("  → {} (confidence {}) {}", d.route, d.confidence, d.reason),
            Err(e) => println!("  error: {e}"),
        }
    }
    Ok(())
}

pub async fn cmd_context(
    lab: &Lab,
    input: &str,
    history: Vec<String>,
    model: Option<&str>,
) -> Result<()> {
    let model = lab.model(model).await?;
    let history = or_defaults(
        history,
        &[
            "用户: 你们的软件在安装时一直报错",
            "助手: 建议您检查权限并重新运行",
            "用户: 我试过了，还是不行，太令人失望了",
        ],
    );

    let inner: Arc<dyn Router> = Arc::new(presets::support_llm_router(Arc::clone(&model)));
    let router = ContextualRouter::new(model, inner);
    let decision = router.route_with_history(input, &history).await?;

    println!("历史摘要: {}", decision.summary);
    println!("路由查询: {}", decision.query);
    println!("  → {}", decision.route);
    Ok(())
}

pub async fn cmd_eval(lab: &Lab, model: Option<&str>) -> Result<()> {
    let cases = presets::benchmark_cases();

    let baseline = evaluate(&presets::baseline_router(), &cases).await;
    println!("{baseline}\n");

    let llm = presets::support_llm_router(lab.model(model).await?);
    let report = evaluate(&llm, &cases).await;
    println!("{report}");
    Ok(())
}

pub async fn cmd_similarity(lab: &Lab, phrases: Vec<String>) -> Result<()> {
    let phrases = or_defaults(
        phrases,
        &[
            "人工智能将改变世界",
            "AI 正在革新我们的生活",
            "今天天气真不错",
            "机器学习是 AI 的分支",
        ],
    );
    if phrases.len() < 2 {
        bail!("need at least two phrases to compare");
    }

    let embedder = lab.embedder()?;
    let vectors = embedder
        .embed_many(&phrases)
        .await
        .context("embedding failed")?;

    println!("对比基准: \"{}\"\n", phrases[0]);
    for (phrase, vector) in phrases.iter().zip(&vectors).skip(1) {
        let score = cosine_similarity(&vectors[0], vector)?;
        println!("[相似度: {score:.4}] {}", SimilarityLabel::from_score(score));
        println!("   - \"{phrase}\"\n");
    }
    Ok(())
}
