//! Subcommand: `ailab agent` -- tool calling and multi-agent patterns.

use std::sync::Arc;

use anyhow::{Context, Result};

use ailab_agent::{
    AgentConfig, AgentContext, AgentStep, Collaboration, DemoToolkit, ExecutionState,
    ReflectionLoop, Supervisor, ToolAdapter, ToolCall, run_agent,
};

use crate::helpers::{Lab, read_line};

const SYSTEM_PROMPT: &str = "你是一个严谨的助手。需要数据或计算时调用工具，不要自己编造数字。";

pub async fn cmd_agent(
    lab: &Lab,
    task: &str,
    model: Option<&str>,
    max_steps: u32,
    approve: bool,
) -> Result<()> {
    let model = lab.model(model).await?;
    let state = ExecutionState::new();
    let tools: Vec<Arc<dyn ToolAdapter>> = vec![Arc::new(DemoToolkit::with_state(state.clone()))];
    let config = AgentConfig {
        max_steps,
        ..AgentConfig::default()
    };

    let mut ctx = AgentContext::new(model, tools, config)
        .with_system_prompt(SYSTEM_PROMPT)
        .with_user_message(task)
        .with_step_callback(print_step);
    if approve {
        ctx = ctx.with_approval(confirm_tool_call);
    }

    println!("\n  Task: {task}\n");
    let response = run_agent(&mut ctx).await.context("agent run failed")?;

    println!("\n--- answer ({} steps) ---", response.steps_used);
    println!("{}", response.text);

    let summary = state.summary();
    if !summary.state.is_empty() {
        println!("\n--- state ({} entries, {}ms) ---", summary.total_steps, summary.duration_ms);
        for (key, value) in &summary.state {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}

pub async fn cmd_supervise(lab: &Lab, input: &str, model: Option<&str>) -> Result<()> {
    let supervisor = Supervisor::new(lab.model(model).await?);

    println!("\n  Request: {input}\n");
    let report = supervisor.run(input).await.context("supervisor run failed")?;
    println!("  intent: {}", report.intent);
    if report.steps.is_empty() {
        println!("  No worker can handle this request.");
    }
    for step in &report.steps {
        println!("\n--- {} ---\n{}", step.worker, step.output);
    }
    Ok(())
}

pub async fn cmd_reflect(
    lab: &Lab,
    task: &str,
    model: Option<&str>,
    reviewer: Option<&str>,
    rounds: u32,
) -> Result<()> {
    let author = lab.model(model).await?;
    let reviewer = match reviewer {
        Some(id) => lab.model(Some(id)).await?,
        None => author.clone(),
    };
    let reflection = ReflectionLoop::new(author)
        .with_reviewer(reviewer)
        .with_max_rounds(rounds);

    println!("\n  Task: {task}");
    let report = reflection.run(task).await.context("reflection run failed")?;
    println!("\n--- draft ---\n{}", report.draft);
    for (i, round) in report.rounds.iter().enumerate() {
        println!("\n--- review {} ---\n{}", i + 1, round.feedback);
        if let Some(revision) = &round.revision {
            println!("\n--- revision {} ---\n{revision}", i + 1);
        }
    }
    let verdict = if report.passed { "passed review" } else { "revised from feedback" };
    println!("\n  Result: {verdict}");
    Ok(())
}

pub async fn cmd_collab(
    lab: &Lab,
    task: &str,
    model: Option<&str>,
    reviewer: Option<&str>,
) -> Result<()> {
    let writer = lab.model(model).await?;
    let reviewer = match reviewer {
        Some(id) => lab.model(Some(id)).await?,
        None => writer.clone(),
    };

    println!("\n  Task: {task}");
    let report = Collaboration::new(writer, reviewer)
        .run(task)
        .await
        .context("collaboration run failed")?;
    println!("\n--- draft ---\n{}", report.draft);
    println!("\n--- review ---\n{}", report.review);
    println!("\n--- final ---\n{}", report.final_version);
    Ok(())
}

fn print_step(step: &AgentStep) {
    for (call, result) in step.tool_calls.iter().zip(&step.tool_results) {
        let mark = if result.is_error { "!" } else { "→" };
        println!("  [step {}] {}({}) {mark} {}", step.step, call.name, call.arguments, result.content);
    }
}

/// Ask on the terminal; anything but `y`/`yes` denies the call.
fn confirm_tool_call(call: &ToolCall) -> bool {
    let question = format!("  Allow {}({})? [y/N] ", call.name, call.arguments);
    matches!(
        read_line(&question).ok().flatten().as_deref(),
        Some("y" | "Y" | "yes")
    )
}
