//! Subcommands: `ailab models` and `ailab ask`.

use std::io::{self, Write as _};
use std::sync::Arc;

use anyhow::{Context, Result};

use ailab_agent::{
    ChatRequest, LanguageModel, LoggingMiddleware, Middleware, UsageTracker, wrap_model,
};

use crate::helpers::Lab;

pub fn cmd_models(lab: &Lab) {
    println!("{:<18} {:<20} {:<8} NAME", "ID", "PROVIDER", "GROUP");
    for entry in lab.registry().models() {
        let marker = if entry.id == lab.config.default_model { "*" } else { " " };
        println!(
            "{marker}{:<17} {:<20} {:<8} {}",
            entry.id,
            entry.provider,
            entry.group.as_deref().unwrap_or("-"),
            entry.name
        );
    }
}

pub async fn cmd_ask(
    lab: &Lab,
    prompt: &str,
    model: Option<&str>,
    system: Option<&str>,
    stream: bool,
) -> Result<()> {
    let tracker = Arc::new(UsageTracker::new());
    let stack: Vec<Arc<dyn Middleware>> = vec![Arc::new(LoggingMiddleware), tracker.clone()];
    let model = wrap_model(lab.model(model).await?, stack);

    let request = ChatRequest::prompt(system, prompt);
    let completion = if stream {
        let mut stdout = io::stdout();
        let mut on_text = |fragment: &str| {
            print!("{fragment}");
            let _ = stdout.flush();
        };
        let completion = model
            .stream_chat(&request, &mut on_text)
            .await
            .context("generation failed")?;
        println!();
        completion
    } else {
        let completion = model.chat(&request).await.context("generation failed")?;
        println!("{}", completion.as_text());
        completion
    };

    let totals = tracker.snapshot();
    println!();
    println!(
        "  model: {}  tokens: {} in / {} out ({} total)",
        model.model_id(),
        completion.usage.input_tokens,
        completion.usage.output_tokens,
        totals.total_tokens()
    );
    Ok(())
}
