//! Subcommands: `ailab chat` and `ailab memory`.

use std::io::{self, Write as _};

use anyhow::{Context, Result};
use tracing::info;

use ailab_agent::{ChatTurn, MemoryChat};
use ailab_store::ChatMemory;

use crate::helpers::{Lab, is_exit, read_line};

/// Interactive chat in a persisted session.
pub async fn cmd_chat(
    lab: &Lab,
    session: Option<String>,
    model: Option<String>,
    agent: Option<String>,
) -> Result<()> {
    let service = lab.chat_service();
    let session_id = session.unwrap_or_else(session_id);

    let history = service
        .sessions()
        .messages(&session_id)
        .await
        .context("failed to load session")?;
    println!();
    if history.is_empty() {
        println!("  New session: {session_id}");
    } else {
        println!("  Resuming session: {session_id} ({} messages)", history.len());
    }
    println!("  Type a message, or 'quit' to exit.");
    println!();

    while let Some(line) = read_line("> ")? {
        if line.is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }

        let turn = ChatTurn {
            session_id: session_id.clone(),
            user_input: line,
            model_id: model.clone(),
            agent_id: agent.clone(),
        };
        let mut stdout = io::stdout();
        let mut on_text = |fragment: &str| {
            print!("{fragment}");
            let _ = stdout.flush();
        };
        match service.send(turn, &mut on_text).await {
            Ok(outcome) => {
                println!();
                info!(title = %outcome.title, tokens = outcome.usage.output_tokens, "turn complete");
            }
            Err(e) => println!("\n  error: {e}"),
        }
        println!();
    }
    Ok(())
}

/// `session-<unix millis>`, the id format the web frontend uses.
fn session_id() -> String {
    format!("session-{}", chrono::Utc::now().timestamp_millis())
}

pub async fn cmd_memory_chat(lab: &Lab, model: Option<&str>) -> Result<()> {
    let memory = ChatMemory::new(lab.config.memory_file());
    let remembered = memory.load().await.len();
    let chat = MemoryChat::new(memory, lab.model(model).await?);

    println!();
    println!("  Memory: {} ({remembered} messages)", chat.memory().path().display());
    println!("  Type a message, or 'quit' to exit.");
    println!();

    while let Some(line) = read_line("> ")? {
        if line.is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }
        match chat.chat(&line).await {
            Ok(reply) => println!("{reply}\n"),
            Err(e) => println!("  error: {e}\n"),
        }
    }
    Ok(())
}

pub async fn cmd_memory_show(lab: &Lab) -> Result<()> {
    let memory = ChatMemory::new(lab.config.memory_file());
    let messages = memory.load().await;
    if messages.is_empty() {
        println!("  (memory is empty)");
    }
    for message in messages {
        println!("[{}] {}", message.role, message.content);
    }
    Ok(())
}

pub async fn cmd_memory_clear(lab: &Lab) -> Result<()> {
    ChatMemory::new(lab.config.memory_file())
        .clear()
        .await
        .context("failed to clear memory")?;
    println!("  Memory cleared.");
    Ok(())
}
