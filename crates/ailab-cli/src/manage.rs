//! Subcommands: `ailab sessions` and `ailab agents`.

use anyhow::{Context, Result};

use ailab_store::AgentDraft;

use crate::cli::{AgentAction, SessionAction};
use crate::helpers::Lab;

pub async fn cmd_sessions(lab: &Lab, action: SessionAction) -> Result<()> {
    let store = lab.sessions();
    match action {
        SessionAction::List => {
            let sessions = store.list().await.context("failed to list sessions")?;
            if sessions.is_empty() {
                println!("  No sessions found.");
            }
            for s in sessions {
                println!("  {:<28} {}", s.id, s.title);
            }
        }
        SessionAction::Show { id } => {
            let Some(record) = store.load(&id).await.context("failed to load session")? else {
                println!("  Session '{id}' not found.");
                return Ok(());
            };
            println!("  {} ({} messages)\n", record.title, record.messages.len());
            for message in record.messages {
                println!("[{}] {}\n", message.role, message.content);
            }
        }
        SessionAction::Delete { id } => match store.delete(&id).await {
            Ok(()) => println!("  Deleted session '{id}'."),
            Err(e) if e.is_not_found() => println!("  Session '{id}' not found."),
            Err(e) => return Err(e).context("failed to delete session"),
        },
        SessionAction::Search { query } => {
            let hits = store.search(&query).await.context("search failed")?;
            println!("  {} match(es) for '{query}'", hits.len());
            for s in hits {
                println!("  {:<28} {}", s.id, s.title);
            }
        }
    }
    Ok(())
}

pub async fn cmd_agents(lab: &Lab, action: AgentAction) -> Result<()> {
    let store = lab.agents();
    match action {
        AgentAction::List => {
            let agents = store.list().await.context("failed to list agents")?;
            if agents.is_empty() {
                println!("  No agent profiles.");
            }
            for a in agents {
                let model = a.model.as_deref().unwrap_or("-");
                println!("  {:<24} {:<20} {model}", a.id, a.name);
            }
        }
        AgentAction::Create {
            name,
            prompt,
            id,
            model,
        } => {
            let profile = store
                .save(AgentDraft {
                    id,
                    name,
                    prompt,
                    model,
                    ..AgentDraft::default()
                })
                .await
                .context("failed to save agent")?;
            println!("  Saved agent '{}' ({}).", profile.name, profile.id);
        }
        AgentAction::Delete { id } => match store.delete(&id).await {
            Ok(()) => println!("  Deleted agent '{id}'."),
            Err(e) if e.is_not_found() => println!("  Agent '{id}' not found."),
            Err(e) => return Err(e).context("failed to delete agent"),
        },
    }
    Ok(())
}
