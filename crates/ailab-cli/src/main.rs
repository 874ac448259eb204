//! CLI entry point for ailab.
//!
//! This binary provides the `ailab` command: model listing and one-shot
//! generation, session and memory chat, the tool-calling agent, the routing
//! demos and benchmark, store management, and the HTTP server.

mod agent;
mod ask;
mod chat;
mod cli;
mod helpers;
mod manage;
mod route;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use ailab_web::{WebConfig, WebServer};

use crate::cli::{AgentPattern, Cli, Commands, MemoryAction, RouteAction};
use crate::helpers::{Lab, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing("warn", cli.log_json);

    let lab = Lab::load(&cli).await?;

    match cli.command {
        Commands::Models => {
            ask::cmd_models(&lab);
            Ok(())
        }
        Commands::Ask {
            prompt,
            model,
            system,
            stream,
        } => ask::cmd_ask(&lab, &prompt, model.as_deref(), system.as_deref(), stream).await,
        Commands::Chat {
            session,
            model,
            agent,
        } => chat::cmd_chat(&lab, session, model, agent).await,
        Commands::Memory { action } => match action {
            MemoryAction::Chat { model } => chat::cmd_memory_chat(&lab, model.as_deref()).await,
            MemoryAction::Show => chat::cmd_memory_show(&lab).await,
            MemoryAction::Clear => chat::cmd_memory_clear(&lab).await,
        },
        Commands::Agent { pattern } => match pattern.unwrap_or_else(AgentPattern::default_tools) {
            AgentPattern::Tools {
                task,
                model,
                max_steps,
                approve,
            } => agent::cmd_agent(&lab, &task, model.as_deref(), max_steps, approve).await,
            AgentPattern::Supervise { input, model } => {
                agent::cmd_supervise(&lab, &input, model.as_deref()).await
            }
            AgentPattern::Reflect {
                task,
                model,
                reviewer,
                rounds,
            } => agent::cmd_reflect(&lab, &task, model.as_deref(), reviewer.as_deref(), rounds).await,
            AgentPattern::Collab {
                task,
                model,
                reviewer,
            } => agent::cmd_collab(&lab, &task, model.as_deref(), reviewer.as_deref()).await,
        },
        Commands::Route { action } => match action {
            RouteAction::Hybrid { inputs } => route::cmd_hybrid(&lab, inputs).await,
            RouteAction::Threshold { inputs } => route::cmd_threshold(&lab, inputs).await,
            RouteAction::Tree { inputs } => {
                route::cmd_tree(inputs);
                Ok(())
            }
            RouteAction::Llm { inputs, model } => {
                route::cmd_llm(&lab, inputs, model.as_deref()).await
            }
            RouteAction::Context {
                input,
                history,
                model,
            } => route::cmd_context(&lab, &input, history, model.as_deref()).await,
        },
        Commands::Eval { model } => route::cmd_eval(&lab, model.as_deref()).await,
        Commands::Similarity { phrases } => route::cmd_similarity(&lab, phrases).await,
        Commands::Sessions { action } => manage::cmd_sessions(&lab, action).await,
        Commands::Agents { action } => manage::cmd_agents(&lab, action).await,
        Commands::Serve {
            bind,
            port,
            static_dir,
        } => cmd_serve(&lab, bind, port, static_dir).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: serve
// ---------------------------------------------------------------------------

async fn cmd_serve(
    lab: &Lab,
    bind_addr: String,
    port: u16,
    static_dir: Option<std::path::PathBuf>,
) -> Result<()> {
    let config = WebConfig {
        bind_addr,
        port,
        static_dir,
    };
    let server = WebServer::new(config, lab.chat_service());
    let addr = server.addr();

    info!(addr = %addr, "web server starting");
    println!("  ailab API listening on http://{addr}");

    server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("web server failed: {e}"))
}
