//! CLI argument definitions for ailab.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub const DEFAULT_TOOL_TASK: &str =
    "一件商品在美国卖 100 美元，税率是 0.1。请帮我计算出它折合人民币的总价是多少？";

/// ailab -- LLM provider registry, semantic routing and chat sessions.
#[derive(Parser)]
#[command(
    name = "ailab",
    version,
    about = "ailab -- LLM provider registry, semantic routing and chat sessions",
    long_about = "Talk to local and cloud models through one registry, route requests by \
                  meaning, and keep conversations on disk."
)]
pub struct Cli {
    /// Configuration file (TOML, or JSON with a `.json` extension).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Use in-process echo models and keyword embeddings instead of a
    /// model server.
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the models in the registry.
    Models,

    /// One-shot generation.
    Ask {
        prompt: String,

        /// Registry model id; defaults to the configured default model.
        #[arg(long, short)]
        model: Option<String>,

        /// Optional system prompt.
        #[arg(long)]
        system: Option<String>,

        /// Print the reply as it is generated.
        #[arg(long)]
        stream: bool,
    },

    /// Interactive chat in a persisted session.
    Chat {
        /// Session id; a new one is created when omitted.
        #[arg(long, short)]
        session: Option<String>,

        #[arg(long, short)]
        model: Option<String>,

        /// Agent profile whose prompt becomes the system message.
        #[arg(long, short)]
        agent: Option<String>,
    },

    /// Chat with a single file-backed memory.
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },

    /// Agent patterns; the tool-calling agent runs when no pattern is given.
    Agent {
        #[command(subcommand)]
        pattern: Option<AgentPattern>,
    },

    /// Route inputs with one of the routers.
    Route {
        #[command(subcommand)]
        action: RouteAction,
    },

    /// Benchmark the LLM router against the keyword baseline.
    Eval {
        #[arg(long, short)]
        model: Option<String>,
    },

    /// Compare phrases against the first one by embedding similarity.
    Similarity {
        /// Phrases to compare; the first is the reference.  A built-in set
        /// is used when none are given.
        phrases: Vec<String>,
    },

    /// Manage chat sessions.
    Sessions {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Manage agent profiles.
    Agents {
        #[command(subcommand)]
        action: AgentAction,
    },

    /// Start the HTTP API.
    Serve {
        /// Address to bind the HTTP server to.
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,

        /// Port to listen on.
        #[arg(long, short, default_value_t = 3000)]
        port: u16,

        /// Directory of static frontend files.
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum MemoryAction {
    /// Interactive chat that remembers earlier runs.
    Chat {
        #[arg(long, short)]
        model: Option<String>,
    },
    /// Print the remembered history.
    Show,
    /// Forget everything.
    Clear,
}

#[derive(Subcommand)]
pub enum AgentPattern {
    /// Multi-step tool calling with the demo toolkit.
    Tools {
        #[arg(default_value = DEFAULT_TOOL_TASK)]
        task: String,

        #[arg(long, short)]
        model: Option<String>,

        #[arg(long, default_value_t = 5)]
        max_steps: u32,

        /// Ask before every tool call.
        #[arg(long)]
        approve: bool,
    },
    /// A planner dispatches to research and writing workers.
    Supervise {
        #[arg(default_value = "帮我查一下什么是 OpenCode，并整理成推文。")]
        input: String,

        #[arg(long, short)]
        model: Option<String>,
    },
    /// Draft code, review it and refine it.
    Reflect {
        #[arg(default_value = "写一个 JavaScript 函数，计算两个日期之间相差的天数。要求考虑边界情况。")]
        task: String,

        #[arg(long, short)]
        model: Option<String>,

        /// Reviewer model; defaults to the writing model.
        #[arg(long)]
        reviewer: Option<String>,

        #[arg(long, default_value_t = 1)]
        rounds: u32,
    },
    /// Writer drafts, reviewer suggests, writer revises.
    Collab {
        #[arg(default_value = "请用 100 字以内解释什么是 Redis 的持久化。")]
        task: String,

        #[arg(long, short)]
        model: Option<String>,

        #[arg(long)]
        reviewer: Option<String>,
    },
}

impl AgentPattern {
    /// `ailab agent` with no pattern.
    pub fn default_tools() -> Self {
        Self::Tools {
            task: DEFAULT_TOOL_TASK.to_string(),
            model: None,
            max_steps: 5,
            approve: false,
        }
    }
}

#[derive(Subcommand)]
pub enum RouteAction {
    /// Keyword rules first, then embedding similarity.
    Hybrid { inputs: Vec<String> },
    /// Confidence bands against the refund queue.
    Threshold { inputs: Vec<String> },
    /// Two-level department tree.
    Tree { inputs: Vec<String> },
    /// Structured decision from a model.
    Llm {
        inputs: Vec<String>,
        #[arg(long, short)]
        model: Option<String>,
    },
    /// Summarise a conversation, then route the request with it.
    Context {
        /// The current request.
        #[arg(default_value = "我想退款")]
        input: String,
        /// Earlier turns, oldest first.  A built-in history is used when
        /// none are given.
        #[arg(long = "turn")]
        history: Vec<String>,
        #[arg(long, short)]
        model: Option<String>,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// List all saved sessions.
    List,
    /// Show messages from a session.
    Show { id: String },
    /// Delete a session.
    Delete { id: String },
    /// Full-text search over sessions.
    Search { query: String },
}

#[derive(Subcommand)]
pub enum AgentAction {
    /// List agent profiles.
    List,
    /// Create or update a profile.
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        prompt: String,
        /// Profile id; generated when omitted.
        #[arg(long)]
        id: Option<String>,
        /// Preferred model id.
        #[arg(long)]
        model: Option<String>,
    },
    /// Delete a profile.
    Delete { id: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["ailab", "route", "tree", "退款", "--offline", "--log-json"])
            .unwrap();
        assert!(cli.offline);
        assert!(cli.log_json);
        match cli.command {
            Commands::Route {
                action: RouteAction::Tree { inputs },
            } => assert_eq!(inputs, vec!["退款"]),
            _ => panic!("expected route tree"),
        }
    }

    #[test]
    fn context_turns_are_repeatable() {
        let cli = Cli::try_parse_from([
            "ailab", "route", "context", "我想退款", "--turn", "用户: a", "--turn", "助手: b",
        ])
        .unwrap();
        match cli.command {
            Commands::Route {
                action: RouteAction::Context { input, history, .. },
            } => {
                assert_eq!(input, "我想退款");
                assert_eq!(history.len(), 2);
            }
            _ => panic!("expected route context"),
        }
    }

    #[test]
    fn serve_defaults() {
        let cli = Cli::try_parse_from(["ailab", "serve"]).unwrap();
        match cli.command {
            Commands::Serve { bind, port, static_dir } => {
                assert_eq!(bind, "127.0.0.1");
                assert_eq!(port, 3000);
                assert!(static_dir.is_none());
            }
            _ => panic!("expected serve"),
        }
    }

    #[test]
    fn bare_agent_has_no_pattern() {
        let cli = Cli::try_parse_from(["ailab", "agent"]).unwrap();
        match cli.command {
            Commands::Agent { pattern: None } => {}
            _ => panic!("expected bare agent"),
        }
        match AgentPattern::default_tools() {
            AgentPattern::Tools { task, max_steps, .. } => {
                assert_eq!(task, DEFAULT_TOOL_TASK);
                assert_eq!(max_steps, 5);
            }
            _ => panic!("expected tools"),
        }
    }

    #[test]
    fn agent_reflect_flags() {
        let cli = Cli::try_parse_from([
            "ailab", "agent", "reflect", "写一个排序", "--reviewer", "deepseek-chat", "--rounds", "2",
        ])
        .unwrap();
        match cli.command {
            Commands::Agent {
                pattern: Some(AgentPattern::Reflect { task, reviewer, rounds, model }),
            } => {
                assert_eq!(task, "写一个排序");
                assert_eq!(reviewer.as_deref(), Some("deepseek-chat"));
                assert_eq!(rounds, 2);
                assert!(model.is_none());
            }
            _ => panic!("expected agent reflect"),
        }
    }

    #[test]
    fn agents_create_requires_prompt() {
        assert!(Cli::try_parse_from(["ailab", "agents", "create", "--name", "x"]).is_err());
    }
}
