//! End-to-end tests of the chat stack over a temporary data directory.

use std::sync::Arc;
use std::time::Duration;

use ailab_agent::chat::TITLE_SYSTEM_PROMPT;
use ailab_agent::registry::ProviderStrategy;
use ailab_agent::testing::{EchoStrategy, ScriptedModel};
use ailab_agent::{
    AgentConfig, AgentContext, AgentError, ChatService, ChatTurn, Completion, DemoToolkit,
    ExecutionState, FallbackModel, LanguageModel, MemoryChat, ModelEntry, ProviderRegistry,
    RetryManager, Result, SharedModel, ToolCall, run_agent,
};
use ailab_store::{AgentDraft, AgentProfileStore, ChatMemory, SessionStore};
use async_trait::async_trait;
use serde_json::json;

/// Hands out one pre-built model for every entry.
struct FixedStrategy(SharedModel);

#[async_trait]
impl ProviderStrategy for FixedStrategy {
    async fn create(&self, _entry: &ModelEntry) -> Result<SharedModel> {
        Ok(self.0.clone())
    }
}

/// Titles requests get `标题`, everything else `reply to: <input>`.
fn titling_model() -> Arc<ScriptedModel> {
    Arc::new(ScriptedModel::responding("mock", |req| {
        if req.system_text().as_deref() == Some(TITLE_SYSTEM_PROMPT) {
            Ok(Completion::text("\"安装问题\""))
        } else {
            Ok(Completion::text(format!(
                "reply to: {}",
                req.last_user_text().unwrap_or_default()
            )))
        }
    }))
}

async fn service(dir: &std::path::Path, model: SharedModel) -> ChatService {
    let registry = ProviderRegistry::new();
    registry.register_provider("mock", Arc::new(FixedStrategy(model)));
    registry
        .register_model(ModelEntry::new("mock-model", "Mock", "mock", "mock"))
        .await
        .unwrap();
    ChatService::new(
        Arc::new(registry),
        SessionStore::new(dir.join("sessions")),
        AgentProfileStore::new(dir.join("agents")),
        "mock-model",
    )
}

#[tokio::test]
async fn first_turn_titles_and_persists_session() {
    let tmp = tempfile::tempdir().unwrap();
    let model = titling_model();
    let chat = service(tmp.path(), model.clone()).await;

    let mut streamed = String::new();
    let outcome = chat
        .send(
            ChatTurn {
                session_id: "session-1".into(),
                user_input: "安装时报错".into(),
                ..ChatTurn::default()
            },
            &mut |t| streamed.push_str(t),
        )
        .await
        .unwrap();

    assert_eq!(outcome.title, "安装问题");
    assert_eq!(outcome.reply, "reply to: 安装时报错");
    assert_eq!(streamed, outcome.reply);

    let record = chat.sessions().load("session-1").await.unwrap().unwrap();
    assert_eq!(record.title, "安装问题");
    assert_eq!(record.messages.len(), 2);
    assert_eq!(record.messages[1].role, "assistant");

    // A second turn keeps the title and sends the whole history.
    chat.send(
        ChatTurn {
            session_id: "session-1".into(),
            user_input: "还是不行".into(),
            ..ChatTurn::default()
        },
        &mut |_| {},
    )
    .await
    .unwrap();
    let last = model.requests().pop().unwrap();
    assert_eq!(last.messages.len(), 3);
    assert_eq!(model.calls(), 3);
}

#[tokio::test]
async fn failed_title_falls_back_to_input_prefix() {
    let tmp = tempfile::tempdir().unwrap();
    let model = Arc::new(ScriptedModel::new("m").fail("API returned 503").reply("ok"));
    let chat = service(tmp.path(), model).await;

    let input = "这是一个非常非常长的问题描述，超过了二十个字符的限制，需要截断";
    let outcome = chat
        .send(
            ChatTurn {
                session_id: "session-2".into(),
                user_input: input.into(),
                ..ChatTurn::default()
            },
            &mut |_| {},
        )
        .await
        .unwrap();
    assert_eq!(outcome.title, input.chars().take(20).collect::<String>());
}

#[tokio::test]
async fn agent_prompt_becomes_system_message() {
    let tmp = tempfile::tempdir().unwrap();
    let model = titling_model();
    let chat = service(tmp.path(), model.clone()).await;
    chat.agents()
        .save(AgentDraft {
            id: Some("pirate".into()),
            name: "Pirate".into(),
            prompt: "Talk like a pirate.".into(),
            ..AgentDraft::default()
        })
        .await
        .unwrap();

    chat.send(
        ChatTurn {
            session_id: "named".into(),
            user_input: "hello".into(),
            agent_id: Some("pirate".into()),
            ..ChatTurn::default()
        },
        &mut |_| {},
    )
    .await
    .unwrap();

    // Title is not generated for a session with a real id as title.
    assert_eq!(model.calls(), 1);
    let req = &model.requests()[0];
    assert_eq!(req.system_text().as_deref(), Some("Talk like a pirate."));
}

#[tokio::test]
async fn unknown_model_is_reported() {
    let tmp = tempfile::tempdir().unwrap();
    let chat = service(tmp.path(), titling_model()).await;
    let err = chat
        .send(
            ChatTurn {
                session_id: "s".into(),
                user_input: "hi".into(),
                model_id: Some("gpt-9".into()),
                ..ChatTurn::default()
            },
            &mut |_| {},
        )
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "Model gpt-9 not found in registry");
    assert!(chat.sessions().load("s").await.unwrap().is_none());
}

#[tokio::test]
async fn echo_strategy_serves_default_registry_entries() {
    let tmp = tempfile::tempdir().unwrap();
    let registry = ProviderRegistry::with_defaults(None);
    registry.register_provider("ollama", Arc::new(EchoStrategy));
    let chat = ChatService::new(
        Arc::new(registry),
        SessionStore::new(tmp.path().join("sessions")),
        AgentProfileStore::new(tmp.path().join("agents")),
        "qwen-local",
    );

    let outcome = chat
        .send(
            ChatTurn {
                session_id: "offline".into(),
                user_input: "ping".into(),
                ..ChatTurn::default()
            },
            &mut |_| {},
        )
        .await
        .unwrap();
    assert_eq!(outcome.reply, "[qwen-local] ping");
}

#[tokio::test]
async fn memory_chat_remembers_across_instances() {
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("chat_memory.json");
    let model = Arc::new(ScriptedModel::new("m").reply("Nice to meet you, Lin.").reply("Lin."));

    let first = MemoryChat::new(ChatMemory::new(&path), model.clone());
    first.chat("My name is Lin.").await.unwrap();

    let second = MemoryChat::new(ChatMemory::new(&path), model.clone());
    assert_eq!(second.chat("What is my name?").await.unwrap(), "Lin.");

    let last = model.requests().pop().unwrap();
    assert_eq!(last.messages.len(), 3);
    assert_eq!(last.messages[0].content, "My name is Lin.");
    assert_eq!(ChatMemory::new(&path).load().await.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn retry_around_fallback_chain() {
    let flaky = Arc::new(ScriptedModel::new("cloud").fail("API returned 500").fail("API returned 500"));
    let local = Arc::new(ScriptedModel::new("local").fail("connection refused").reply("done"));
    let chain = FallbackModel::new(vec![flaky, local]).unwrap();
    let retry = RetryManager::new(2, Duration::from_millis(100));

    let request = ailab_agent::ChatRequest::prompt(None, "q");
    let text = retry
        .execute("chain", || async { chain.chat(&request).await })
        .await
        .unwrap()
        .into_text();
    assert_eq!(text, "done");
}

#[tokio::test]
async fn agent_chains_demo_tools_into_state() {
    let state = ExecutionState::new();
    let model = Arc::new(
        ScriptedModel::new("m")
            .tool_calls(vec![ToolCall {
                id: "1".into(),
                name: "calculate_price".into(),
                arguments: json!({"price": 100, "taxRate": 0.1}),
            }])
            .tool_calls(vec![
                ToolCall {
                    id: "2".into(),
                    name: "get_exchange_rate".into(),
                    arguments: json!({"from": "USD", "to": "CNY"}),
                },
                ToolCall {
                    id: "3".into(),
                    name: "get_weather".into(),
                    arguments: json!({"location": "Shanghai"}),
                },
            ])
            .reply("792 CNY, sunny."),
    );
    let mut ctx = AgentContext::new(
        model.clone(),
        vec![Arc::new(DemoToolkit::with_state(state.clone()))],
        AgentConfig::default(),
    )
    .with_user_message("What does a $100 item cost in CNY with 10% tax?");

    let response = run_agent(&mut ctx).await.unwrap();
    assert_eq!(response.steps_used, 3);
    assert_eq!(response.tool_calls.len(), 3);
    assert_eq!(state.get("exchangeRate"), Some(json!(7.2)));

    // Results of parallel calls come back in call order.
    let third = &model.requests()[2];
    let ids: Vec<_> = third
        .messages
        .iter()
        .filter_map(|m| m.tool_call_id.as_deref())
        .collect();
    assert_eq!(ids, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn max_steps_error_names_task() {
    let model = Arc::new(ScriptedModel::responding("m", |_| {
        Ok(Completion::tool_calls(vec![ToolCall {
            id: "w".into(),
            name: "get_weather".into(),
            arguments: json!({"location": "Paris"}),
        }]))
    }));
    let mut ctx = AgentContext::new(
        model,
        vec![Arc::new(DemoToolkit::new())],
        AgentConfig {
            max_steps: 2,
            ..AgentConfig::default()
        },
    );
    let task_id = ctx.task_id;
    match run_agent(&mut ctx).await {
        Err(AgentError::MaxStepsExceeded { task_id: t, max_steps }) => {
            assert_eq!(t, task_id);
            assert_eq!(max_steps, 2);
        }
        other => panic!("expected MaxStepsExceeded, got {other:?}"),
    }
}
