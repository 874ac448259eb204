//! Multi-step tool-calling loop.
//!
//! The model is called with the conversation and the tool catalogue.  When
//! it asks for tools, they run (concurrently), their results are appended
//! to the conversation and the model is called again.  The loop ends on the
//! first text answer or when the step budget runs out.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{AgentError, Result};
use crate::llm::model::SharedModel;
use crate::llm::types::{
    ChatRequest, LlmResponse, Message, ToolCall, ToolDefinition, ToolResult, Usage,
};

// ---------------------------------------------------------------------------
// Tool adapter trait
// ---------------------------------------------------------------------------

/// A group of tools the agent may call.
#[async_trait]
pub trait ToolAdapter: Send + Sync {
    fn adapter_id(&self) -> &str;

    /// The tools this adapter exposes to the model.
    fn tool_definitions(&self) -> Vec<ToolDefinition>;

    /// Run one tool.  The returned string is fed back to the model verbatim.
    async fn execute(&self, tool_name: &str, arguments: Value) -> Result<String>;
}

// ---------------------------------------------------------------------------
// Agent context
// ---------------------------------------------------------------------------

/// Limits and sampling settings for one run.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Model calls allowed before the run is abandoned.
    pub max_steps: u32,
    /// Model override passed through to the client; empty for its default.
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 5,
            model: String::new(),
            temperature: Some(0.0),
            max_tokens: Some(4096),
        }
    }
}

/// What happened during one step, reported to the step callback.
#[derive(Debug, Clone)]
pub struct AgentStep {
    /// 1-based step number.
    pub step: u32,
    pub tool_calls: Vec<ToolCall>,
    pub tool_results: Vec<ToolResult>,
    /// The final answer, on the last step only.
    pub text: Option<String>,
    pub usage: Usage,
}

/// Decides whether a requested tool call may run.
pub type ApprovalFn = Arc<dyn Fn(&ToolCall) -> bool + Send + Sync>;

/// Observes each completed step.
pub type StepCallback = Box<dyn FnMut(&AgentStep) + Send + Sync>;

/// State of a single agent run.
pub struct AgentContext {
    pub task_id: Uuid,
    pub messages: Vec<Message>,
    pub adapters: Vec<Arc<dyn ToolAdapter>>,
    pub model: SharedModel,
    pub config: AgentConfig,
    approval: Option<ApprovalFn>,
    on_step: Option<StepCallback>,
}

impl AgentContext {
    pub fn new(model: SharedModel, adapters: Vec<Arc<dyn ToolAdapter>>, config: AgentConfig) -> Self {
        Self {
            task_id: Uuid::now_v7(),
            messages: Vec::new(),
            adapters,
            model,
            config,
            approval: None,
            on_step: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.messages.insert(0, Message::system(prompt));
        self
    }

    pub fn with_user_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(Message::user(message));
        self
    }

    /// Append an existing history.
    pub fn with_messages(mut self, messages: impl IntoIterator<Item = Message>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Ask `approve` before every tool call.  A denied call is reported to
    /// the model as an error result instead of running.
    pub fn with_approval<F>(mut self, approve: F) -> Self
    where
        F: Fn(&ToolCall) -> bool + Send + Sync + 'static,
    {
        self.approval = Some(Arc::new(approve));
        self
    }

    pub fn with_step_callback<F>(mut self, on_step: F) -> Self
    where
        F: FnMut(&AgentStep) + Send + Sync + 'static,
    {
        self.on_step = Some(Box::new(on_step));
        self
    }

    fn all_tool_definitions(&self) -> Vec<ToolDefinition> {
        self.adapters
            .iter()
            .flat_map(|a| a.tool_definitions())
            .collect()
    }

    fn find_adapter_for_tool(&self, tool_name: &str) -> Option<&Arc<dyn ToolAdapter>> {
        self.adapters
            .iter()
            .find(|a| a.tool_definitions().iter().any(|td| td.name == tool_name))
    }

    fn report(&mut self, step: &AgentStep) {
        if let Some(on_step) = self.on_step.as_mut() {
            on_step(step);
        }
    }
}

// ---------------------------------------------------------------------------
// Agent response
// ---------------------------------------------------------------------------

/// Outcome of [`run_agent`].
#[derive(Debug, Clone)]
pub struct AgentResponse {
    pub text: String,
    pub steps_used: u32,
    pub task_id: Uuid,
    /// Every tool call made during the run, in order.
    pub tool_calls: Vec<ToolCall>,
    /// Tokens summed over all steps.
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Loop
// ---------------------------------------------------------------------------

/// Drive the tool-calling loop to a text answer.
///
/// # Errors
///
/// [`AgentError::MaxStepsExceeded`] when no text answer arrives within
/// `max_steps`, [`AgentError::UnknownTool`] when the model names a tool no
/// adapter provides, and any model error unchanged.  Tool failures are not
/// errors: they are fed back to the model as `Error: <reason>`.
pub async fn run_agent(ctx: &mut AgentContext) -> Result<AgentResponse> {
    let tools = ctx.all_tool_definitions();
    let task_id = ctx.task_id;
    let max_steps = ctx.config.max_steps;
    let mut all_calls = Vec::new();
    let mut usage = Usage::default();

    tracing::info!(
        task_id = %task_id,
        model_id = ctx.model.model_id(),
        max_steps,
        tool_count = tools.len(),
        "agent run started"
    );

    for step in 1..=max_steps {
        let request = ChatRequest {
            model: ctx.config.model.clone(),
            messages: ctx.messages.clone(),
            tools: tools.clone(),
            temperature: ctx.config.temperature,
            max_tokens: ctx.config.max_tokens,
        };

        let completion = ctx.model.chat(&request).await?;
        usage.input_tokens += completion.usage.input_tokens;
        usage.output_tokens += completion.usage.output_tokens;

        match completion.response {
            LlmResponse::Text(text) => {
                tracing::info!(task_id = %task_id, steps = step, "agent run finished");
                ctx.messages.push(Message::assistant(&text));
                ctx.report(&AgentStep {
                    step,
                    tool_calls: Vec::new(),
                    tool_results: Vec::new(),
                    text: Some(text.clone()),
                    usage: completion.usage,
                });
                return Ok(AgentResponse {
                    text,
                    steps_used: step,
                    task_id,
                    tool_calls: all_calls,
                    usage,
                });
            }

            LlmResponse::ToolCalls(calls) => {
                tracing::info!(
                    task_id = %task_id,
                    step,
                    tools = ?calls.iter().map(|c| &c.name).collect::<Vec<_>>(),
                    "model requested tools"
                );
                ctx.messages.push(Message::assistant_tool_calls(calls.clone()));

                let results = execute_tool_calls(&calls, ctx).await?;
                for result in &results {
                    ctx.messages
                        .push(Message::tool_result(&result.tool_call_id, &result.content));
                }

                ctx.report(&AgentStep {
                    step,
                    tool_calls: calls.clone(),
                    tool_results: results,
                    text: None,
                    usage: completion.usage,
                });
                all_calls.extend(calls);
            }
        }
    }

    tracing::warn!(task_id = %task_id, max_steps, "agent step budget exhausted");
    Err(AgentError::MaxStepsExceeded { task_id, max_steps })
}

/// Run a batch of tool calls concurrently, results in call order.
async fn execute_tool_calls(calls: &[ToolCall], ctx: &AgentContext) -> Result<Vec<ToolResult>> {
    let mut handles = Vec::with_capacity(calls.len());

    for call in calls {
        let adapter = ctx
            .find_adapter_for_tool(&call.name)
            .ok_or_else(|| AgentError::UnknownTool {
                tool_name: call.name.clone(),
            })?
            .clone();

        let approved = ctx.approval.as_ref().is_none_or(|approve| approve(call));
        let tool_name = call.name.clone();
        let tool_id = call.id.clone();
        let arguments = call.arguments.clone();

        handles.push(tokio::spawn(async move {
            if !approved {
                tracing::info!(tool = %tool_name, "tool call denied");
                return ToolResult {
                    tool_call_id: tool_id,
                    content: format!("Error: the user denied the call to `{tool_name}`"),
                    is_error: true,
                };
            }

            tracing::debug!(tool = %tool_name, id = %tool_id, "executing tool");
            match adapter.execute(&tool_name, arguments).await {
                Ok(content) => ToolResult {
                    tool_call_id: tool_id,
                    content,
                    is_error: false,
                },
                Err(e) => {
                    tracing::warn!(tool = %tool_name, error = %e, "tool execution failed");
                    ToolResult {
                        tool_call_id: tool_id,
                        content: format!("Error: {e}"),
                        is_error: true,
                    }
                }
            }
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        let result = handle
            .await
            .map_err(|e| AgentError::Internal(format!("tool task panicked: {e}")))?;
        results.push(result);
    }
    Ok(results)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::testing::ScriptedModel;

    struct Calculator;

    #[async_trait]
    impl ToolAdapter for Calculator {
        fn adapter_id(&self) -> &str {
            "calc"
        }

        fn tool_definitions(&self) -> Vec<ToolDefinition> {
            vec![ToolDefinition {
                name: "add".into(),
                description: "Add two numbers".into(),
                input_schema: json!({"type": "object"}),
            }]
        }

        async fn execute(&self, _tool_name: &str, arguments: Value) -> Result<String> {
            let a = arguments["a"].as_f64();
            let b = arguments["b"].as_f64();
            match (a, b) {
                (Some(a), Some(b)) => Ok((a + b).to_string()),
                _ => Err(AgentError::ToolExecutionFailed {
                    tool_name: "add".into(),
                    reason: "a and b must be numbers".into(),
                }),
            }
        }
    }

    fn call(id: &str, name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    fn context(model: Arc<ScriptedModel>) -> AgentContext {
        AgentContext::new(model, vec![Arc::new(Calculator)], AgentConfig::default())
            .with_system_prompt("You can add.")
            .with_user_message("1 + 2?")
    }

    #[tokio::test]
    async fn tool_result_is_fed_back() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .tool_calls(vec![call("c1", "add", json!({"a": 1, "b": 2}))])
                .reply("The sum is 3."),
        );
        let mut ctx = context(model.clone());

        let response = run_agent(&mut ctx).await.unwrap();
        assert_eq!(response.text, "The sum is 3.");
        assert_eq!(response.steps_used, 2);
        assert_eq!(response.tool_calls.len(), 1);

        let second = &model.requests()[1];
        let tool_msg = second.messages.last().unwrap();
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("c1"));
        assert_eq!(tool_msg.content, "3");
        assert_eq!(second.tools.len(), 1);
    }

    #[tokio::test]
    async fn tool_error_becomes_error_result() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .tool_calls(vec![call("c1", "add", json!({"a": "x"}))])
                .reply("Sorry."),
        );
        let mut ctx = context(model.clone());
        run_agent(&mut ctx).await.unwrap();

        let binding = model.requests();
        let fed_back = &binding[1].messages.last().unwrap().content;
        assert!(fed_back.starts_with("Error: tool execution failed for `add`"), "{fed_back}");
    }

    #[tokio::test]
    async fn unknown_tool_is_an_error() {
        let model = Arc::new(ScriptedModel::new("m").tool_calls(vec![call("c1", "rm_rf", json!({}))]));
        let mut ctx = context(model);
        match run_agent(&mut ctx).await {
            Err(AgentError::UnknownTool { tool_name }) => assert_eq!(tool_name, "rm_rf"),
            other => panic!("expected UnknownTool, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn step_budget_is_enforced() {
        let model = Arc::new(ScriptedModel::responding("m", |_| {
            Ok(crate::llm::types::Completion::tool_calls(vec![ToolCall {
                id: "loop".into(),
                name: "add".into(),
                arguments: json!({"a": 1, "b": 1}),
            }]))
        }));
        let mut ctx = AgentContext::new(
            model.clone(),
            vec![Arc::new(Calculator)],
            AgentConfig {
                max_steps: 3,
                ..AgentConfig::default()
            },
        )
        .with_user_message("go");

        match run_agent(&mut ctx).await {
            Err(AgentError::MaxStepsExceeded { max_steps, .. }) => assert_eq!(max_steps, 3),
            other => panic!("expected MaxStepsExceeded, got {other:?}"),
        }
        assert_eq!(model.calls(), 3);
    }

    #[tokio::test]
    async fn denied_call_does_not_run() {
        let model = Arc::new(
            ScriptedModel::new("m")
                .tool_calls(vec![call("c1", "add", json!({"a": 1, "b": 2}))])
                .reply("OK, I will not."),
        );
        let steps = Arc::new(Mutex::new(Vec::new()));
        let seen = steps.clone();
        let mut ctx = context(model.clone())
            .with_approval(|_| false)
            .with_step_callback(move |s| seen.lock().unwrap().push(s.clone()));

        let response = run_agent(&mut ctx).await.unwrap();
        assert_eq!(response.text, "OK, I will not.");

        let steps = steps.lock().unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].tool_results[0].is_error);
        assert!(steps[0].tool_results[0].content.contains("denied"));
        assert_eq!(steps[1].text.as_deref(), Some("OK, I will not."));
    }
}
