//! Session-backed chat.
//!
//! [`ChatService`] ties the registry to the file stores: each turn loads
//! the session, optionally names it, streams the reply and writes the
//! session back.  [`MemoryChat`] is the single-file variant that keeps one
//! running conversation across restarts.

use std::sync::Arc;

use ailab_store::{AgentProfileStore, ChatMemory, SessionStore, StoredMessage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::llm::model::{LanguageModel, SharedModel};
use crate::llm::types::{ChatRequest, Message, Role, Usage};
use crate::registry::ProviderRegistry;

/// System prompt for session titles.
pub const TITLE_SYSTEM_PROMPT: &str = "你是一个对话标题生成助手。请根据用户的第一句话，总结出一个简短、准确的标题（不超过10个字）。直接返回标题，不要包含任何标点符号、解释或引用。";

/// Characters of the user input used as a title when generation fails.
const FALLBACK_TITLE_CHARS: usize = 20;

/// Prefix of auto-assigned session ids; such a title still needs naming.
const PLACEHOLDER_TITLE_PREFIX: &str = "session-";

// ---------------------------------------------------------------------------
// Message conversion
// ---------------------------------------------------------------------------

impl From<&StoredMessage> for Message {
    fn from(stored: &StoredMessage) -> Self {
        match Role::parse(&stored.role) {
            Role::System => Message::system(&stored.content),
            Role::Assistant => Message::assistant(&stored.content),
            Role::Tool => Message::tool_result(
                stored
                    .extra
                    .get("tool_call_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default(),
                &stored.content,
            ),
            Role::User => Message::user(&stored.content),
        }
    }
}

impl From<&Message> for StoredMessage {
    fn from(message: &Message) -> Self {
        StoredMessage::new(message.role.as_str(), &message.content)
    }
}

fn to_model_messages(system_prompt: &str, history: &[StoredMessage]) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    if !system_prompt.trim().is_empty() {
        messages.push(Message::system(system_prompt));
    }
    messages.extend(history.iter().map(Message::from));
    messages
}

// ---------------------------------------------------------------------------
// Titles
// ---------------------------------------------------------------------------

/// Ask `model` for a short title summarising a first message.
pub async fn generate_title(model: &dyn LanguageModel, message: &str) -> Result<String> {
    let prompt = format!("用户说: \"{message}\"\n\n请生成标题:");
    let completion = model
        .chat(&ChatRequest::prompt(Some(TITLE_SYSTEM_PROMPT), prompt))
        .await?;
    Ok(clean_title(completion.as_text()))
}

/// Trim whitespace and drop one leading and one trailing quote.
pub fn clean_title(raw: &str) -> String {
    let trimmed = raw.trim();
    let trimmed = trimmed
        .strip_prefix(['"', '\''])
        .unwrap_or(trimmed);
    let trimmed = trimmed
        .strip_suffix(['"', '\''])
        .unwrap_or(trimmed);
    trimmed.to_string()
}

/// The first characters of the input, used when title generation fails.
pub fn fallback_title(input: &str) -> String {
    input.chars().take(FALLBACK_TITLE_CHARS).collect()
}

/// A session is named on its first message, unless it already has a real
/// title.
fn wants_title(title: &str, message_count: usize) -> bool {
    message_count == 1 && (title.is_empty() || title.starts_with(PLACEHOLDER_TITLE_PREFIX))
}

// ---------------------------------------------------------------------------
// ChatService
// ---------------------------------------------------------------------------

/// One user turn.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatTurn {
    pub session_id: String,
    pub user_input: String,
    #[serde(default)]
    pub model_id: Option<String>,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Result of [`ChatService::send`].
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub session_id: String,
    pub title: String,
    pub reply: String,
    pub usage: Usage,
}

/// Chat over persisted sessions.
#[derive(Clone)]
pub struct ChatService {
    registry: Arc<ProviderRegistry>,
    sessions: SessionStore,
    agents: AgentProfileStore,
    default_model: String,
}

impl ChatService {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        sessions: SessionStore,
        agents: AgentProfileStore,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            sessions,
            agents,
            default_model: default_model.into(),
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    pub fn agents(&self) -> &AgentProfileStore {
        &self.agents
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// The model for `model_id`, or the default model.
    pub async fn resolve_model(&self, model_id: Option<&str>) -> Result<SharedModel> {
        let id = model_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&self.default_model);
        self.registry.get_model_instance(id).await
    }

    /// Run one turn, forwarding reply fragments to `on_text`.
    ///
    /// The session is written only after the reply completes.
    pub async fn send(
        &self,
        turn: ChatTurn,
        on_text: &mut (dyn for<'s> FnMut(&'s str) + Send),
    ) -> Result<ChatOutcome> {
        let model = self.resolve_model(turn.model_id.as_deref()).await?;

        let system_prompt = match turn.agent_id.as_deref().filter(|id| !id.is_empty()) {
            Some(agent_id) => match self.agents.get(agent_id).await? {
                Some(profile) => profile.prompt,
                None => {
                    debug!(agent_id, "agent profile not found, chatting without one");
                    String::new()
                }
            },
            None => String::new(),
        };

        let mut record = self.sessions.load_or_new(&turn.session_id).await?;
        record.messages.push(StoredMessage::user(&turn.user_input));

        if wants_title(&record.title, record.messages.len()) {
            record.title = match generate_title(model.as_ref(), &turn.user_input).await {
                Ok(title) if !title.is_empty() => title,
                Ok(_) => fallback_title(&turn.user_input),
                Err(e) => {
                    warn!(session_id = %turn.session_id, error = %e, "title generation failed");
                    fallback_title(&turn.user_input)
                }
            };
            info!(session_id = %turn.session_id, title = %record.title, "session titled");
        }

        let request = ChatRequest::new(to_model_messages(&system_prompt, &record.messages));
        let completion = model.stream_chat(&request, on_text).await?;
        let reply = completion.as_text().to_string();

        record.messages.push(StoredMessage::assistant(&reply));
        self.sessions.save(&turn.session_id, &record).await?;

        info!(
            session_id = %turn.session_id,
            model_id = model.model_id(),
            messages = record.messages.len(),
            "chat turn saved"
        );
        Ok(ChatOutcome {
            session_id: turn.session_id,
            title: record.title,
            reply,
            usage: completion.usage,
        })
    }
}

// ---------------------------------------------------------------------------
// MemoryChat
// ---------------------------------------------------------------------------

/// A conversation remembered in one JSON file.
pub struct MemoryChat {
    memory: ChatMemory,
    model: SharedModel,
}

impl MemoryChat {
    pub fn new(memory: ChatMemory, model: SharedModel) -> Self {
        Self { memory, model }
    }

    pub fn memory(&self) -> &ChatMemory {
        &self.memory
    }

    /// Load history, append the input, answer, append the answer, save.
    pub async fn chat(&self, user_input: &str) -> Result<String> {
        let mut history = self.memory.load().await;
        history.push(StoredMessage::user(user_input));

        let request = ChatRequest::new(to_model_messages("", &history));
        let reply = self.model.chat(&request).await?.into_text();

        history.push(StoredMessage::assistant(&reply));
        self.memory.save(&history).await?;
        debug!(path = %self.memory.path().display(), messages = history.len(), "memory synced");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[test]
    fn title_cleanup() {
        assert_eq!(clean_title("  \"安装报错\"\n"), "安装报错");
        assert_eq!(clean_title("'退款'"), "退款");
        assert_eq!(clean_title("\"\"双引号\"\""), "\"双引号\"");
        assert_eq!(clean_title("普通标题"), "普通标题");
    }

    #[test]
    fn fallback_counts_chars() {
        let input = "我的软件在安装过程中一直崩溃，提示缺少运行库，应该怎么办呢？";
        assert_eq!(fallback_title(input).chars().count(), 20);
        assert_eq!(fallback_title("short"), "short");
    }

    #[test]
    fn only_first_message_of_placeholder_sessions_is_titled() {
        assert!(wants_title("", 1));
        assert!(wants_title("session-1712", 1));
        assert!(!wants_title("session-1712", 3));
        assert!(!wants_title("安装问题", 1));
    }

    #[tokio::test]
    async fn title_prompt_quotes_input() {
        let model = ScriptedModel::new("m").reply("\"软件崩溃\"");
        let title = generate_title(&model, "软件一打开就崩溃").await.unwrap();
        assert_eq!(title, "软件崩溃");

        let req = &model.requests()[0];
        assert_eq!(req.system_text().as_deref(), Some(TITLE_SYSTEM_PROMPT));
        assert_eq!(req.last_user_text(), Some("用户说: \"软件一打开就崩溃\"\n\n请生成标题:"));
    }

    #[test]
    fn stored_roles_map_to_model_roles() {
        let history = vec![
            StoredMessage::user("hi"),
            StoredMessage::assistant("hello"),
            StoredMessage::new("narrator", "odd"),
        ];
        let messages = to_model_messages("be brief", &history);
        let roles: Vec<Role> = messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
    }
}
