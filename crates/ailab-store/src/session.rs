//! File-backed conversation sessions.
//!
//! Each session is one JSON file in the sessions directory, named after the
//! session id.  Two on-disk layouts are accepted:
//!
//! - the current object layout `{"title": "...", "messages": [...]}`;
//! - the legacy layout, a bare array of messages with no title.
//!
//! Writes always use the object layout, so a legacy file is upgraded the
//! first time it is saved.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::error::StoreResult;
use crate::files;

const ENTITY: &str = "session";

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A single chat message as persisted on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// `"system"`, `"user"`, `"assistant"` or `"tool"`.
    pub role: String,
    /// Plain-text content.
    #[serde(default)]
    pub content: String,
    /// Any other fields written by other clients, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StoredMessage {
    /// Build a message with the given role and content.
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    /// Shorthand for a `user` message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Shorthand for an `assistant` message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new("assistant", content)
    }
}

/// The full content of a session file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Display title; the session id when none was generated.
    #[serde(default)]
    pub title: String,
    /// Ordered message history.
    #[serde(default)]
    pub messages: Vec<StoredMessage>,
}

impl SessionRecord {
    /// A fresh, empty session whose title is its id.
    pub fn new(id: &str) -> Self {
        Self {
            title: id.to_string(),
            messages: Vec::new(),
        }
    }
}

/// Listing entry returned by [`SessionStore::list`] and
/// [`SessionStore::search`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub title: String,
}

/// Both on-disk layouts.
#[derive(Deserialize)]
#[serde(untagged)]
enum SessionFile {
    Legacy(Vec<StoredMessage>),
    Current {
        #[serde(default)]
        title: Option<String>,
        #[serde(default)]
        messages: Vec<StoredMessage>,
    },
}

impl SessionFile {
    fn into_record(self, id: &str) -> SessionRecord {
        match self {
            Self::Legacy(messages) => SessionRecord {
                title: id.to_string(),
                messages,
            },
            Self::Current { title, messages } => SessionRecord {
                title: title.filter(|t| !t.is_empty()).unwrap_or_else(|| id.to_string()),
                messages,
            },
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  SessionStore
// ═══════════════════════════════════════════════════════════════════════

/// Directory of session files.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    /// Create a store rooted at `dir`.  The directory is created lazily on
    /// the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The directory holding the session files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// List every session as `{id, title}`, sorted by id.
    #[instrument(skip(self))]
    pub async fn list(&self) -> StoreResult<Vec<SessionSummary>> {
        let mut sessions = Vec::new();
        for (id, path) in files::list_records(&self.dir).await? {
            let Some(text) = files::read_optional(&path).await? else {
                continue;
            };
            let record = parse_session(&id, &path, &text)?;
            sessions.push(SessionSummary {
                id,
                title: record.title,
            });
        }
        debug!(count = sessions.len(), "sessions listed");
        Ok(sessions)
    }

    /// Load a session, or `None` when it does not exist.
    #[instrument(skip(self))]
    pub async fn load(&self, id: &str) -> StoreResult<Option<SessionRecord>> {
        let path = files::record_path(&self.dir, id)?;
        match files::read_optional(&path).await? {
            Some(text) => parse_session(id, &path, &text).map(Some),
            None => Ok(None),
        }
    }

    /// Load a session, or a fresh record titled with the id.
    pub async fn load_or_new(&self, id: &str) -> StoreResult<SessionRecord> {
        Ok(self
            .load(id)
            .await?
            .unwrap_or_else(|| SessionRecord::new(id)))
    }

    /// Message history of a session; empty when the session does not exist.
    pub async fn messages(&self, id: &str) -> StoreResult<Vec<StoredMessage>> {
        Ok(self
            .load(id)
            .await?
            .map(|record| record.messages)
            .unwrap_or_default())
    }

    /// Write a session using the object layout.
    #[instrument(skip(self, record), fields(messages = record.messages.len()))]
    pub async fn save(&self, id: &str, record: &SessionRecord) -> StoreResult<()> {
        let path = files::record_path(&self.dir, id)?;
        files::write_pretty(&path, record).await?;
        debug!(session_id = %id, "session saved");
        Ok(())
    }

    /// Delete a session file.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        files::remove(ENTITY, &self.dir, id).await?;
        debug!(session_id = %id, "session deleted");
        Ok(())
    }

    /// Case-insensitive full-text search over the raw session files.
    ///
    /// An empty query matches nothing.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> StoreResult<Vec<SessionSummary>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = Vec::new();
        for (id, path) in files::list_records(&self.dir).await? {
            let Some(text) = files::read_optional(&path).await? else {
                continue;
            };
            if !text.to_lowercase().contains(&needle) {
                continue;
            }
            let record = parse_session(&id, &path, &text)?;
            hits.push(SessionSummary {
                id,
                title: record.title,
            });
        }
        debug!(query = %query, hits = hits.len(), "session search");
        Ok(hits)
    }
}

fn parse_session(id: &str, path: &Path, text: &str) -> StoreResult<SessionRecord> {
    let file: SessionFile = files::parse(ENTITY, path, text)?;
    Ok(file.into_record(id))
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════
