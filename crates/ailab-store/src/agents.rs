//! Agent profiles: named system prompts stored one JSON file per agent.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{StoreError, StoreResult};
use crate::files;

const ENTITY: &str = "agent";

/// A reusable assistant persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    /// System prompt prepended to every conversation using this agent.
    pub prompt: String,
    /// Preferred registry model id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Tool names this agent may call.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enabled_tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Input for [`AgentProfileStore::save`].  A missing id creates a new
/// profile named `agent-<unix millis>`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AgentDraft {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub enabled_tools: Vec<String>,
}

/// Directory of agent profile files.
#[derive(Debug, Clone)]
pub struct AgentProfileStore {
    dir: PathBuf,
}

impl AgentProfileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All profiles, sorted by id.
    #[instrument(skip(self))]
    pub async fn list(&self) -> StoreResult<Vec<AgentProfile>> {
        let mut profiles = Vec::new();
        for (_, path) in files::list_records(&self.dir).await? {
            if let Some(text) = files::read_optional(&path).await? {
                profiles.push(files::parse(ENTITY, &path, &text)?);
            }
        }
        Ok(profiles)
    }

    /// Fetch one profile, or `None` when it does not exist.
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> StoreResult<Option<AgentProfile>> {
        let path = files::record_path(&self.dir, id)?;
        match files::read_optional(&path).await? {
            Some(text) => files::parse(ENTITY, &path, &text).map(Some),
            None => Ok(None),
        }
    }

    /// Create or replace a profile.
    ///
    /// `name` and `prompt` are required.  When the profile already exists its
    /// `created_at` is kept and `updated_at` is refreshed.
    #[instrument(skip(self, draft), fields(name = %draft.name))]
    pub async fn save(&self, draft: AgentDraft) -> StoreResult<AgentProfile> {
        if draft.name.trim().is_empty() || draft.prompt.trim().is_empty() {
            return Err(StoreError::InvalidArgument(
                "Name and Prompt are required".into(),
            ));
        }

        let now = Utc::now();
        let id = draft
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("agent-{}", now.timestamp_millis()));

        let created_at = match self.get(&id).await? {
            Some(existing) => existing.created_at.or(Some(now)),
            None => Some(now),
        };

        let profile = AgentProfile {
            id: id.clone(),
            name: draft.name,
            prompt: draft.prompt,
            model: draft.model,
            enabled_tools: draft.enabled_tools,
            created_at,
            updated_at: Some(now),
        };

        let path = files::record_path(&self.dir, &id)?;
        files::write_pretty(&path, &profile).await?;
        debug!(agent_id = %id, "agent profile saved");
        Ok(profile)
    }

    /// Delete a profile.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> StoreResult<()> {
        files::remove(ENTITY, &self.dir, id).await?;
        debug!(agent_id = %id, "agent profile deleted");
        Ok(())
    }
}
