//! Single-file conversation memory.
//!
//! The whole history is one JSON array on disk.  It is read at the start of
//! every turn and rewritten at the end, so the model sees every earlier
//! exchange across process restarts.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::files;
use crate::session::StoredMessage;

/// Persistent message history backed by one JSON file.
#[derive(Debug, Clone)]
pub struct ChatMemory {
    path: PathBuf,
}

impl ChatMemory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the history.
    ///
    /// A missing file is an empty history.  An unreadable or corrupt file is
    /// logged and also treated as empty so a bad file never blocks a chat.
    pub async fn load(&self) -> Vec<StoredMessage> {
        let text = match files::read_optional(&self.path).await {
            Ok(Some(text)) => text,
            Ok(None) => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "failed to read chat memory");
                return Vec::new();
            }
        };

        match serde_json::from_str(&text) {
            Ok(messages) => messages,
            Err(err) => {
                warn!(path = %self.path.display(), %err, "chat memory is corrupt, starting fresh");
                Vec::new()
            }
        }
    }

    /// Overwrite the history.
    pub async fn save(&self, messages: &[StoredMessage]) -> StoreResult<()> {
        files::write_pretty(&self.path, messages).await?;
        debug!(path = %self.path.display(), count = messages.len(), "chat memory saved");
        Ok(())
    }

    /// Append messages and persist.  Returns the new history length.
    pub async fn append(&self, new_messages: &[StoredMessage]) -> StoreResult<usize> {
        let mut messages = self.load().await;
        messages.extend_from_slice(new_messages);
        self.save(&messages).await?;
        Ok(messages.len())
    }

    /// Delete the memory file.  Clearing an empty memory is not an error.
    pub async fn clear(&self) -> StoreResult<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::Io {
                path: self.path.display().to_string(),
                source: e,
            }),
        }
    }
}
