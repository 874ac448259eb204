//! # ailab-store
//!
//! File-backed persistence for ailab.
//!
//! Everything lives as pretty-printed JSON under the configured data
//! directory, one file per record, so the data can be inspected and edited
//! by hand.  A generic `moka` cache sits next to the stores for values that
//! are expensive to recompute, such as embeddings.
//!
//! ## Layout
//!
//! ```text
//! data/
//! ├── sessions/<id>.json     SessionStore      {title, messages}
//! ├── agents/<id>.json       AgentProfileStore {id, name, prompt, ...}
//! └── chat_memory.json       ChatMemory        [messages]
//!
//! CacheLayer<T>  (moka, in-process only)
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use ailab_store::{SessionStore, StoredMessage};
//!
//! let sessions = SessionStore::new("data/sessions");
//! let mut record = sessions.load_or_new("session-1").await?;
//! record.messages.push(StoredMessage::user("hello"));
//! sessions.save("session-1", &record).await?;
//! ```

pub mod agents;
pub mod cache;
pub mod error;
mod files;
pub mod memory;
pub mod session;

// ── re-exports ───────────────────────────────────────────────────────

pub use agents::{AgentDraft, AgentProfile, AgentProfileStore};
pub use cache::{CacheLayer, CacheLayerBuilder, CacheStats};
pub use error::{StoreError, StoreResult};
pub use memory::ChatMemory;
pub use session::{SessionRecord, SessionStore, SessionSummary, StoredMessage};
