//! Shared execution state for multi-step agent runs.
//!
//! Tools and the caller hold clones of the same [`ExecutionState`]; every
//! `set` and `log` lands in one timestamped history, which the caller reads
//! back as a [`StateSummary`] once the run is over.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One history line.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateEntry {
    pub timestamp: DateTime<Utc>,
    /// Milliseconds since the state was created.
    pub elapsed_ms: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Snapshot returned by [`ExecutionState::summary`].
#[derive(Debug, Clone, Serialize)]
pub struct StateSummary {
    pub total_steps: usize,
    pub duration_ms: u64,
    pub state: BTreeMap<String, Value>,
    pub history: Vec<StateEntry>,
}

#[derive(Debug)]
struct Inner {
    started: Instant,
    values: BTreeMap<String, Value>,
    history: Vec<StateEntry>,
}

/// Thread-safe key/value store with an audit trail.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    inner: Arc<Mutex<Inner>>,
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                started: Instant::now(),
                values: BTreeMap::new(),
                history: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic while holding the lock leaves plain data behind; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store a value and record the update in the history.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        let mut inner = self.lock();
        push_entry(&mut inner, format!("state updated: {key}"), Some(value.clone()));
        inner.values.insert(key, value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.lock().values.get(key).cloned()
    }

    /// Append a free-form history entry.
    pub fn log(&self, message: impl Into<String>, data: Option<Value>) {
        let mut inner = self.lock();
        push_entry(&mut inner, message.into(), data);
    }

    pub fn history(&self) -> Vec<StateEntry> {
        self.lock().history.clone()
    }

    pub fn summary(&self) -> StateSummary {
        let inner = self.lock();
        StateSummary {
            total_steps: inner.history.len(),
            duration_ms: inner.started.elapsed().as_millis() as u64,
            state: inner.values.clone(),
            history: inner.history.clone(),
        }
    }
}

fn push_entry(inner: &mut Inner, message: String, data: Option<Value>) {
    let elapsed_ms = inner.started.elapsed().as_millis() as u64;
    debug!(elapsed_ms, message = %message, "execution state");
    inner.history.push(StateEntry {
        timestamp: Utc::now(),
        elapsed_ms,
        message,
        data,
    });
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn set_records_history() {
        let state = ExecutionState::new();
        state.set("location", json!("Shanghai"));
        state.log("fetching weather", None);
        state.set("location", json!("Beijing"));

        assert_eq!(state.get("location"), Some(json!("Beijing")));
        assert_eq!(state.get("missing"), None);

        let history = state.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].message, "state updated: location");
        assert_eq!(history[0].data, Some(json!("Shanghai")));
        assert_eq!(history[1].data, None);
        assert!(history[2].elapsed_ms >= history[0].elapsed_ms);
    }

    #[test]
    fn clones_share_state() {
        let state = ExecutionState::new();
        let tool_view = state.clone();
        tool_view.set("rate", json!(7.2));

        let summary = state.summary();
        assert_eq!(summary.total_steps, 1);
        assert_eq!(summary.state.get("rate"), Some(&json!(7.2)));
    }

    #[test]
    fn summary_serializes() {
        let state = ExecutionState::new();
        state.log("start", Some(json!({"step": 1})));
        let value = serde_json::to_value(state.summary()).unwrap();
        assert_eq!(value["history"][0]["message"], "start");
        assert_eq!(value["history"][0]["data"]["step"], 1);
    }
}
