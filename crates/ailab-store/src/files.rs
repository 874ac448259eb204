//! Small async helpers shared by the directory-backed stores.
//!
//! Every record lives in `<dir>/<id>.json`.  Ids come from HTTP paths and CLI
//! arguments, so they are checked before being joined onto the directory.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{StoreError, StoreResult};

/// File extension used for every stored record.
pub(crate) const JSON_EXT: &str = "json";

/// Reject ids that would escape the store directory or name no file.
pub(crate) fn validate_id(id: &str) -> StoreResult<()> {
    if id.trim().is_empty() {
        return Err(StoreError::InvalidArgument("id must not be empty".into()));
    }
    if id.contains('/') || id.contains('\\') || id.contains("..") || id.contains('\0') {
        return Err(StoreError::InvalidArgument(format!(
            "id `{id}` contains forbidden characters"
        )));
    }
    Ok(())
}

/// Path of the record file for `id` inside `dir`.
pub(crate) fn record_path(dir: &Path, id: &str) -> StoreResult<PathBuf> {
    validate_id(id)?;
    Ok(dir.join(format!("{id}.{JSON_EXT}")))
}

/// Read a file into a string, returning `None` when it does not exist.
pub(crate) async fn read_optional(path: &Path) -> StoreResult<Option<String>> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::io(path, e)),
    }
}

/// Serialize `value` as pretty JSON and write it, creating parent
/// directories as needed.
pub(crate) async fn write_pretty<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }
    let body = serde_json::to_string_pretty(value)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| StoreError::io(path, e))
}

/// Parse JSON text, tagging failures with the entity and path.
pub(crate) fn parse<T: DeserializeOwned>(
    entity: &'static str,
    path: &Path,
    text: &str,
) -> StoreResult<T> {
    serde_json::from_str(text).map_err(|e| StoreError::Corrupt {
        entity,
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// Remove a record file; `NotFound` when it does not exist.
pub(crate) async fn remove(entity: &'static str, dir: &Path, id: &str) -> StoreResult<()> {
    let path = record_path(dir, id)?;
    match tokio::fs::remove_file(&path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound {
            entity,
            id: id.to_string(),
        }),
        Err(e) => Err(StoreError::io(&path, e)),
    }
}

/// List `(id, path)` for every `*.json` file in `dir`, sorted by id.
///
/// A missing directory is treated as empty.
pub(crate) async fn list_records(dir: &Path) -> StoreResult<Vec<(String, PathBuf)>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StoreError::io(dir, e))?
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(JSON_EXT) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            records.push((stem.to_string(), path));
        }
    }

    records.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_traversal_ids() {
        assert!(validate_id("../etc/passwd").is_err());
        assert!(validate_id("a/b").is_err());
        assert!(validate_id("a\\b").is_err());
        assert!(validate_id("  ").is_err());
        assert!(validate_id("session-1712").is_ok());
        assert!(validate_id("会话一").is_ok());
    }

    #[tokio::test]
    async fn list_skips_non_json_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.json"), "[]").await.unwrap();
        tokio::fs::write(dir.path().join("a.json"), "[]").await.unwrap();
        tokio::fs::write(dir.path().join("notes.txt"), "x").await.unwrap();

        let ids: Vec<String> = list_records(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn list_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let records = list_records(&dir.path().join("nope")).await.unwrap();
        assert!(records.is_empty());
    }
}
