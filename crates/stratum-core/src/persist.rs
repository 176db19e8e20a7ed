//! Whole-file JSON persistence
//!
//! State is never patched in place. Every save serializes the full document
//! to a sibling temp file and renames it over the target, so a crash leaves
//! either the old or the new document on disk.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::Result;

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `content` to `path` via temp file + rename
pub async fn write_atomic(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let tmp = temp_path(path);
    tokio::fs::write(&tmp, content).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

/// Serialize `value` as pretty JSON and write it atomically
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, &json).await
}

/// Load a JSON document, returning `None` if the file does not exist
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/state.json");

        save_json(&path, &vec![1, 2, 3]).await.unwrap();
        let loaded: Option<Vec<i32>> = load_json(&path).await.unwrap();
        assert_eq!(loaded, Some(vec![1, 2, 3]));
        assert!(!temp_path(&path).exists());
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let loaded: Option<Vec<i32>> = load_json(&dir.path().join("absent.json")).await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_overwrite_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        save_json(&path, &"a").await.unwrap();
        save_json(&path, &"b").await.unwrap();
        save_json(&path, &"b").await.unwrap();
        let loaded: Option<String> = load_json(&path).await.unwrap();
        assert_eq!(loaded.as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn test_corrupt_json_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{not json").await.unwrap();
        let loaded: Result<Option<Vec<i32>>> = load_json(&path).await;
        assert!(loaded.is_err());
    }
}
