//! JSON array files on disk
//!
//! Every artifact this crate persists (final output, discard ledger, failed
//! batches, residual records, dispatch log) is a pretty-printed JSON array.
//! Writes go to a temporary sibling first and are renamed into place so a
//! crash never leaves a half-written artifact behind.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn serialization(path: &Path, source: serde_json::Error) -> Self {
        Self::Serialization {
            path: path.to_path_buf(),
            source,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Write `items` as a JSON array, creating parent directories as needed
pub async fn write_json_array<T: Serialize>(path: &Path, items: &[T]) -> StoreResult<()> {
    write_json(path, &items).await
}

/// Write any serializable value as pretty JSON through a temporary file
pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> StoreResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| StoreError::io(parent, e))?;
    }

    let content = serde_json::to_vec_pretty(value).map_err(|e| StoreError::serialization(path, e))?;

    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, content)
        .await
        .map_err(|e| StoreError::io(&tmp_path, e))?;
    fs::rename(&tmp_path, path)
        .await
        .map_err(|e| StoreError::io(path, e))?;

    Ok(())
}

/// Read and deserialize a JSON file
pub async fn read_json<T: DeserializeOwned>(path: &Path) -> StoreResult<T> {
    let content = fs::read(path).await.map_err(|e| StoreError::io(path, e))?;
    serde_json::from_slice(&content).map_err(|e| StoreError::serialization(path, e))
}

/// List `*.json` files directly inside `dir`, sorted by name.
///
/// A missing directory is treated as empty and is not created.
pub async fn list_json_files(dir: &Path) -> StoreResult<Vec<PathBuf>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StoreError::io(dir, e)),
    };

    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(|e| StoreError::io(dir, e))? {
        let path = entry.path();
        let is_file = entry
            .file_type()
            .await
            .map_err(|e| StoreError::io(&path, e))?
            .is_file();
        if is_file && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    #[tokio::test]
    async fn writes_and_reads_back_arrays() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/out.json");

        write_json_array(&path, &[json!({"a": 1}), json!({"a": 2})]).await.unwrap();
        let back: Vec<Value> = read_json(&path).await.unwrap();

        assert_eq!(back.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing_and_is_not_created() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        assert!(list_json_files(&missing).await.unwrap().is_empty());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn lists_only_json_files_sorted() {
        let dir = TempDir::new().unwrap();
        for name in ["b.json", "a.json", "notes.txt"] {
            tokio::fs::write(dir.path().join(name), "[]").await.unwrap();
        }
        tokio::fs::create_dir(dir.path().join("sub.json")).await.unwrap();

        let names: Vec<_> = list_json_files(dir.path())
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json"]);
    }

    #[tokio::test]
    async fn invalid_json_is_reported_with_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        tokio::fs::write(&path, "[{").await.unwrap();

        let err = read_json::<Vec<Value>>(&path).await.unwrap_err();
        assert!(matches!(err, StoreError::Serialization { .. }));
        assert!(err.to_string().contains("broken.json"));
    }
}
