//! Local filesystem index store.
//!
//! The index is a single pretty-printed JSON document, written atomically
//! (temp file, then rename) so an interrupted run never leaves a truncated
//! index behind.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::models::{Config, Tree};
use crate::storage::IndexStore;

/// Index stored as one JSON file.
#[derive(Debug, Clone)]
pub struct LocalIndexStore {
    path: PathBuf,
}

impl LocalIndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the configured `<cache>/<source>_<distro>_index.json`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.index_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, bytes: &[u8]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read bytes, returning None if the file doesn't exist.
    async fn read_bytes(&self) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

fn ignore_unreadable(path: &Path, error: impl std::fmt::Display) -> Option<Tree> {
    log::warn!("Ignoring unreadable index {}: {}", path.display(), error);
    None
}

#[async_trait]
impl IndexStore for LocalIndexStore {
    async fn load(&self) -> Result<Option<Tree>> {
        let bytes = match self.read_bytes().await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                log::info!("No previous index at {}", self.path.display());
                return Ok(None);
            }
            Err(e) => return Ok(ignore_unreadable(&self.path, e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(tree) => Ok(Some(tree)),
            Err(e) => Ok(ignore_unreadable(&self.path, e)),
        }
    }

    async fn save(&self, tree: &Tree) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(tree)?;
        self.write_bytes(&bytes).await?;
        log::info!("Index written to {}", self.path.display());
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::models::FileEntry;

    fn sample_tree() -> Tree {
        let mut tree = Tree::new();
        tree.insert_files(&[], vec![FileEntry::new("http://h/r/a.txt", "10")])
            .unwrap();
        tree.insert_files(
            &["sub".to_string()],
            vec![FileEntry::new("http://h/r/sub/b.bin", "20").with_timestamp("2026-10-01 12:00")],
        )
        .unwrap();
        tree.node_mut(&["empty".to_string()]).unwrap();
        tree
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = LocalIndexStore::new(tmp.path().join("cache/index.json"));

        let tree = sample_tree();
        store.save(&tree).await.unwrap();
        let loaded = store.load().await.unwrap().unwrap();
        assert_eq!(loaded, tree);
        assert!(!tmp.path().join("cache/index.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_index_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = LocalIndexStore::new(tmp.path().join("index.json"));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_index_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::write(&path, b"{\"files\": [oops").unwrap();
        let store = LocalIndexStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_in_place_of_index_is_none() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");
        std::fs::create_dir(&path).unwrap();
        let store = LocalIndexStore::new(&path);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_serialized_shape() {
        let tmp = TempDir::new().unwrap();
        let store = LocalIndexStore::new(tmp.path().join("index.json"));
        store.save(&sample_tree()).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(store.path()).unwrap()).unwrap();
        assert_eq!(raw["files"][0]["url"], "http://h/r/a.txt");
        assert_eq!(raw["sub"]["files"][0]["timestamp"], "2026-10-01 12:00");
        assert_eq!(raw["empty"], serde_json::json!({}));
    }
}
