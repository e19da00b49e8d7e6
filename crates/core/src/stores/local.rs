use crate::error::StoreError;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const PARTIAL_MARKER: &str = ".partial-";

/// A directory used as an object bucket. Keys map to relative paths; `/` in
/// a key creates sub-directories.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && !key.contains(PARTIAL_MARKER)
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));

        if !is_plain {
            return Err(StoreError::InvalidKey(key.to_string()));
        }

        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Readers never observe a half-written object: write aside, then rename.
        let partial = path.with_file_name(format!(
            "{}{}{}",
            path.file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default(),
            PARTIAL_MARKER,
            uuid::Uuid::new_v4()
        ));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &path).await?;

        debug!(key, bytes = bytes.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(key.to_string()))
            }
            Err(error) => Err(StoreError::Io(error)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let root = self.root.clone();
        let prefix = prefix.to_string();

        let keys = tokio::task::spawn_blocking(move || {
            if !root.exists() {
                return Vec::new();
            }

            let mut keys = Vec::new();
            for entry in WalkDir::new(&root).into_iter().filter_map(|item| item.ok()) {
                if !entry.file_type().is_file() {
                    continue;
                }
                let Ok(relative) = entry.path().strip_prefix(&root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .filter_map(|component| component.as_os_str().to_str())
                    .collect::<Vec<_>>()
                    .join("/");

                if key.starts_with(&prefix) && !key.contains(PARTIAL_MARKER) {
                    keys.push(key);
                }
            }
            keys.sort_unstable();
            keys
        })
        .await
        .map_err(|error| StoreError::Io(io::Error::other(error.to_string())))?;

        Ok(keys)
    }
}
