use crate::infrastructure::error::EngineError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Blob storage for completion photos. Keys look like
/// `{user_id}/{task_id}-completion-{timestamp}.{extension}`.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, EngineError>;
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, EngineError> {
        let key = path.trim_matches('/');
        if key.is_empty() {
            return Err(EngineError::Upload(
                "object path must not be empty".to_string(),
            ));
        }
        if key.split('/').any(|segment| segment == "..") {
            return Err(EngineError::Upload(format!(
                "object path must not traverse upwards: {path}"
            )));
        }

        let target = self.root.join(key);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| EngineError::Upload(format!("create {key} parent: {error}")))?;
        }
        std::fs::write(&target, bytes)
            .map_err(|error| EngineError::Upload(format!("write {key}: {error}")))?;
        Ok(key.to_string())
    }
}

#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl InMemoryObjectStore {
    pub fn get(&self, path: &str) -> Option<Vec<u8>> {
        self.objects
            .lock()
            .ok()
            .and_then(|objects| objects.get(path).cloned())
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String, EngineError> {
        let mut objects = self.objects.lock().map_err(|error| {
            EngineError::Upload(format!("object store lock poisoned: {error}"))
        })?;
        objects.insert(path.to_string(), bytes.to_vec());
        Ok(path.to_string())
    }
}
