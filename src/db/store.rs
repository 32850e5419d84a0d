use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;

/// The three independently persisted collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Users,
    Sessions,
    ChatRooms,
}

impl Collection {
    pub const ALL: [Collection; 3] = [Collection::Users, Collection::Sessions, Collection::ChatRooms];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Users => "users",
            Collection::Sessions => "sessions",
            Collection::ChatRooms => "chats",
        }
    }

    fn file_name(self) -> &'static str {
        match self {
            Collection::Users => "db_auth.json",
            Collection::Sessions => "db_sessions.json",
            Collection::ChatRooms => "db_chats.json",
        }
    }
}

/// Whole-collection document storage.
///
/// `load` returns the full document for a collection and `save` replaces it.
/// There are no partial updates; callers read, mutate in memory and write
/// the whole document back. A collection that was never saved loads as an
/// empty JSON array.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, collection: Collection) -> Result<Value, StoreError>;
    async fn save(&self, collection: Collection, document: &Value) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per collection inside `data_dir`.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    data_dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self { data_dir: data_dir.into() }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn path(&self, collection: Collection) -> PathBuf {
        self.data_dir.join(collection.file_name())
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn load(&self, collection: Collection) -> Result<Value, StoreError> {
        let path = self.path(collection);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(source) => {
                return Err(StoreError::Io { collection: collection.name(), source });
            }
        };

        if raw.trim().is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        serde_json::from_str(&raw).map_err(|source| StoreError::Serialization {
            collection: collection.name(),
            source,
        })
    }

    async fn save(&self, collection: Collection, document: &Value) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { collection: collection.name(), source };

        tokio::fs::create_dir_all(&self.data_dir).await.map_err(io_err)?;

        let data = serde_json::to_string_pretty(document).map_err(|source| {
            StoreError::Serialization { collection: collection.name(), source }
        })?;

        let path = self.path(collection);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, data).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;

        debug!("Wrote collection {} to {}", collection.name(), path.display());
        Ok(())
    }
}

/// Process-local backend, used by tests and `storage.backend = "memory"`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Collection, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, collection: Collection) -> Result<Value, StoreError> {
        Ok(self
            .documents
            .read()
            .await
            .get(&collection)
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new())))
    }

    async fn save(&self, collection: Collection, document: &Value) -> Result<(), StoreError> {
        self.documents.write().await.insert(collection, document.clone());
        Ok(())
    }
}
