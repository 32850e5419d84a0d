use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::error;

use crate::db::store::{Collection, DocumentStore};
use crate::error::{AppError, StoreError};

/// Typed access to the document store.
///
/// Every mutation goes through [`DbOperations::update`], which holds the
/// collection's lock across the whole load → mutate → save sequence so
/// concurrent writers to the same collection cannot lose each other's
/// updates. Plain reads take no lock.
#[derive(Clone)]
pub struct DbOperations {
    store: Arc<dyn DocumentStore>,
    locks: Arc<HashMap<Collection, Mutex<()>>>,
}

impl DbOperations {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        let locks = Collection::ALL
            .into_iter()
            .map(|collection| (collection, Mutex::new(())))
            .collect();

        Self {
            store,
            locks: Arc::new(locks),
        }
    }

    /// Loads and decodes a whole collection.
    pub async fn read<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>, StoreError> {
        let document = self.store.load(collection).await?;
        decode(collection, document)
    }

    /// Read-modify-write of a whole collection under its lock.
    ///
    /// The document is only written back when `mutate` succeeds.
    pub async fn update<T, R, F>(&self, collection: Collection, mutate: F) -> Result<R, AppError>
    where
        T: DeserializeOwned + Serialize,
        F: FnOnce(&mut Vec<T>) -> Result<R, AppError>,
    {
        let _guard = match self.locks.get(&collection) {
            Some(lock) => lock.lock().await,
            None => return Err(AppError::InternalError(format!("no lock for {}", collection.name()))),
        };

        let mut items: Vec<T> = self.read(collection).await?;
        let result = mutate(&mut items)?;

        let document = serde_json::to_value(&items).map_err(|source| StoreError::Serialization {
            collection: collection.name(),
            source,
        })?;

        if let Err(e) = self.store.save(collection, &document).await {
            error!("Failed to persist collection {}: {}", collection.name(), e);
            return Err(e.into());
        }

        Ok(result)
    }
}

fn decode<T: DeserializeOwned>(collection: Collection, document: Value) -> Result<Vec<T>, StoreError> {
    // A document that was written as an empty object decodes as an empty collection.
    if document.is_null() || document.as_object().is_some_and(|o| o.is_empty()) {
        return Ok(Vec::new());
    }

    serde_json::from_value(document).map_err(|source| StoreError::Serialization {
        collection: collection.name(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::{MemoryStore, MockDocumentStore};
    use serde_json::json;

    #[tokio::test]
    async fn test_update_persists_whole_collection() {
        let db = DbOperations::new(Arc::new(MemoryStore::new()));

        db.update(Collection::Users, |items: &mut Vec<String>| {
            items.push("a".to_string());
            Ok(())
        })
        .await
        .unwrap();
        db.update(Collection::Users, |items: &mut Vec<String>| {
            items.push("b".to_string());
            Ok(())
        })
        .await
        .unwrap();

        let items: Vec<String> = db.read(Collection::Users).await.unwrap();
        assert_eq!(items, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_failed_mutation_is_not_written() {
        let db = DbOperations::new(Arc::new(MemoryStore::new()));

        let result = db
            .update(Collection::Users, |items: &mut Vec<String>| {
                items.push("discarded".to_string());
                Err::<(), _>(AppError::ValidationError("nope".into()))
            })
            .await;

        assert!(matches!(result, Err(AppError::ValidationError(_))));
        let items: Vec<String> = db.read(Collection::Users).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_updates_do_not_lose_writes() {
        let db = DbOperations::new(Arc::new(MemoryStore::new()));

        let mut handles = Vec::new();
        for i in 0..25 {
            let db = db.clone();
            handles.push(tokio::spawn(async move {
                db.update(Collection::ChatRooms, |items: &mut Vec<u32>| {
                    items.push(i);
                    Ok(())
                })
                .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let items: Vec<u32> = db.read(Collection::ChatRooms).await.unwrap();
        assert_eq!(items.len(), 25);
    }

    #[tokio::test]
    async fn test_empty_object_document_reads_as_empty() {
        let store = MemoryStore::new();
        store.save(Collection::Sessions, &json!({})).await.unwrap();
        let db = DbOperations::new(Arc::new(store));

        let items: Vec<String> = db.read(Collection::Sessions).await.unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_save_failure_is_propagated() {
        let mut store = MockDocumentStore::new();
        store.expect_load().returning(|_| Ok(json!([])));
        store.expect_save().returning(|collection, _| {
            Err(StoreError::Io {
                collection: collection.name(),
                source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
            })
        });
        let db = DbOperations::new(Arc::new(store));

        let result = db
            .update(Collection::Users, |items: &mut Vec<String>| {
                items.push("x".into());
                Ok(())
            })
            .await;

        assert!(matches!(result, Err(AppError::StoreError(StoreError::Io { .. }))));
    }
}
