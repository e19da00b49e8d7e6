use crate::error::StoreError;
use crate::traits::ObjectStore;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Process-local object store, used for tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<(), StoreError> {
        if key.is_empty() {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        self.objects.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        Ok(self
            .objects
            .read()
            .await
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn list_is_sorted_and_prefixed() {
        let store = MemoryObjectStore::new();
        store.put("b.meta", vec![1]).await.unwrap();
        store.put("a.vectors", vec![2]).await.unwrap();
        store.put("x/a.meta", vec![3]).await.unwrap();

        assert_eq!(store.list("").await.unwrap(), vec!["a.vectors", "b.meta", "x/a.meta"]);
        assert_eq!(store.list("x/").await.unwrap(), vec!["x/a.meta"]);
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn get_missing_key_fails() {
        let store = MemoryObjectStore::new();
        assert!(store.is_empty().await);
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }
}
