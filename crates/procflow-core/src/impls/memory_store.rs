//! MemoryStore: a RecordStore that lives only as long as the process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::ports::{ChangeSet, EntityRecords, RecordStore};
use crate::store::StoreError;

#[derive(Default)]
pub struct MemoryStore {
    entities: RwLock<BTreeMap<String, EntityRecords>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn describe(&self) -> String {
        "in-memory".to_string()
    }

    async fn fetch(&self, entity: &str) -> Result<EntityRecords, StoreError> {
        Ok(self.entities.read().get(entity).cloned().unwrap_or_default())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        changes.apply_to(&mut self.entities.write());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn commit_upserts_by_identity() {
        let store = MemoryStore::new();
        let mut changes = ChangeSet::new();
        changes.insert("item", "a-1", json!({"name": "Foo"}));
        changes.insert("item", "b-2", json!({"name": "Bar"}));
        store.commit(changes).await.unwrap();

        let mut changes = ChangeSet::new();
        changes.insert("item", "a-1", json!({"name": "Foo v2"}));
        store.commit(changes).await.unwrap();

        let records = store.fetch("item").await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records["a-1"], json!({"name": "Foo v2"}));
        assert!(store.fetch("other").await.unwrap().is_empty());
    }
}
