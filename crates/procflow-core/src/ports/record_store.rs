//! RecordStore port: the persistence backend behind a `StoreHandle`.
//!
//! Records are JSON values grouped by entity name and keyed by identity.
//! Writing a record whose identity already exists replaces it.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

use crate::store::StoreError;

pub type Record = serde_json::Value;

/// Records of one entity, keyed by identity.
pub type EntityRecords = BTreeMap<String, Record>;

/// A batch of staged writes, applied atomically by `RecordStore::commit`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    inserts: Vec<(String, String, Record)>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: impl Into<String>, identity: impl Into<String>, record: Record) {
        self.inserts.push((entity.into(), identity.into(), record));
    }

    pub fn len(&self) -> usize {
        self.inserts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
    }

    /// Apply to an in-memory image. Later inserts of the same identity win.
    pub fn apply_to(self, entities: &mut BTreeMap<String, EntityRecords>) {
        for (entity, identity, record) in self.inserts {
            entities.entry(entity).or_default().insert(identity, record);
        }
    }
}

/// A persistence backend.
///
/// # Contract
/// - `commit` is all-or-nothing: on error none of the changes are visible.
/// - Reads only see committed changes.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Short human-readable description, for logs.
    fn describe(&self) -> String;

    async fn fetch(&self, entity: &str) -> Result<EntityRecords, StoreError>;

    async fn identities(&self, entity: &str) -> Result<HashSet<String>, StoreError> {
        Ok(self.fetch(entity).await?.into_keys().collect())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError>;
}
