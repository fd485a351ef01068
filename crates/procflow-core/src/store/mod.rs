//! Store adapter: procedures that load a record store, insert a batch of
//! domain items into it and filter out items it already holds.
//!
//! The store itself is a collaborator behind the `RecordStore` port; this
//! module only knows how to open one from a `StoreConfig` and how to move
//! typed entities in and out of it.

mod config;
mod fetch;
mod filter;
mod insert;
mod load;

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

pub use config::{StorageDescriptor, StoreConfig, StoreSchema};
pub use fetch::FetchRecords;
pub use filter::FilterExisting;
pub use insert::InsertItems;
pub use load::LoadStore;

use crate::impls::{FileStore, MemoryStore};
use crate::ports::{ChangeSet, EntityRecords, RecordStore};
use crate::procedure::Mappable;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("save failed: {0}")]
    SaveFailed(String),

    #[error("entity `{0}` is not part of the store schema")]
    UnknownEntity(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("codec error: {0}")]
    Codec(String),
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Codec(err.to_string())
    }
}

/// Something with a stable string identity.
pub trait Identifiable {
    fn identity(&self) -> String;
}

/// A record type stored under the entity name `ENTITY`.
pub trait Entity:
    Identifiable + Serialize + DeserializeOwned + Clone + Send + Sync + 'static
{
    const ENTITY: &'static str;
}

/// Open the store described by `config`.
///
/// Every descriptor becomes one backend. Writes go to the first one; reads
/// merge all of them, earlier descriptors winning on identity clashes.
pub async fn open(config: &StoreConfig) -> Result<StoreHandle, StoreError> {
    if config.descriptors.is_empty() {
        return Err(StoreError::Unavailable(format!(
            "no storage descriptors for `{}`",
            config.schema.name
        )));
    }

    let mut backends: Vec<Arc<dyn RecordStore>> = Vec::with_capacity(config.descriptors.len());
    for descriptor in &config.descriptors {
        let backend: Arc<dyn RecordStore> = match descriptor {
            StorageDescriptor::InMemory => Arc::new(MemoryStore::new()),
            StorageDescriptor::OnDisk { path } => Arc::new(
                FileStore::open(path, &config.schema.name)
                    .await
                    .map_err(|err| match err {
                        StoreError::Unavailable(_) => err,
                        other => StoreError::Unavailable(format!("{}: {other}", path.display())),
                    })?,
            ),
        };
        backends.push(backend);
    }

    info!(
        schema = %config.schema.name,
        backends = ?backends.iter().map(|b| b.describe()).collect::<Vec<_>>(),
        "store loaded"
    );
    Ok(StoreHandle {
        inner: Arc::new(StoreInner {
            schema: config.schema.clone(),
            backends,
        }),
    })
}

struct StoreInner {
    schema: StoreSchema,
    /// Never empty; the first one takes writes.
    backends: Vec<Arc<dyn RecordStore>>,
}

/// A loaded store. Cheap to clone.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreHandle")
            .field("schema", &self.inner.schema.name)
            .field("backends", &self.inner.backends.len())
            .finish()
    }
}

impl StoreHandle {
    pub fn schema(&self) -> &StoreSchema {
        &self.inner.schema
    }

    /// A scratch context; nothing staged in it is visible until `save`.
    pub fn new_context(&self) -> StoreContext {
        StoreContext {
            store: self.clone(),
            changes: ChangeSet::new(),
        }
    }

    /// Map every item to a record and stage it. With `save`, the whole
    /// batch is committed in one transaction.
    pub async fn insert_batch<I, R, M>(
        &self,
        items: &[I],
        map: &M,
        save: bool,
    ) -> Result<Vec<R>, StoreError>
    where
        R: Entity,
        M: Mappable<I, R> + ?Sized,
    {
        let mut context = self.new_context();
        let mut records = Vec::with_capacity(items.len());
        for item in items {
            let record = map.map(item);
            context.stage(&record)?;
            records.push(record);
        }
        if save {
            context.save().await?;
        } else {
            debug!(entity = R::ENTITY, staged = context.staged(), "insert not saved");
        }
        Ok(records)
    }

    /// The items whose identity is not stored yet for entity `R`, in their
    /// original order.
    pub async fn filter_existing<I, R>(
        &self,
        items: Vec<I>,
        identity: impl Fn(&I) -> String,
    ) -> Result<Vec<I>, StoreError>
    where
        R: Entity,
    {
        let existing = self.identities(R::ENTITY).await?;
        Ok(items
            .into_iter()
            .filter(|item| !existing.contains(&identity(item)))
            .collect())
    }

    /// Every stored record of entity `R`, ordered by identity.
    pub async fn fetch_all<R: Entity>(&self) -> Result<Vec<R>, StoreError> {
        let records = self.merged(R::ENTITY).await?;
        records
            .into_values()
            .map(|record| serde_json::from_value(record).map_err(StoreError::from))
            .collect()
    }

    pub async fn identities(&self, entity: &str) -> Result<HashSet<String>, StoreError> {
        self.check_entity(entity)?;
        let mut identities = HashSet::new();
        for backend in &self.inner.backends {
            identities.extend(backend.identities(entity).await?);
        }
        Ok(identities)
    }

    async fn merged(&self, entity: &str) -> Result<EntityRecords, StoreError> {
        self.check_entity(entity)?;
        let mut merged = BTreeMap::new();
        for backend in self.inner.backends.iter().rev() {
            merged.extend(backend.fetch(entity).await?);
        }
        Ok(merged)
    }

    fn check_entity(&self, entity: &str) -> Result<(), StoreError> {
        if self.inner.schema.contains(entity) {
            Ok(())
        } else {
            Err(StoreError::UnknownEntity(entity.to_string()))
        }
    }

    fn writable(&self) -> &Arc<dyn RecordStore> {
        &self.inner.backends[0]
    }
}

/// Staged, uncommitted changes against one store.
pub struct StoreContext {
    store: StoreHandle,
    changes: ChangeSet,
}

impl StoreContext {
    pub fn stage<R: Entity>(&mut self, record: &R) -> Result<(), StoreError> {
        self.store.check_entity(R::ENTITY)?;
        let value = serde_json::to_value(record)?;
        self.changes.insert(R::ENTITY, record.identity(), value);
        Ok(())
    }

    pub fn staged(&self) -> usize {
        self.changes.len()
    }

    /// Commit everything staged, or nothing.
    pub async fn save(self) -> Result<(), StoreError> {
        let count = self.changes.len();
        self.store
            .writable()
            .commit(self.changes)
            .await
            .map_err(|err| StoreError::SaveFailed(err.to_string()))?;
        debug!(records = count, "saved");
        Ok(())
    }
}


#[cfg(test)]
mod scenarios;
