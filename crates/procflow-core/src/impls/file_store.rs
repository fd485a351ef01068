//! FileStore: a RecordStore persisted as one JSON document on disk.
//!
//! Commits write the whole document to a sibling temp file and rename it
//! over the original, so a failed commit leaves the previous document
//! intact.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use crate::ports::{ChangeSet, EntityRecords, RecordStore};
use crate::store::StoreError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    schema: String,
    entities: BTreeMap<String, EntityRecords>,
}

pub struct FileStore {
    path: PathBuf,
    document: Mutex<StoreDocument>,
}

impl FileStore {
    /// Open the document at `path`, or start an empty one if it does not
    /// exist yet. An existing document must belong to `schema`.
    pub async fn open(path: impl AsRef<Path>, schema: &str) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let document = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let document: StoreDocument = serde_json::from_slice(&bytes)?;
                if document.schema != schema {
                    return Err(StoreError::Unavailable(format!(
                        "{} holds schema `{}`, expected `{schema}`",
                        path.display(),
                        document.schema
                    )));
                }
                document
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreDocument {
                schema: schema.to_string(),
                entities: BTreeMap::new(),
            },
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), entities = document.entities.len(), "opened file store");
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, document: &StoreDocument) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(document)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FileStore {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self, entity: &str) -> Result<EntityRecords, StoreError> {
        let document = self.document.lock().await;
        Ok(document.entities.get(entity).cloned().unwrap_or_default())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<(), StoreError> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let count = changes.len();
        changes.apply_to(&mut next.entities);
        self.persist(&next).await?;
        *document = next;
        debug!(path = %self.path.display(), records = count, "committed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn committed_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.json");

        let store = FileStore::open(&path, "catalog").await.unwrap();
        let mut changes = ChangeSet::new();
        changes.insert("item", "a-1", json!({"name": "Foo"}));
        store.commit(changes).await.unwrap();

        let reopened = FileStore::open(&path, "catalog").await.unwrap();
        let records = reopened.fetch("item").await.unwrap();
        assert_eq!(records["a-1"], json!({"name": "Foo"}));
    }

    #[tokio::test]
    async fn schema_mismatch_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileStore::open(&path, "catalog").await.unwrap();
        store.commit(ChangeSet::new()).await.unwrap();

        let err = FileStore::open(&path, "other").await.err().unwrap();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[tokio::test]
    async fn corrupt_document_is_a_codec_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let err = FileStore::open(&path, "catalog").await.err().unwrap();
        assert!(matches!(err, StoreError::Codec(_)));
    }
}
