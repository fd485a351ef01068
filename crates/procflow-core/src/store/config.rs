//! Store configuration: schema plus storage descriptors.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Named set of entities a store may hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSchema {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<String>,
}

impl StoreSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entities: Vec::new(),
        }
    }

    pub fn with_entity(mut self, entity: impl Into<String>) -> Self {
        let entity = entity.into();
        if !self.contains(&entity) {
            self.entities.push(entity);
        }
        self
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.iter().any(|e| e == entity)
    }
}

/// Where one backend keeps its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageDescriptor {
    InMemory,
    OnDisk { path: PathBuf },
}

impl StorageDescriptor {
    pub fn on_disk(path: impl AsRef<Path>) -> Self {
        StorageDescriptor::OnDisk {
            path: path.as_ref().to_path_buf(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    pub schema: StoreSchema,
    /// The first descriptor receives writes.
    #[serde(default)]
    pub descriptors: Vec<StorageDescriptor>,
}

impl StoreConfig {
    pub fn new(schema: StoreSchema) -> Self {
        Self {
            schema,
            descriptors: Vec::new(),
        }
    }

    /// Schema with a single in-memory backend.
    pub fn in_memory(schema: StoreSchema) -> Self {
        Self::new(schema).with_descriptor(StorageDescriptor::InMemory)
    }

    pub fn with_descriptor(mut self, descriptor: StorageDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }

    pub fn with_descriptors(mut self, descriptors: Vec<StorageDescriptor>) -> Self {
        self.descriptors = descriptors;
        self
    }
}
