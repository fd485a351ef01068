use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use procflow_core::QueueConfig;
use procflow_core::store::{Entity, StorageDescriptor, StoreConfig, StoreSchema};

use crate::pipeline::CatalogRecord;

/// Settings read from `--config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub queue: QueueConfig,
    pub store: StoreConfig,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            store: StoreConfig::in_memory(
                StoreSchema::new("catalog").with_entity(CatalogRecord::ENTITY),
            ),
        }
    }
}

impl CliConfig {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    /// `--store` replaces the configured descriptors with one document.
    pub fn with_store_path(mut self, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.store.descriptors = vec![StorageDescriptor::OnDisk { path }];
        }
        self
    }
}
