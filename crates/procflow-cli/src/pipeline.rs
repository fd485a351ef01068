//! The catalog import pipeline:
//!
//! ```text
//! load-store ──> import (group: download -> filter-new -> insert) ──> count-stored
//! ```

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use procflow_core::procedure::Handle;
use procflow_core::store::{
    Entity, FetchRecords, FilterExisting, Identifiable, InsertItems, LoadStore, StoreHandle,
};
use procflow_core::{
    Group, GroupContext, GroupProcedure, Input, InputProcedure, ProcedureError, ProcedureQueue,
    ResultProcedure, RunReport, Task,
};

use crate::config::CliConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
}

impl Identifiable for CatalogItem {
    fn identity(&self) -> String {
        self.id.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub identifier: String,
    pub name: String,
}

impl Identifiable for CatalogRecord {
    fn identity(&self) -> String {
        self.identifier.clone()
    }
}

impl Entity for CatalogRecord {
    const ENTITY: &'static str = "CatalogRecord";
}

pub fn demo_items() -> Vec<CatalogItem> {
    [("a-1", "Foo"), ("b-2", "Bar"), ("c-3", "Bat")]
        .into_iter()
        .map(|(id, name)| CatalogItem {
            id: id.to_string(),
            name: name.to_string(),
        })
        .collect()
}

/// Inserts the items the store does not hold yet.
struct CatalogImport {
    store: Input<StoreHandle>,
    items: Vec<CatalogItem>,
    save: bool,
}

impl InputProcedure for CatalogImport {
    type Input = StoreHandle;

    fn input(&self) -> &Input<StoreHandle> {
        &self.store
    }
}

#[async_trait]
impl GroupProcedure for CatalogImport {
    type Output = Vec<CatalogRecord>;

    fn name(&self) -> String {
        "import".to_string()
    }

    async fn compose(
        &self,
        group: &mut GroupContext<'_, Vec<CatalogRecord>>,
    ) -> Result<(), ProcedureError> {
        let store = self.store.require()?;

        let download = group
            .add_child(Task::named("download", ResultProcedure::value(self.items.clone())))
            .await?;

        let filter = FilterExisting::<CatalogItem, CatalogRecord>::new().with_store(store.clone());
        let filter = group
            .add_child(Task::named("filter-new", filter).inject_result(&download)?)
            .await?;

        let insert = InsertItems::new(|item: &CatalogItem| CatalogRecord {
            identifier: item.id.clone(),
            name: item.name.clone(),
        })
        .with_store(store)
        .and_save(self.save);
        let insert = group
            .add_child(Task::named("insert", insert).inject_result(&filter)?)
            .await?;

        group.output_from(&insert);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct Summary {
    pub inserted: Vec<CatalogRecord>,
    pub stored: usize,
    pub report: RunReport,
}

pub async fn run(config: CliConfig, items: Vec<CatalogItem>, save: bool) -> Result<Summary> {
    let queue = ProcedureQueue::with_config(config.queue);

    let load = queue
        .add(Task::named("load-store", LoadStore::new(config.store)))
        .await?;

    let import = Task::new(Group::with(CatalogImport {
        store: Input::new(),
        items,
        save,
    }))
    .inject_result(&load)?;
    let import: Handle<Vec<CatalogRecord>> = queue.add(import).await?;

    let count = Task::named("count-stored", FetchRecords::<CatalogRecord>::new())
        .inject_result(&load)?
        .depends_on(&import);
    let count = queue.add(count).await?;

    let report = queue.wait_until_finished().await;
    let inserted = import.output().value().cloned().unwrap_or_default();
    let stored = count.output().value().map_or(0, Vec::len);
    info!(inserted = inserted.len(), stored, success = report.is_success(), "pipeline finished");

    Ok(Summary {
        inserted,
        stored,
        report,
    })
}
