//! Store pipelines end to end: load a store, insert items through a group,
//! filter items against what is stored.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::*;
use crate::error::{ErrorKind, ProcedureError};
use crate::procedure::{
    Group, GroupContext, GroupProcedure, Input, InputProcedure, ResultProcedure, Task,
};
use crate::queue::ProcedureQueue;

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestItem {
    identity: String,
    name: String,
}

impl Identifiable for TestItem {
    fn identity(&self) -> String {
        self.identity.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct TestRecord {
    identifier: String,
    name: String,
}

impl Identifiable for TestRecord {
    fn identity(&self) -> String {
        self.identifier.clone()
    }
}

impl Entity for TestRecord {
    const ENTITY: &'static str = "TestEntity";
}

fn items() -> Vec<TestItem> {
    [("a-1", "Foo"), ("b-2", "Bar"), ("c-3", "Bat")]
        .into_iter()
        .map(|(identity, name)| TestItem {
            identity: identity.into(),
            name: name.into(),
        })
        .collect()
}

fn schema() -> StoreSchema {
    StoreSchema::new("TestDataModel").with_entity(TestRecord::ENTITY)
}

/// Downloads the items, then inserts them into the injected store.
struct TestInsert {
    input: Input<StoreHandle>,
    items: Vec<TestItem>,
    save: bool,
}

impl TestInsert {
    fn new(items: Vec<TestItem>, save: bool) -> Group<Self> {
        Group::with(Self {
            input: Input::new(),
            items,
            save,
        })
    }
}

impl InputProcedure for TestInsert {
    type Input = StoreHandle;

    fn input(&self) -> &Input<StoreHandle> {
        &self.input
    }
}

#[async_trait]
impl GroupProcedure for TestInsert {
    type Output = Vec<TestRecord>;

    async fn compose(
        &self,
        group: &mut GroupContext<'_, Vec<TestRecord>>,
    ) -> Result<(), ProcedureError> {
        let store = self.input.require()?;
        let download = group
            .add_child(Task::new(ResultProcedure::value(self.items.clone())))
            .await?;

        let insert = InsertItems::new(|item: &TestItem| TestRecord {
            identifier: item.identity.clone(),
            name: item.name.clone(),
        })
        .with_store(store)
        .and_save(self.save);
        let insert = group
            .add_child(Task::new(insert).inject_result(&download)?)
            .await?;

        group.output_from(&insert);
        Ok(())
    }
}

/// Downloads the items, then keeps those not stored yet.
struct TestFilter {
    input: Input<StoreHandle>,
    items: Vec<TestItem>,
}

impl TestFilter {
    fn new(items: Vec<TestItem>) -> Group<Self> {
        Group::with(Self {
            input: Input::new(),
            items,
        })
    }
}

impl InputProcedure for TestFilter {
    type Input = StoreHandle;

    fn input(&self) -> &Input<StoreHandle> {
        &self.input
    }
}

#[async_trait]
impl GroupProcedure for TestFilter {
    type Output = Vec<TestItem>;

    async fn compose(
        &self,
        group: &mut GroupContext<'_, Vec<TestItem>>,
    ) -> Result<(), ProcedureError> {
        let store = self.input.require()?;
        let download = group
            .add_child(Task::new(ResultProcedure::value(self.items.clone())))
            .await?;

        let filter = FilterExisting::<TestItem, TestRecord>::new().with_store(store);
        let filter = group
            .add_child(Task::new(filter).inject_result(&download)?)
            .await?;

        group.output_from(&filter);
        Ok(())
    }
}

struct Pipeline {
    queue: ProcedureQueue,
    load: crate::procedure::Handle<StoreHandle>,
}

impl Pipeline {
    async fn start(config: StoreConfig) -> Self {
        let queue = ProcedureQueue::new();
        let load = queue.add(Task::new(LoadStore::new(config))).await.unwrap();
        Self { queue, load }
    }

    async fn insert(&self, save: bool) -> crate::procedure::Handle<Vec<TestRecord>> {
        let task = Task::new(TestInsert::new(items(), save))
            .inject_result(&self.load)
            .unwrap();
        self.queue.add(task).await.unwrap()
    }

    async fn filter_after<T: crate::procedure::Value>(
        &self,
        after: &crate::procedure::Handle<T>,
    ) -> crate::procedure::Handle<Vec<TestItem>> {
        let task = Task::new(TestFilter::new(items()))
            .inject_result(&self.load)
            .unwrap()
            .depends_on(after);
        self.queue.add(task).await.unwrap()
    }

    async fn fetch_after<T: crate::procedure::Value>(
        &self,
        after: &crate::procedure::Handle<T>,
    ) -> crate::procedure::Handle<Vec<TestRecord>> {
        let task = Task::new(FetchRecords::<TestRecord>::new())
            .inject_result(&self.load)
            .unwrap()
            .depends_on(after);
        self.queue.add(task).await.unwrap()
    }
}

#[tokio::test]
async fn insert_stores_every_item() {
    let pipeline = Pipeline::start(StoreConfig::in_memory(schema())).await;
    let insert = pipeline.insert(true).await;
    let fetch = pipeline.fetch_after(&insert).await;

    let inserted = insert.finished().await.into_result().unwrap();
    assert_eq!(inserted.len(), 3);
    assert_eq!(insert.name(), "TestInsert");

    let stored = fetch.finished().await.into_result().unwrap();
    let names: Vec<_> = stored.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["Foo", "Bar", "Bat"]);
}

#[tokio::test]
async fn filter_drops_items_already_stored() {
    let pipeline = Pipeline::start(StoreConfig::in_memory(schema())).await;
    let insert = pipeline.insert(true).await;
    let filter = pipeline.filter_after(&insert).await;

    let report = pipeline.queue.wait_until_finished().await;
    assert!(report.is_success(), "{:?}", report.failures());
    assert_eq!(filter.output().value(), Some(&Vec::new()));
}

#[tokio::test]
async fn filter_keeps_everything_on_an_empty_store() {
    let pipeline = Pipeline::start(StoreConfig::in_memory(schema())).await;
    let filter = pipeline.filter_after(&pipeline.load.clone()).await;

    assert_eq!(filter.finished().await.into_result(), Ok(items()));
}

#[tokio::test]
async fn unsaved_insert_is_not_visible() {
    let pipeline = Pipeline::start(StoreConfig::in_memory(schema())).await;
    let insert = pipeline.insert(false).await;
    let fetch = pipeline.fetch_after(&insert).await;
    let filter = pipeline.filter_after(&insert).await;

    assert_eq!(insert.finished().await.into_result().map(|r| r.len()), Ok(3));
    assert_eq!(fetch.finished().await.into_result(), Ok(Vec::new()));
    assert_eq!(filter.finished().await.into_result(), Ok(items()));
}

#[tokio::test]
async fn failed_load_fails_the_insert_without_storing() {
    let pipeline = Pipeline::start(StoreConfig::new(schema())).await;
    let insert = pipeline.insert(true).await;

    let outcome = insert.finished().await;
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].kind(), ErrorKind::RequirementNotSatisfied);
    assert!(matches!(
        outcome.errors[0].root_cause(),
        ProcedureError::Store(StoreError::Unavailable(_))
    ));
    assert_eq!(
        outcome.output.error().map(ProcedureError::kind),
        Some(ErrorKind::RequirementNotSatisfied)
    );

    let load = pipeline.load.finished().await;
    assert_eq!(load.errors[0].kind(), ErrorKind::Store);
}

#[tokio::test]
async fn on_disk_records_survive_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new(schema())
        .with_descriptor(StorageDescriptor::on_disk(dir.path().join("test.json")));

    let first = Pipeline::start(config.clone()).await;
    first.insert(true).await;
    assert!(first.queue.wait_until_finished().await.is_success());

    let second = Pipeline::start(config).await;
    let fetch = second.fetch_after(&second.load.clone()).await;
    assert_eq!(fetch.finished().await.into_result().map(|r| r.len()), Ok(3));

    let filter = second.filter_after(&fetch).await;
    assert_eq!(filter.finished().await.into_result(), Ok(Vec::new()));
}
