use std::marker::PhantomData;

use async_trait::async_trait;
use tracing::debug;

use super::{Entity, StoreHandle};
use crate::error::ProcedureError;
use crate::procedure::{Input, InputProcedure, Mappable, Procedure, ProcedureContext, Value};

/// Maps a batch of items to records and inserts them into a store.
///
/// Inputs: the store (`store()`) and the items (`input()`). Output: the
/// inserted records. With saving turned off the records are only staged
/// and then dropped.
pub struct InsertItems<I, R, M> {
    store: Input<StoreHandle>,
    items: Input<Vec<I>>,
    map: M,
    save: bool,
    _record: PhantomData<fn() -> R>,
}

impl<I, R, M> InsertItems<I, R, M>
where
    I: Value,
    R: Entity,
    M: Mappable<I, R> + 'static,
{
    pub fn new(map: M) -> Self {
        Self {
            store: Input::new(),
            items: Input::new(),
            map,
            save: true,
            _record: PhantomData,
        }
    }

    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Input::ready(store);
        self
    }

    pub fn with_items(mut self, items: Vec<I>) -> Self {
        self.items = Input::ready(items);
        self
    }

    pub fn and_save(mut self, save: bool) -> Self {
        self.save = save;
        self
    }

    pub fn store(&self) -> &Input<StoreHandle> {
        &self.store
    }

    pub fn items(&self) -> &Input<Vec<I>> {
        &self.items
    }
}

impl<I, R, M> InputProcedure for InsertItems<I, R, M>
where
    I: Value,
{
    type Input = Vec<I>;

    fn input(&self) -> &Input<Vec<I>> {
        &self.items
    }
}

#[async_trait]
impl<I, R, M> Procedure for InsertItems<I, R, M>
where
    I: Value,
    R: Entity,
    M: Mappable<I, R> + 'static,
{
    type Output = Vec<R>;

    async fn execute(&self, cx: &ProcedureContext) -> Result<Vec<R>, ProcedureError> {
        let store = self.store.require()?;
        let items = self.items.require()?;
        cx.check_cancelled()?;

        let records = store.insert_batch(&items, &self.map, self.save).await?;
        debug!(
            procedure = %cx.id(),
            entity = R::ENTITY,
            records = records.len(),
            saved = self.save,
            "inserted"
        );
        Ok(records)
    }
}
