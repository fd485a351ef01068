use std::marker::PhantomData;

use async_trait::async_trait;

use super::{Entity, StoreHandle};
use crate::error::ProcedureError;
use crate::procedure::{Input, InputProcedure, Procedure, ProcedureContext};

/// Reads every stored record of entity `R`.
pub struct FetchRecords<R> {
    store: Input<StoreHandle>,
    _record: PhantomData<fn() -> R>,
}

impl<R: Entity> FetchRecords<R> {
    pub fn new() -> Self {
        Self {
            store: Input::new(),
            _record: PhantomData,
        }
    }

    pub fn with_store(mut self, store: StoreHandle) -> Self {
        self.store = Input::ready(store);
        self
    }
}

impl<R: Entity> Default for FetchRecords<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> InputProcedure for FetchRecords<R> {
    type Input = StoreHandle;

    fn input(&self) -> &Input<StoreHandle> {
        &self.store
    }
}

#[async_trait]
impl<R: Entity> Procedure for FetchRecords<R> {
    type Output = Vec<R>;

    async fn execute(&self, _cx: &ProcedureContext) -> Result<Vec<R>, ProcedureError> {
        let store = self.store.require()?;
        Ok(store.fetch_all::<R>().await?)
    }
}
