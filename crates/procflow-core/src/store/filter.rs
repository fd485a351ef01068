use std::marker::PhantomData;

use async_trait::async_trait;

use super::{Entity, Identifiable, StoreHandle};
use crate::error::ProcedureError;
use crate::procedure::{Input, InputProcedure, Procedure, ProcedureContext, Value};

type IdentityFn<I> = Box<dyn Fn(&I) -> String + Send + Sync>;

/// Keeps the items whose identity is not stored yet for entity `R`.
pub struct FilterExisting<I, R> {
    store: Input<StoreHandle>,
    items: Input<Vec<I>>,
    identity: IdentityFn<I>,
    _record: PhantomData<fn() -> R>,
}

impl<I: Value + Identifiable, R: Entity> FilterExisting<I, R> {
    pub fn new() -> Self {
        Self::by(|item: &I| item.identity())
    }
}

impl<I: Value + Identifiable, R: Entity> Default for FilterExisting<I, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: Value, R: Entity> FilterExisting<I, R> {
    /// Filter by a caller-supplied identity.
    pub fn by(identity: impl Fn(&I) -> String + Send + Sync + 'static) -> Self {
        Self {
            store: Input::new(),
            items: Input::new(),
            identity: Box::new(identity),
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

    pub fn store(&self) -> &Input<StoreHandle> {
        &self.store
    }
}

impl<I: Value, R> InputProcedure for FilterExisting<I, R> {
    type Input = Vec<I>;

    fn input(&self) -> &Input<Vec<I>> {
        &self.items
    }
}

#[async_trait]
impl<I: Value, R: Entity> Procedure for FilterExisting<I, R> {
    type Output = Vec<I>;

    async fn execute(&self, cx: &ProcedureContext) -> Result<Vec<I>, ProcedureError> {
        let store = self.store.require()?;
        let items = self.items.require()?;
        cx.check_cancelled()?;
        Ok(store
            .filter_existing::<I, R>(items, |item| (self.identity)(item))
            .await?)
    }
}
