//! Small ready-made procedures.

use async_trait::async_trait;

use super::slot::Input;
use super::{InputProcedure, Procedure, ProcedureContext, Value};
use crate::error::ProcedureError;

type Produce<T> = Box<dyn Fn() -> Result<T, ProcedureError> + Send + Sync>;

/// Produces a value from a closure, with no inputs.
pub struct ResultProcedure<T> {
    produce: Produce<T>,
}

impl<T: Value> ResultProcedure<T> {
    pub fn new(produce: impl Fn() -> Result<T, ProcedureError> + Send + Sync + 'static) -> Self {
        Self {
            produce: Box::new(produce),
        }
    }

    pub fn value(value: T) -> Self {
        Self::new(move || Ok(value.clone()))
    }

    pub fn failing(error: ProcedureError) -> Self {
        Self::new(move || Err(error.clone()))
    }
}

#[async_trait]
impl<T: Value> Procedure for ResultProcedure<T> {
    type Output = T;

    async fn execute(&self, _cx: &ProcedureContext) -> Result<T, ProcedureError> {
        (self.produce)()
    }
}

type Transform<I, O> = Box<dyn Fn(&I) -> Result<O, ProcedureError> + Send + Sync>;

/// Maps its input into an output.
pub struct TransformProcedure<I, O> {
    input: Input<I>,
    transform: Transform<I, O>,
}

impl<I: Value, O: Value> TransformProcedure<I, O> {
    pub fn new(transform: impl Fn(&I) -> O + Send + Sync + 'static) -> Self {
        Self::try_new(move |input: &I| Ok(transform(input)))
    }

    pub fn try_new(
        transform: impl Fn(&I) -> Result<O, ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            input: Input::new(),
            transform: Box::new(transform),
        }
    }

    /// Prefill the input instead of injecting it.
    pub fn with_input(mut self, value: I) -> Self {
        self.input = Input::ready(value);
        self
    }
}

impl<I: Value, O: Value> InputProcedure for TransformProcedure<I, O> {
    type Input = I;

    fn input(&self) -> &Input<I> {
        &self.input
    }
}

#[async_trait]
impl<I: Value, O: Value> Procedure for TransformProcedure<I, O> {
    type Output = O;

    async fn execute(&self, _cx: &ProcedureContext) -> Result<O, ProcedureError> {
        let input = self.input.require()?;
        (self.transform)(&input)
    }
}

type Block = Box<dyn Fn(&ProcedureContext) -> Result<(), ProcedureError> + Send + Sync>;

/// Runs a side-effecting closure.
pub struct BlockProcedure {
    block: Block,
}

impl BlockProcedure {
    pub fn new(
        block: impl Fn(&ProcedureContext) -> Result<(), ProcedureError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            block: Box::new(block),
        }
    }
}

#[async_trait]
impl Procedure for BlockProcedure {
    type Output = ();

    async fn execute(&self, cx: &ProcedureContext) -> Result<(), ProcedureError> {
        cx.check_cancelled()?;
        (self.block)(cx)
    }
}
