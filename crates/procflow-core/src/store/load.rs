use async_trait::async_trait;

use super::{StoreConfig, StoreHandle};
use crate::error::ProcedureError;
use crate::procedure::{Input, InputProcedure, Procedure, ProcedureContext};

/// Opens the store described by its input config.
pub struct LoadStore {
    config: Input<StoreConfig>,
}

impl LoadStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config: Input::ready(config),
        }
    }

    /// Config to be injected from another procedure.
    pub fn pending() -> Self {
        Self {
            config: Input::new(),
        }
    }
}

impl InputProcedure for LoadStore {
    type Input = StoreConfig;

    fn input(&self) -> &Input<StoreConfig> {
        &self.config
    }
}

#[async_trait]
impl Procedure for LoadStore {
    type Output = StoreHandle;

    async fn execute(&self, cx: &ProcedureContext) -> Result<StoreHandle, ProcedureError> {
        let config = self.config.require()?;
        cx.check_cancelled()?;
        Ok(super::open(&config).await?)
    }
}
