//! procflow-core
//!
//! A dependency-aware procedure engine: typed units of work, result
//! injection between them, groups of procedures running on their own inner
//! queue, and a small store adapter built from ordinary procedures.
//!
//! # Modules
//! - **domain**: ids, lifecycle states, result containers
//! - **procedure**: `Procedure` / `GroupProcedure` traits, `Task`, `Handle`, groups, observers
//! - **queue**: `ProcedureQueue`, dependency graph, retry policy, run report
//! - **store**: `LoadStore`, `InsertItems`, `FilterExisting`, `FetchRecords`
//! - **ports**: the `RecordStore` seam behind the store adapter
//! - **impls**: in-memory and on-disk `RecordStore` implementations
//! - **error**: `ProcedureError`

pub mod domain;
pub mod error;
pub mod impls;
pub mod ports;
pub mod procedure;
pub mod queue;
pub mod store;

pub use domain::{LifecycleEvent, Outcome, Pending, ProcedureId, ProcedureState, QueueId};
pub use error::{ErrorKind, ProcedureError};
pub use procedure::{
    BlockProcedure, Group, GroupContext, GroupPolicy, GroupProcedure, Handle, Input,
    InputProcedure, Mappable, Procedure, ProcedureContext, ResultProcedure, Task,
    TransformProcedure,
};
pub use queue::{ProcedureQueue, QueueConfig, RetryPolicy, RunReport};
