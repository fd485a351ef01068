//! Queue module: dependency graph, retry policy, configuration and the
//! procedure scheduler.

mod config;
mod dependency;
mod report;
mod retry;
mod scheduler;

pub use config::QueueConfig;
pub use dependency::DependencyGraph;
pub use report::{Failure, ReportEntry, RunReport};
pub use retry::RetryPolicy;
pub use scheduler::ProcedureQueue;
