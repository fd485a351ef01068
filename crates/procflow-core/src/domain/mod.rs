//! Domain model: identifiers, lifecycle states, result containers.

pub mod ids;
pub mod result;
pub mod state;

pub use ids::{ProcedureId, QueueId};
pub use result::{Outcome, Pending};
pub use state::{LifecycleEvent, ProcedureState};
