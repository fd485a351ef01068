//! Ports: the seams between the engine and external systems.

pub mod record_store;

pub use self::record_store::{ChangeSet, EntityRecords, Record, RecordStore};
