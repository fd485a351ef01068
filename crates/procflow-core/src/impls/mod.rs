//! Implementations of the ports.

pub mod file_store;
pub mod memory_store;

pub use self::file_store::FileStore;
pub use self::memory_store::MemoryStore;
