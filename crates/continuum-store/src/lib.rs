//! Storage backends for durable session state.
//!
//! Provides:
//! - `MemoryKv` / `MemoryTurnStore` - in-process stores (feature: memory)
//! - `SqliteStore` - one SQLite database backing both traits (feature: sqlite)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "memory")]
pub use memory::{MemoryKv, MemoryTurnStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
