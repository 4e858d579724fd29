//! Core abstractions for durable session continuity.
//!
//! This crate provides the fundamental building blocks:
//! - `Turn` - One recorded unit of conversation
//! - `DurableKv` / `TurnStore` - Storage traits that survive restarts
//! - `ScopedKv` / `PersistedCell` - Typed, namespaced views over a `DurableKv`
//! - `Clock` - Wall-clock source for persisted deadlines

pub mod clock;
pub mod persisted;
pub mod traits;
pub mod turn;

pub use clock::{Clock, ManualClock, SystemClock};
pub use persisted::{NamespaceRef, PersistedCell, ScopedKv};
pub use traits::{DurableKv, StorageError, TurnStore};
pub use turn::{Role, ToolCall, Turn};
