//! Core traits for durable storage.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::Turn;

/// Storage error.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Storage error: {0}")]
    Internal(String),
}

/// Key/value store that survives process restarts.
///
/// Keys are namespaced by a caller-chosen prefix; see [`crate::ScopedKv`].
#[async_trait]
pub trait DurableKv: Send + Sync {
    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a value, replacing any previous one.
    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError>;

    /// Delete a value. Returns whether a value was present.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// List every entry whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError>;
}

/// Durable record store for conversation turns.
#[async_trait]
pub trait TurnStore: Send + Sync {
    /// Insert a turn, or replace the turn with the same id.
    async fn upsert(&self, turn: &Turn) -> Result<(), StorageError>;

    /// Fetch the turns with the given ids.
    ///
    /// Missing ids are skipped. No return order is guaranteed; callers
    /// re-order by their own id list.
    async fn get_many(&self, ids: &[String]) -> Result<Vec<Turn>, StorageError>;

    /// Total number of stored turns.
    async fn count(&self) -> Result<usize, StorageError>;
}
