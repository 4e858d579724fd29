//! In-memory storage.

use std::{
    collections::{BTreeMap, HashMap},
    sync::RwLock,
};

use async_trait::async_trait;
use continuum_core::{DurableKv, StorageError, Turn, TurnStore};
use serde_json::Value;

/// In-memory key/value store.
///
/// Useful for development and tests. Survives a simulated restart as long
/// as the same instance is handed to the new components; data is lost
/// when the process exits.
#[derive(Default)]
pub struct MemoryKv {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableKv for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        Ok(self
            .entries
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .get(key)
            .cloned())
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        self.entries
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .entries
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .remove(key)
            .is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let entries = self
            .entries
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// In-memory turn store.
#[derive(Default)]
pub struct MemoryTurnStore {
    turns: RwLock<HashMap<String, Turn>>,
}

impl MemoryTurnStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TurnStore for MemoryTurnStore {
    async fn upsert(&self, turn: &Turn) -> Result<(), StorageError> {
        self.turns
            .write()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .insert(turn.id.clone(), turn.clone());
        Ok(())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Turn>, StorageError> {
        let turns = self
            .turns
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?;

        Ok(ids.iter().filter_map(|id| turns.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<usize, StorageError> {
        Ok(self
            .turns
            .read()
            .map_err(|e| StorageError::Internal(e.to_string()))?
            .len())
    }
}
