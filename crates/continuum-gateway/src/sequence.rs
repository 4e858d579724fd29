//! Last-seen dispatch sequence number.

use continuum_core::{PersistedCell, ScopedKv, StorageError};

/// Durable, monotonically non-decreasing sequence number.
pub struct SequenceTracker {
    cell: PersistedCell<u64>,
    last: Option<u64>,
}

impl SequenceTracker {
    /// Field name inside the owning scope.
    pub const FIELD: &'static str = "seq";

    /// Load the persisted value.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn load(scope: ScopedKv) -> Result<Self, StorageError> {
        let mut cell = PersistedCell::new(scope, Self::FIELD);
        let last = cell.get().await?;
        Ok(Self { cell, last })
    }

    /// Last observed sequence number.
    #[must_use]
    pub const fn last(&self) -> Option<u64> {
        self.last
    }

    /// Record the sequence carried by an event.
    ///
    /// Absent values and values not greater than the current one are
    /// ignored. Returns whether the value advanced. The in-memory value
    /// advances even if persisting it fails.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn observe(&mut self, seq: Option<u64>) -> Result<bool, StorageError> {
        let Some(seq) = seq else {
            return Ok(false);
        };
        if self.last.is_some_and(|last| seq <= last) {
            return Ok(false);
        }
        self.last = Some(seq);
        self.cell.set(seq).await?;
        Ok(true)
    }
}
