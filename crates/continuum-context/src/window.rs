//! The ordered, persisted list of turn ids.

use continuum_core::{PersistedCell, ScopedKv, StorageError};

/// Which ids a prune evicts and which it keeps, both in window order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrunePlan {
    pub evict: Vec<String>,
    pub keep: Vec<String>,
}

/// Ordered turn ids currently in scope.
///
/// Every change is written through before the in-memory copy moves, so
/// a failed write leaves both views on the previous list.
pub struct ContextWindow {
    cell: PersistedCell<Vec<String>>,
    ids: Vec<String>,
}

impl ContextWindow {
    const FIELD: &'static str = "window";

    /// Load the window stored in `scope`, or start empty.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn load(scope: ScopedKv) -> Result<Self, StorageError> {
        let mut cell = PersistedCell::new(scope, Self::FIELD);
        let ids = cell.get_or(Vec::new()).await?;
        Ok(Self { cell, ids })
    }

    /// Ids in replay order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Append one id at the tail. An id already in the window is left
    /// where it is. Returns whether the id was added.
    ///
    /// # Errors
    /// Returns error if the store fails; the window is then unchanged.
    pub async fn append(&mut self, id: String) -> Result<bool, StorageError> {
        if self.ids.contains(&id) {
            return Ok(false);
        }
        let mut next = self.ids.clone();
        next.push(id);
        self.replace(next).await?;
        Ok(true)
    }

    /// Work out what a prune would do, or `None` while within `max_messages`.
    #[must_use]
    pub fn plan_prune(&self, max_messages: usize, prune_percentage: f64) -> Option<PrunePlan> {
        let len = self.ids.len();
        if len <= max_messages {
            return None;
        }

        #[allow(
            clippy::cast_precision_loss,
            clippy::cast_possible_truncation,
            clippy::cast_sign_loss
        )]
        let to_remove = ((len as f64) * prune_percentage).floor() as usize;
        let to_remove = to_remove.min(len);
        if to_remove == 0 {
            return None;
        }

        let (evict, keep) = self.ids.split_at(to_remove);
        Some(PrunePlan {
            evict: evict.to_vec(),
            keep: keep.to_vec(),
        })
    }

    /// Replace the evicted prefix with `summary_id` in a single write.
    ///
    /// # Errors
    /// Returns error if the store fails; the window is then unchanged.
    pub async fn splice(&mut self, summary_id: String, plan: &PrunePlan) -> Result<(), StorageError> {
        let mut next = Vec::with_capacity(plan.keep.len() + 1);
        next.push(summary_id);
        next.extend(plan.keep.iter().cloned());
        self.replace(next).await
    }

    async fn replace(&mut self, next: Vec<String>) -> Result<(), StorageError> {
        self.cell.set(next.clone()).await?;
        self.ids = next;
        Ok(())
    }
}
