//! Heartbeat schedule.
//!
//! The interval and the next-due wall-clock time are both persisted, so a
//! process that is evicted and resumed reconstructs the timer from the
//! stored due time instead of starting a fresh interval. The schedule is
//! tied to one transport session: a new socket re-arms it from its own
//! `Hello`, and a disconnect clears it.

use std::{sync::Arc, time::Duration};

use continuum_core::{Clock, PersistedCell, ScopedKv, StorageError};

/// Owns the heartbeat interval and the next due time.
pub struct HeartbeatScheduler {
    clock: Arc<dyn Clock>,
    interval_cell: PersistedCell<u64>,
    due_cell: PersistedCell<u64>,
    interval_ms: Option<u64>,
    due_at_ms: Option<u64>,
}

impl HeartbeatScheduler {
    const INTERVAL_FIELD: &'static str = "interval_ms";
    const DUE_FIELD: &'static str = "due_at_ms";

    /// Load the persisted schedule, if any.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn load(scope: ScopedKv, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        let mut interval_cell = PersistedCell::new(scope.clone(), Self::INTERVAL_FIELD);
        let mut due_cell = PersistedCell::new(scope, Self::DUE_FIELD);
        let interval_ms = interval_cell.get().await?;
        let due_at_ms = due_cell.get().await?;

        if let (Some(interval), Some(due)) = (interval_ms, due_at_ms) {
            tracing::debug!(interval, due, "restored heartbeat schedule");
        }

        Ok(Self {
            clock,
            interval_cell,
            due_cell,
            interval_ms,
            due_at_ms,
        })
    }

    /// Heartbeat interval, if armed.
    #[must_use]
    pub const fn interval_ms(&self) -> Option<u64> {
        self.interval_ms
    }

    /// Next due time (Unix-epoch milliseconds), if armed.
    #[must_use]
    pub const fn due_at_ms(&self) -> Option<u64> {
        self.due_at_ms
    }

    /// Whether an interval is set.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.interval_ms.is_some()
    }

    /// Time left until the next heartbeat; zero if overdue, `None` if not armed.
    #[must_use]
    pub fn time_until_due(&self) -> Option<Duration> {
        let due = self.due_at_ms?;
        Some(Duration::from_millis(due.saturating_sub(self.clock.now_ms())))
    }

    /// Set the interval and make a heartbeat due immediately.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn arm(&mut self, interval_ms: u64) -> Result<(), StorageError> {
        let now = self.clock.now_ms();
        self.interval_ms = Some(interval_ms);
        self.due_at_ms = Some(now);
        self.interval_cell.set(interval_ms).await?;
        self.due_cell.set(now).await?;
        Ok(())
    }

    /// Record that a heartbeat was just sent; the next one is due one
    /// interval from now.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn record_sent(&mut self) -> Result<(), StorageError> {
        let Some(interval) = self.interval_ms else {
            return Ok(());
        };
        let due = self.clock.now_ms().saturating_add(interval);
        self.due_at_ms = Some(due);
        self.due_cell.set(due).await?;
        Ok(())
    }

    /// Cancel the schedule.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn disarm(&mut self) -> Result<(), StorageError> {
        self.interval_ms = None;
        self.due_at_ms = None;
        self.interval_cell.clear().await?;
        self.due_cell.clear().await?;
        Ok(())
    }
}
