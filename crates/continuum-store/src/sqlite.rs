//! SQLite storage (feature-gated).
//!
//! A single database file holds both the key/value entries and the turn
//! records, so one path is all a restarted process needs to resume.

use std::str::FromStr;

use async_trait::async_trait;
use continuum_core::{DurableKv, Role, StorageError, ToolCall, Turn, TurnStore};
use serde_json::Value;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

type TurnRow = (String, String, Option<String>, Option<String>, Option<String>);

fn internal(e: impl std::fmt::Display) -> StorageError {
    StorageError::Internal(e.to_string())
}

/// SQLite storage implementation.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database and ensure the schema exists.
    ///
    /// # Errors
    /// Returns error if database connection or migration fails.
    pub async fn new(database_url: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(internal)?
            .create_if_missing(true);

        // One connection keeps `sqlite::memory:` databases alive and
        // serializes writers.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(internal)?;

        sqlx::query("CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&pool)
            .await
            .map_err(internal)?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS turns (id TEXT PRIMARY KEY, role TEXT NOT NULL, content TEXT, tool_calls TEXT, tool_call_id TEXT)",
        )
        .execute(&pool)
        .await
        .map_err(internal)?;

        tracing::debug!(database_url, "SQLite store ready");
        Ok(Self { pool })
    }

    fn row_to_turn(row: TurnRow) -> Result<Turn, StorageError> {
        let (id, role, content, tool_calls, tool_call_id) = row;
        let tool_calls = tool_calls
            .map(|raw| serde_json::from_str::<Vec<ToolCall>>(&raw))
            .transpose()?;

        Ok(Turn {
            id,
            role: Role::from_str(&role).map_err(StorageError::Internal)?,
            content,
            tool_calls,
            tool_call_id,
        })
    }
}

#[async_trait]
impl DurableKv for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let raw: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(internal)?;

        raw.map(|r| serde_json::from_str(&r).map_err(StorageError::from))
            .transpose()
    }

    async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(&value)?;
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(encoded)
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT key, value FROM kv WHERE substr(key, 1, length(?)) = ? ORDER BY key",
        )
        .bind(prefix)
        .bind(prefix)
        .fetch_all(&self.pool)
        .await
        .map_err(internal)?;

        rows.into_iter()
            .map(|(k, v)| Ok((k, serde_json::from_str(&v)?)))
            .collect()
    }
}

#[async_trait]
impl TurnStore for SqliteStore {
    async fn upsert(&self, turn: &Turn) -> Result<(), StorageError> {
        let tool_calls = turn
            .tool_calls
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT OR REPLACE INTO turns (id, role, content, tool_calls, tool_call_id) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&turn.id)
        .bind(turn.role.as_str())
        .bind(turn.content.as_deref())
        .bind(tool_calls)
        .bind(turn.tool_call_id.as_deref())
        .execute(&self.pool)
        .await
        .map_err(internal)?;
        Ok(())
    }

    async fn get_many(&self, ids: &[String]) -> Result<Vec<Turn>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!(
            "SELECT id, role, content, tool_calls, tool_call_id FROM turns WHERE id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, TurnRow>(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await.map_err(internal)?;
        rows.into_iter().map(Self::row_to_turn).collect()
    }

    async fn count(&self) -> Result<usize, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM turns")
            .fetch_one(&self.pool)
            .await
            .map_err(internal)?;
        usize::try_from(count).map_err(internal)
    }
}
