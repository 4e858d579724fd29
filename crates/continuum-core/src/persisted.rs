//! Typed views over a [`DurableKv`].
//!
//! `ScopedKv` confines a component to its own key prefix. `PersistedCell`
//! is a single typed field inside a scope with a read-through cache: reads
//! hand out clones, and the only way to change the stored value is an
//! explicit `set`, so in-place mutation can never silently diverge from
//! storage.

use std::sync::Arc;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::traits::{DurableKv, StorageError};

/// A stored value that names another namespace.
///
/// Resolve it explicitly with [`ScopedKv::open`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRef {
    pub namespace: String,
}

/// A [`DurableKv`] handle restricted to one key prefix.
#[derive(Clone)]
pub struct ScopedKv {
    kv: Arc<dyn DurableKv>,
    prefix: String,
}

impl std::fmt::Debug for ScopedKv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedKv")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

impl ScopedKv {
    /// Create a scope over `kv` using `prefix`.
    #[must_use]
    pub fn new(kv: Arc<dyn DurableKv>, prefix: impl Into<String>) -> Self {
        Self {
            kv,
            prefix: prefix.into(),
        }
    }

    /// Open the namespace a [`NamespaceRef`] points at.
    #[must_use]
    pub fn open(kv: Arc<dyn DurableKv>, reference: &NamespaceRef) -> Self {
        Self::new(kv, reference.namespace.clone())
    }

    /// Nested scope `<prefix><name>_`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self::new(Arc::clone(&self.kv), format!("{}{name}_", self.prefix))
    }

    /// A reference to this scope that can be stored as a value.
    #[must_use]
    pub fn reference(&self) -> NamespaceRef {
        NamespaceRef {
            namespace: self.prefix.clone(),
        }
    }

    /// The key prefix.
    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn key(&self, field: &str) -> String {
        format!("{}{field}", self.prefix)
    }

    /// Read a raw field.
    ///
    /// # Errors
    /// Returns error if the backing store fails.
    pub async fn get(&self, field: &str) -> Result<Option<Value>, StorageError> {
        self.kv.get(&self.key(field)).await
    }

    /// Write a raw field.
    ///
    /// # Errors
    /// Returns error if the backing store fails.
    pub async fn put(&self, field: &str, value: Value) -> Result<(), StorageError> {
        self.kv.put(&self.key(field), value).await
    }

    /// Delete a field.
    ///
    /// # Errors
    /// Returns error if the backing store fails.
    pub async fn delete(&self, field: &str) -> Result<bool, StorageError> {
        self.kv.delete(&self.key(field)).await
    }

    /// List the fields of this scope, with the prefix stripped.
    ///
    /// # Errors
    /// Returns error if the backing store fails.
    pub async fn list(&self) -> Result<Vec<(String, Value)>, StorageError> {
        let entries = self.kv.list(&self.prefix).await?;
        Ok(entries
            .into_iter()
            .filter_map(|(k, v)| k.strip_prefix(&self.prefix).map(|f| (f.to_string(), v)))
            .collect())
    }

    /// Read and decode a typed field.
    ///
    /// # Errors
    /// Returns error if the store fails or the value does not decode.
    pub async fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<Option<T>, StorageError> {
        match self.get(field).await? {
            Some(v) => Ok(Some(serde_json::from_value(v)?)),
            None => Ok(None),
        }
    }

    /// Encode and write a typed field.
    ///
    /// # Errors
    /// Returns error if the store fails or the value does not encode.
    pub async fn put_as<T: Serialize + Sync>(&self, field: &str, value: &T) -> Result<(), StorageError> {
        self.put(field, serde_json::to_value(value)?).await
    }
}

/// One typed field of a [`ScopedKv`] with a read-through cache.
pub struct PersistedCell<T> {
    scope: ScopedKv,
    field: String,
    // `None` until the first read; `Some(None)` once known absent.
    cache: Option<Option<T>>,
}

impl<T> PersistedCell<T>
where
    T: Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync,
{
    /// Bind a cell to `field` in `scope`.
    #[must_use]
    pub fn new(scope: ScopedKv, field: impl Into<String>) -> Self {
        Self {
            scope,
            field: field.into(),
            cache: None,
        }
    }

    /// Current value, loading it from storage on first access.
    ///
    /// # Errors
    /// Returns error if the store fails or the value does not decode.
    pub async fn get(&mut self) -> Result<Option<T>, StorageError> {
        if let Some(cached) = &self.cache {
            return Ok(cached.clone());
        }
        let loaded = self.scope.get_as::<T>(&self.field).await?;
        self.cache = Some(loaded.clone());
        Ok(loaded)
    }

    /// Current value, or `default` if nothing is stored.
    ///
    /// # Errors
    /// Returns error if the store fails or the value does not decode.
    pub async fn get_or(&mut self, default: T) -> Result<T, StorageError> {
        Ok(self.get().await?.unwrap_or(default))
    }

    /// Store a new value. Unchanged values are not rewritten.
    ///
    /// Returns whether a write happened. The cache is only updated once
    /// the write succeeds.
    ///
    /// # Errors
    /// Returns error if the store fails or the value does not encode.
    pub async fn set(&mut self, value: T) -> Result<bool, StorageError> {
        if matches!(&self.cache, Some(Some(cached)) if *cached == value) {
            return Ok(false);
        }
        self.scope.put_as(&self.field, &value).await?;
        self.cache = Some(Some(value));
        Ok(true)
    }

    /// Remove the stored value.
    ///
    /// # Errors
    /// Returns error if the backing store fails.
    pub async fn clear(&mut self) -> Result<(), StorageError> {
        self.scope.delete(&self.field).await?;
        self.cache = Some(None);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::BTreeMap,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;

    use super::*;

    #[derive(Default)]
    struct CountingKv {
        map: Mutex<BTreeMap<String, Value>>,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl DurableKv for CountingKv {
        async fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
            Ok(self.map.lock().unwrap().get(key).cloned())
        }

        async fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            self.map.lock().unwrap().insert(key.to_string(), value);
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<bool, StorageError> {
            Ok(self.map.lock().unwrap().remove(key).is_some())
        }

        async fn list(&self, prefix: &str) -> Result<Vec<(String, Value)>, StorageError> {
            Ok(self
                .map
                .lock()
                .unwrap()
                .iter()
                .filter(|(k, _)| k.starts_with(prefix))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_scopes_do_not_collide() {
        let kv: Arc<dyn DurableKv> = Arc::new(CountingKv::default());
        let a = ScopedKv::new(Arc::clone(&kv), "state_");
        let b = ScopedKv::new(Arc::clone(&kv), "memory_");

        tokio_test::assert_ok!(a.put("seq", Value::from(7)).await);
        tokio_test::assert_ok!(b.put("seq", Value::from(9)).await);

        assert_eq!(a.get("seq").await.unwrap(), Some(Value::from(7)));
        let fields = b.list().await.unwrap();
        assert_eq!(fields, vec![("seq".to_string(), Value::from(9))]);
    }

    #[tokio::test]
    async fn test_cell_skips_unchanged_writes() {
        let backing = Arc::new(CountingKv::default());
        let kv: Arc<dyn DurableKv> = backing.clone();
        let mut cell: PersistedCell<Vec<String>> =
            PersistedCell::new(ScopedKv::new(kv, "memory_"), "window");

        assert_eq!(cell.get().await.unwrap(), None);
        assert!(cell.set(vec!["a".into()]).await.unwrap());
        assert!(!cell.set(vec!["a".into()]).await.unwrap());
        assert_eq!(backing.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cell_reads_through_after_restart() {
        let kv: Arc<dyn DurableKv> = Arc::new(CountingKv::default());
        {
            let mut cell = PersistedCell::new(ScopedKv::new(Arc::clone(&kv), "info_"), "user");
            cell.set("u1".to_string()).await.unwrap();
        }
        let mut reopened: PersistedCell<String> =
            PersistedCell::new(ScopedKv::new(kv, "info_"), "user");
        assert_eq!(reopened.get().await.unwrap().as_deref(), Some("u1"));

        reopened.clear().await.unwrap();
        assert_eq!(reopened.get_or("none".into()).await.unwrap(), "none");
    }

    #[tokio::test]
    async fn test_namespace_reference_resolves() {
        let kv: Arc<dyn DurableKv> = Arc::new(CountingKv::default());
        let parent = ScopedKv::new(Arc::clone(&kv), "agent_");
        let nested = parent.child("blocks");
        nested.put("persona", Value::from("curious")).await.unwrap();

        parent.put_as("blocks", &nested.reference()).await.unwrap();

        let reference: NamespaceRef = parent.get_as("blocks").await.unwrap().unwrap();
        let opened = ScopedKv::open(kv, &reference);
        assert_eq!(opened.prefix(), "agent_blocks_");
        assert_eq!(opened.get("persona").await.unwrap(), Some(Value::from("curious")));
    }
}
