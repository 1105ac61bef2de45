//! Flat key/value backing storage for mod variables.
//!
//! Mirrors the browser extension storage areas: `Local` holds purely
//! local state, `Synchronized` holds entries that must be observable from
//! other frames/tabs. Writes to the synchronized area are broadcast to
//! subscribers; delivery across contexts is eventual and unordered.

use crate::errors::BrickflowError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Which storage area backs an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageArea {
    /// Local-only state, cleaned up by normal teardown.
    Local,
    /// Cross-context state, broadcast on write and deleted explicitly.
    Synchronized,
}

/// A change notification for a synchronized entry.
#[derive(Debug, Clone)]
pub struct StorageEvent {
    /// The namespaced storage key.
    pub key: String,
    /// The new value, or `None` for a removal.
    pub value: Option<Value>,
}

type Listener = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Async key/value storage with local and synchronized areas.
#[async_trait]
pub trait VariableStore: Send + Sync {
    /// Reads an entry.
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>, BrickflowError>;

    /// Writes an entry. Synchronized writes are broadcast.
    async fn set(&self, area: StorageArea, key: &str, value: Value) -> Result<(), BrickflowError>;

    /// Removes an entry. Synchronized removals are broadcast.
    async fn remove(&self, area: StorageArea, key: &str) -> Result<(), BrickflowError>;

    /// Lists the keys currently present in an area.
    async fn keys(&self, area: StorageArea) -> Result<Vec<String>, BrickflowError>;

    /// Subscribes to synchronized-area changes.
    ///
    /// The subscription is dropped-based: the listener stops firing when
    /// the returned handle is dropped.
    fn subscribe(&self, listener: Listener) -> Subscription;
}

/// An explicit subscription handle; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    listeners: Weak<RwLock<HashMap<u64, Listener>>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.write().remove(&self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

/// In-memory store used in tests and single-context deployments.
#[derive(Default)]
pub struct MemoryStore {
    local: RwLock<HashMap<String, Value>>,
    synchronized: RwLock<HashMap<String, Value>>,
    listeners: Arc<RwLock<HashMap<u64, Listener>>>,
    next_listener_id: AtomicU64,
}

impl MemoryStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn area(&self, area: StorageArea) -> &RwLock<HashMap<String, Value>> {
        match area {
            StorageArea::Local => &self.local,
            StorageArea::Synchronized => &self.synchronized,
        }
    }

    fn broadcast(&self, key: &str, value: Option<Value>) {
        let event = StorageEvent {
            key: key.to_string(),
            value,
        };
        let listeners: Vec<Listener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(&event);
        }
    }
}

#[async_trait]
impl VariableStore for MemoryStore {
    async fn get(&self, area: StorageArea, key: &str) -> Result<Option<Value>, BrickflowError> {
        Ok(self.area(area).read().get(key).cloned())
    }

    async fn set(&self, area: StorageArea, key: &str, value: Value) -> Result<(), BrickflowError> {
        self.area(area).write().insert(key.to_string(), value.clone());
        if area == StorageArea::Synchronized {
            self.broadcast(key, Some(value));
        }
        Ok(())
    }

    async fn remove(&self, area: StorageArea, key: &str) -> Result<(), BrickflowError> {
        let removed = self.area(area).write().remove(key);
        if area == StorageArea::Synchronized && removed.is_some() {
            self.broadcast(key, None);
        }
        Ok(())
    }

    async fn keys(&self, area: StorageArea) -> Result<Vec<String>, BrickflowError> {
        Ok(self.area(area).read().keys().cloned().collect())
    }

    fn subscribe(&self, listener: Listener) -> Subscription {
        let id = self.next_listener_id.fetch_add(1, Ordering::SeqCst);
        self.listeners.write().insert(id, listener);
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("local_entries", &self.local.read().len())
            .field("synchronized_entries", &self.synchronized.read().len())
            .field("listeners", &self.listeners.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        store
            .set(StorageArea::Local, "mod/a", json!({"x": 1}))
            .await
            .unwrap();

        let value = store.get(StorageArea::Local, "mod/a").await.unwrap();
        assert_eq!(value, Some(json!({"x": 1})));
    }

    #[tokio::test]
    async fn test_areas_are_disjoint() {
        let store = MemoryStore::new();
        store
            .set(StorageArea::Local, "k", json!(1))
            .await
            .unwrap();

        assert!(store.get(StorageArea::Synchronized, "k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_synchronized_writes_broadcast() {
        let store = MemoryStore::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let subscription = store.subscribe(Arc::new(move |event| {
            assert_eq!(event.key, "mod/a");
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        store
            .set(StorageArea::Synchronized, "mod/a", json!(1))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        // Local writes are not broadcast.
        store.set(StorageArea::Local, "mod/a", json!(2)).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        drop(subscription);
        store
            .set(StorageArea::Synchronized, "mod/a", json!(3))
            .await
            .unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
