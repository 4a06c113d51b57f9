//! Storage area — the key/value transport under the whiteboard channel.
//!
//! DESIGN
//! ======
//! `KeyValueStore` mirrors the browser local-storage contract: string keys,
//! string values, synchronous reads and writes, key enumeration, and an
//! optional change feed. The channel only talks to this trait, so the
//! transport can be swapped without touching sync logic.
//!
//! `LocalStore` is the in-process implementation. One `LocalStore` plays
//! the role of a browser origin; every `tab()` handle is one browsing
//! context. Like browser `storage` events, a handle never sees change
//! notifications for writes it made itself.
//!
//! TRADE-OFFS
//! ==========
//! The change feed is a bounded broadcast channel. A lagging subscriber
//! loses events rather than blocking writers; the channel's periodic resync
//! covers anything missed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

#[cfg(test)]
#[path = "storage_test.rs"]
mod tests;

const EVENT_CAPACITY: usize = 256;

/// Browsers typically allow about 5 MiB per origin.
pub const DEFAULT_QUOTA_BYTES: usize = 5 * 1024 * 1024;

// =============================================================================
// ERROR TYPE
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("storage quota exceeded ({required} bytes needed, quota {quota})")]
    QuotaExceeded { quota: usize, required: usize },
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

// =============================================================================
// CHANGE FEED
// =============================================================================

/// A key changed. `new_value` is `None` when the key was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub new_value: Option<String>,
    /// Handle that made the change.
    pub origin: Uuid,
}

/// Change feed for one handle. Skips events the handle produced itself.
pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    origin: Uuid,
}

impl StorageEvents {
    /// Wait for the next foreign change. Returns `None` once the store is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.origin => {}
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "storage: change feed lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

// =============================================================================
// TRAIT
// =============================================================================

/// Local-storage-shaped key/value store.
pub trait KeyValueStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns an error if the write would exceed the quota or the store is
    /// unavailable.
    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns an error if the store cannot be enumerated.
    fn keys(&self) -> Result<Vec<String>, StorageError>;

    /// Change notifications from other handles, if the store has any.
    fn subscribe(&self) -> Option<StorageEvents> {
        None
    }
}

// =============================================================================
// LOCAL STORE
// =============================================================================

struct StoreInner {
    items: HashMap<String, String>,
    /// Summed byte length of all keys and values.
    used: usize,
}

/// In-process storage area shared by every handle cloned or tabbed from it.
#[derive(Clone)]
pub struct LocalStore {
    inner: Arc<Mutex<StoreInner>>,
    events: broadcast::Sender<StorageEvent>,
    origin: Uuid,
    quota: Option<usize>,
}

impl LocalStore {
    /// Unbounded store.
    #[must_use]
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Store that rejects writes once keys plus values exceed `quota` bytes.
    #[must_use]
    pub fn with_quota(quota: usize) -> Self {
        Self::build(Some(quota))
    }

    fn build(quota: Option<usize>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(StoreInner { items: HashMap::new(), used: 0 })),
            events,
            origin: Uuid::new_v4(),
            quota,
        }
    }

    /// New handle on the same storage area with its own origin.
    #[must_use]
    pub fn tab(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            origin: Uuid::new_v4(),
            quota: self.quota,
        }
    }

    #[must_use]
    pub fn origin(&self) -> Uuid {
        self.origin
    }

    /// Bytes currently in use.
    #[must_use]
    pub fn used_bytes(&self) -> usize {
        self.lock().used
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, key: &str, new_value: Option<&str>) {
        // No subscribers is fine.
        let _ = self.events.send(StorageEvent {
            key: key.to_owned(),
            new_value: new_value.map(str::to_owned),
            origin: self.origin,
        });
    }
}

impl Default for LocalStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for LocalStore {
    fn get_item(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.lock().items.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        {
            let mut inner = self.lock();
            let previous = inner.items.get(key).map_or(0, |old| key.len() + old.len());
            let required = inner.used - previous + key.len() + value.len();
            if let Some(quota) = self.quota {
                if required > quota {
                    return Err(StorageError::QuotaExceeded { quota, required });
                }
            }
            inner.items.insert(key.to_owned(), value.to_owned());
            inner.used = required;
        }
        self.notify(key, Some(value));
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let removed = {
            let mut inner = self.lock();
            let removed = inner.items.remove(key);
            if let Some(old) = &removed {
                inner.used -= key.len() + old.len();
            }
            removed.is_some()
        };
        if removed {
            self.notify(key, None);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys: Vec<String> = self.lock().items.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn subscribe(&self) -> Option<StorageEvents> {
        Some(StorageEvents { rx: self.events.subscribe(), origin: self.origin })
    }
}
