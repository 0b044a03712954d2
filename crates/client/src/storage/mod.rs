//! Persistent key-value storage.
//!
//! [`KeyValueStore`] is the only way the rest of the crate touches persisted
//! state. It never fails: every backend error is logged and degraded to
//! `None`, `false`, or a no-op, so callers keep working in memory when storage
//! is full, corrupt, or switched off.
//!
//! Successful writes announce themselves on the attached
//! [`SyncChannel`](crate::sync::SyncChannel), which is how other tabs learn
//! about them.

mod backend;

pub use backend::{FileBackend, MemoryBackend, StorageBackend};

use std::sync::Arc;

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::sync::{StorageEvent, SyncChannel, TabId};

/// Keys of the persisted entries.
pub mod keys {
    /// Cart lines (JSON array).
    pub const CART: &str = "cart";
    /// Access token (raw string).
    pub const TOKEN: &str = "token";
    /// Refresh token (raw string).
    pub const REFRESH_TOKEN: &str = "refreshToken";
    /// Access token expiry in epoch milliseconds (raw string).
    pub const TOKEN_EXPIRY: &str = "tokenExpiry";
    /// User profile (JSON object).
    pub const USER: &str = "user";

    /// The four entries that together make up a persisted session.
    pub const AUTH_KEYS: [&str; 4] = [TOKEN, REFRESH_TOKEN, TOKEN_EXPIRY, USER];
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The write would exceed the backend's capacity.
    #[error("storage quota exceeded writing {key} ({needed} bytes needed, {limit} allowed)")]
    QuotaExceeded {
        key: String,
        needed: usize,
        limit: usize,
    },

    /// Storage is disabled or its lock was poisoned.
    #[error("storage is unavailable")]
    Unavailable,

    /// Filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value (or the backing document) is not valid JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failure-tolerant adapter over a [`StorageBackend`].
///
/// Cheap to clone; clones share the backend, the tab identity, and the sync
/// channel.
#[derive(Clone)]
pub struct KeyValueStore {
    backend: Arc<dyn StorageBackend>,
    tab: TabId,
    sync: Option<SyncChannel>,
}

impl std::fmt::Debug for KeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueStore")
            .field("tab", &self.tab)
            .field("sync", &self.sync.is_some())
            .finish_non_exhaustive()
    }
}

impl KeyValueStore {
    /// Wrap a backend for a fresh tab with no sync channel.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            tab: TabId::new(),
            sync: None,
        }
    }

    /// Announce successful writes on `channel`.
    #[must_use]
    pub fn with_sync(mut self, channel: SyncChannel) -> Self {
        self.sync = Some(channel);
        self
    }

    /// Identity of the tab this adapter writes on behalf of.
    #[must_use]
    pub const fn tab_id(&self) -> TabId {
        self.tab
    }

    /// The attached sync channel, if any.
    #[must_use]
    pub const fn sync_channel(&self) -> Option<&SyncChannel> {
        self.sync.as_ref()
    }

    /// Read a raw string value.
    #[must_use]
    pub fn get_string(&self, key: &str) -> Option<String> {
        match self.backend.get_item(key) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!(key, error = %e, "Error reading from storage");
                None
            }
        }
    }

    /// Write a raw string value. Returns `false` if the write failed.
    pub fn set_string(&self, key: &str, value: &str) -> bool {
        let old_value = self.backend.get_item(key).ok().flatten();
        match self.backend.set_item(key, value) {
            Ok(()) => {
                self.announce(key, Some(value.to_string()), old_value);
                true
            }
            Err(e) => {
                tracing::error!(key, error = %e, "Error saving to storage");
                false
            }
        }
    }

    /// Read and deserialize a JSON value. Missing, unreadable, and malformed
    /// entries all read as `None`.
    #[must_use]
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(key, error = %e, "Error parsing stored JSON");
                None
            }
        }
    }

    /// Serialize and write a JSON value. Returns `false` if serialization or
    /// the write failed.
    pub fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        match serde_json::to_string(value) {
            Ok(raw) => self.set_string(key, &raw),
            Err(e) => {
                tracing::error!(key, error = %e, "Error serializing value for storage");
                false
            }
        }
    }

    /// Delete an entry. Failures are logged and otherwise ignored.
    pub fn remove(&self, key: &str) {
        let old_value = self.backend.get_item(key).ok().flatten();
        match self.backend.remove_item(key) {
            Ok(()) => {
                if old_value.is_some() {
                    self.announce(key, None, old_value);
                }
            }
            Err(e) => tracing::error!(key, error = %e, "Error removing from storage"),
        }
    }

    /// Delete all four session entries.
    pub fn purge_auth(&self) {
        for key in keys::AUTH_KEYS {
            self.remove(key);
        }
    }

    /// Publish an event every tab (including this one) observes.
    pub fn broadcast(&self, key: &str, new_value: Option<String>) {
        if let Some(sync) = &self.sync {
            sync.publish(StorageEvent {
                key: key.to_string(),
                new_value,
                old_value: None,
                origin: None,
            });
        }
    }

    fn announce(&self, key: &str, new_value: Option<String>, old_value: Option<String>) {
        if let Some(sync) = &self.sync {
            sync.publish(StorageEvent {
                key: key.to_string(),
                new_value,
                old_value,
                origin: Some(self.tab),
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tasty_bites_core::{Cart, CartLine, Price};

    use super::*;

    fn store() -> (KeyValueStore, MemoryBackend) {
        let backend = MemoryBackend::new();
        (KeyValueStore::new(Arc::new(backend.clone())), backend)
    }

    #[test]
    fn test_string_round_trip() {
        let (kv, _) = store();
        assert!(kv.set_string(keys::TOKEN, "abc"));
        assert_eq!(kv.get_string(keys::TOKEN).as_deref(), Some("abc"));
        kv.remove(keys::TOKEN);
        assert!(kv.get_string(keys::TOKEN).is_none());
    }

    #[test]
    fn test_cart_round_trip() {
        let (kv, _) = store();
        let mut cart = Cart::new();
        cart.add_item(CartLine::new("a", "Pho", Price::default()));
        cart.add_item(CartLine::new("b", "Banh mi", Price::default()).with_image("/b.png"));
        cart.add_item(CartLine::new("a", "Pho", Price::default()));

        assert!(kv.set_json(keys::CART, &cart));
        let restored: Cart = kv.get_json(keys::CART).unwrap();
        assert_eq!(restored, cart);
    }

    #[test]
    fn test_malformed_json_reads_as_none() {
        let (kv, backend) = store();
        backend.set_item(keys::USER, "{oops").unwrap();
        assert!(kv.get_json::<serde_json::Value>(keys::USER).is_none());
    }

    #[test]
    fn test_failures_degrade() {
        let backend = MemoryBackend::with_quota(8);
        let kv = KeyValueStore::new(Arc::new(backend.clone()));
        assert!(!kv.set_string(keys::TOKEN, "a-very-long-access-token"));
        assert!(kv.get_string(keys::TOKEN).is_none());

        backend.set_disabled(true);
        assert!(!kv.set_string("k", "v"));
        assert!(kv.get_string("k").is_none());
        kv.remove("k");
        kv.purge_auth();
    }

    #[test]
    fn test_writes_announce_with_origin() {
        let channel = SyncChannel::new(16);
        let mut rx = channel.subscribe();
        let (kv, _) = store();
        let kv = kv.with_sync(channel);

        kv.set_string(keys::TOKEN, "t1");
        kv.set_string(keys::TOKEN, "t2");
        kv.remove(keys::TOKEN);
        // Removing an absent key is silent
        kv.remove(keys::TOKEN);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.new_value.as_deref(), Some("t1"));
        assert_eq!(first.origin, Some(kv.tab_id()));

        let second = rx.try_recv().unwrap();
        assert_eq!(second.old_value.as_deref(), Some("t1"));

        let removed = rx.try_recv().unwrap();
        assert!(removed.new_value.is_none());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_broadcast_has_no_origin() {
        let channel = SyncChannel::new(4);
        let mut rx = channel.subscribe();
        let (kv, _) = store();
        let kv = kv.with_sync(channel);

        kv.broadcast(keys::TOKEN, Some("fresh".to_string()));
        let event = rx.try_recv().unwrap();
        assert!(event.origin.is_none());
        assert!(event.is_visible_to(kv.tab_id()));
    }
}
