//! Cross-tab synchronization.
//!
//! Every open instance of the storefront ("tab") shares one storage backend.
//! Writes made through a [`KeyValueStore`](crate::storage::KeyValueStore)
//! publish a [`StorageEvent`] on a [`SyncChannel`]; each tab runs a
//! [`CrossTabSync`] listener that reconciles its in-memory session with what
//! the other tabs wrote.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use tasty_bites_core::{Cart, CartLine, User};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::session::Store;
use crate::storage::keys;

/// Identity of one tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TabId(Uuid);

impl TabId {
    /// Generate a fresh tab identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TabId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A change to one persisted key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    /// Value after the change; `None` when the key was removed.
    pub new_value: Option<String>,
    pub old_value: Option<String>,
    /// Tab that made the change. `None` marks an explicit re-broadcast that
    /// every tab observes, including the sender.
    pub origin: Option<TabId>,
}

impl StorageEvent {
    /// Whether `tab` should react to this event. Tabs never see their own
    /// storage writes, only other tabs' writes and explicit re-broadcasts.
    #[must_use]
    pub fn is_visible_to(&self, tab: TabId) -> bool {
        self.origin != Some(tab)
    }
}

/// Pub/sub channel carrying [`StorageEvent`]s between tabs.
#[derive(Debug, Clone)]
pub struct SyncChannel {
    tx: broadcast::Sender<StorageEvent>,
}

impl SyncChannel {
    /// Create a channel buffering up to `capacity` undelivered events per
    /// subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish an event. Publishing with no subscribers is not an error.
    pub fn publish(&self, event: StorageEvent) {
        let _ = self.tx.send(event);
    }

    /// Subscribe to events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StorageEvent> {
        self.tx.subscribe()
    }
}

impl Default for SyncChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Handle to a running cross-tab listener. The listener stops when the
/// handle is dropped.
#[derive(Debug)]
pub struct CrossTabSync {
    handle: JoinHandle<()>,
}

impl CrossTabSync {
    /// Start reconciling `store` with events on `channel`.
    #[must_use]
    pub fn spawn(store: Store, channel: &SyncChannel) -> Self {
        let mut rx = channel.subscribe();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => apply_event(&store, &event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Cross-tab listener lagged; resyncing from storage");
                        resync_from_storage(&store);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Self { handle }
    }

    /// Whether the listener task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for CrossTabSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Reconcile `store` with one storage event.
pub(crate) fn apply_event(store: &Store, event: &StorageEvent) {
    if !event.is_visible_to(store.tab_id()) {
        return;
    }
    if store.is_loading() {
        tracing::debug!(key = %event.key, "Ignoring storage event during session hydration");
        return;
    }

    match event.key.as_str() {
        keys::TOKEN => apply_token(store, event.new_value.as_deref()),
        keys::USER => apply_user(store, event.new_value.as_deref()),
        keys::CART => apply_cart(store, event.new_value.as_deref()),
        _ => {}
    }
}

/// Reconcile `store` with the current persisted values after events were
/// missed.
pub(crate) fn resync_from_storage(store: &Store) {
    if store.is_loading() {
        return;
    }
    let storage = store.storage();
    apply_token(store, storage.get_string(keys::TOKEN).as_deref());
    apply_user(store, storage.get_string(keys::USER).as_deref());
    apply_cart(store, storage.get_string(keys::CART).as_deref());
}

fn apply_token(store: &Store, new_value: Option<&str>) {
    let local = store.snapshot().token;
    match new_value.filter(|v| !v.is_empty()) {
        None => {
            if local.is_some() {
                tracing::info!("Session ended in another tab");
                store.clear_session();
            }
        }
        Some(token) => {
            let differs = local
                .as_ref()
                .is_none_or(|current| current.expose_secret() != token);
            if differs {
                tracing::debug!("Adopting access token from another tab");
                store.adopt_token(Some(SecretString::from(token)));
            }
        }
    }
}

fn apply_user(store: &Store, new_value: Option<&str>) {
    let user = match new_value {
        None => None,
        Some(raw) => match serde_json::from_str::<User>(raw) {
            Ok(user) => Some(user),
            Err(e) => {
                tracing::error!(error = %e, "Ignoring malformed user from another tab");
                return;
            }
        },
    };
    if store.snapshot().user != user {
        store.adopt_user(user);
    }
}

fn apply_cart(store: &Store, new_value: Option<&str>) {
    let cart = match new_value {
        None => Cart::new(),
        Some(raw) => match serde_json::from_str::<serde_json::Value>(raw) {
            Ok(value @ serde_json::Value::Array(_)) => {
                match serde_json::from_value::<Vec<CartLine>>(value) {
                    Ok(lines) => Cart::from_lines(lines),
                    Err(e) => {
                        tracing::error!(error = %e, "Ignoring malformed cart from another tab");
                        return;
                    }
                }
            }
            Ok(_) => Cart::new(),
            Err(e) => {
                tracing::error!(error = %e, "Ignoring malformed cart from another tab");
                return;
            }
        },
    };
    if store.snapshot().cart != cart {
        store.adopt_cart(cart);
    }
}
