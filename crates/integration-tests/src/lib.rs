//! Integration tests for the Tasty Bites client.
//!
//! These tests drive several tabs over one shared storage backend and one
//! sync channel, the way several open windows of the storefront share
//! browser storage. Nothing here needs a running backend: every tab talks
//! to its own scripted transport.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p tasty-bites-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `session_sync` - Login, logout, and refresh propagating between tabs
//! - `cart_sync` - Cart edits propagating between tabs and across restarts
//! - `persistence` - File-backed sessions surviving a restart

use std::time::Duration;

use tasty_bites_client::testing::TestTab;
use tasty_bites_client::{CrossTabSync, MemoryBackend, SyncChannel};

/// One simulated browser: a shared backend and channel that tabs open onto.
pub struct Browser {
    pub backend: MemoryBackend,
    pub channel: SyncChannel,
}

/// A tab with its cross-tab listener running.
pub struct Tab {
    pub tab: TestTab,
    _sync: CrossTabSync,
}

impl std::ops::Deref for Tab {
    type Target = TestTab;

    fn deref(&self) -> &TestTab {
        &self.tab
    }
}

impl Browser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            backend: MemoryBackend::new(),
            channel: SyncChannel::new(256),
        }
    }

    /// Open a tab: wire it, start its listener, and hydrate its session.
    pub async fn open_tab(&self) -> Tab {
        let tab = TestTab::sharing(&self.backend, &self.channel);
        let sync = CrossTabSync::spawn(tab.store.clone(), &self.channel);
        tab.store.initialize().await;
        Tab { tab, _sync: sync }
    }
}

impl Default for Browser {
    fn default() -> Self {
        Self::new()
    }
}

/// Give listener tasks a chance to drain the sync channel.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}
