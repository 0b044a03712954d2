//! File-backed sessions surviving a restart.

#![allow(clippy::unwrap_used)]

use std::path::Path;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use tasty_bites_client::storage::keys;
use tasty_bites_client::testing::{FakeTransport, ManualClock, TestTab, login_ok};
use tasty_bites_client::{
    ApiClient, Credentials, FileBackend, HttpConfig, KeyValueStore, SessionConfig, Store,
};
use tasty_bites_core::{CartLine, Email, Price};

const THIRTY_MINUTES: i64 = 30 * 60 * 1000;

/// One process run over the storage file at `path`.
fn open(path: &Path, clock: &ManualClock) -> (Store, FakeTransport) {
    let transport = FakeTransport::new();
    let storage = KeyValueStore::new(Arc::new(FileBackend::new(path)));
    let api = ApiClient::new(
        Arc::new(transport.clone()),
        storage,
        Arc::new(clock.clone()),
        HttpConfig::default(),
    );
    let store = Store::new(api, Arc::new(clock.clone()), SessionConfig::default());
    (store, transport)
}

async fn log_in(store: &Store, transport: &FakeTransport) {
    transport.route(Method::POST, "/auth/login", |_| {
        (StatusCode::OK, login_ok("u1", "admin", "t1", "r1", "30m"))
    });
    let credentials = Credentials {
        email: Email::parse("owner@example.com").unwrap(),
        password: SecretString::from("hunter22"),
    };
    store.login(&credentials).await.unwrap();
}

#[tokio::test]
async fn test_session_and_cart_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let clock = ManualClock::new(TestTab::NOW);

    {
        let (store, transport) = open(&path, &clock);
        store.initialize().await;
        log_in(&store, &transport).await;
        store.add_item(CartLine::new("pho", "Pho Bo", Price::new(Decimal::new(6_50, 2))));
    }

    clock.advance(10 * 60 * 1000);
    let (store, _transport) = open(&path, &clock);
    assert_eq!(store.snapshot().cart.len(), 1);
    store.initialize().await;

    let state = store.snapshot();
    assert!(state.is_authenticated());
    assert!(state.is_admin());
    assert_eq!(store.remaining_display().as_deref(), Some("20m"));
    assert!(store.cart_restore_notice().is_some());
}

#[tokio::test]
async fn test_expired_session_purged_on_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("storage.json");
    let clock = ManualClock::new(TestTab::NOW);

    {
        let (store, transport) = open(&path, &clock);
        store.initialize().await;
        log_in(&store, &transport).await;
        store.add_item(CartLine::new("pho", "Pho Bo", Price::new(Decimal::new(6_50, 2))));
    }

    clock.advance(THIRTY_MINUTES);
    let (store, _transport) = open(&path, &clock);
    store.initialize().await;

    let state = store.snapshot();
    assert!(!state.is_session_loading);
    assert!(state.token.is_none());
    assert_eq!(state.cart.len(), 1);
    assert!(store.cart_restore_notice().is_none());

    for key in keys::AUTH_KEYS {
        assert!(store.storage().get_string(key).is_none(), "{key} still stored");
    }
    assert!(store.storage().get_string(keys::CART).is_some());
}
