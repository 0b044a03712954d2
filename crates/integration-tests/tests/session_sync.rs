//! Session changes propagating between tabs.

#![allow(clippy::unwrap_used)]

use reqwest::{Method, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;
use tasty_bites_client::storage::keys;
use tasty_bites_client::testing::{TestTab, envelope, login_ok, refresh_ok};
use tasty_bites_client::{Credentials, CrossTabSync, Navigation};
use tasty_bites_core::{Email, OrderId};
use tasty_bites_integration_tests::{Browser, Tab, settle};

const THIRTY_MINUTES: i64 = 30 * 60 * 1000;

fn credentials() -> Credentials {
    Credentials {
        email: Email::parse("diner@example.com").unwrap(),
        password: SecretString::from("hunter22"),
    }
}

async fn log_in(tab: &Tab) {
    tab.transport.route(Method::POST, "/auth/login", |_| {
        (StatusCode::OK, login_ok("u1", "user", "t1", "r1", "30m"))
    });
    tab.store.login(&credentials()).await.unwrap();
}

fn token_of(tab: &TestTab) -> Option<String> {
    tab.store
        .snapshot()
        .token
        .map(|t| t.expose_secret().to_string())
}

#[tokio::test]
async fn test_login_propagates_to_open_tabs() {
    let browser = Browser::new();
    let a = browser.open_tab().await;
    let b = browser.open_tab().await;
    assert!(!b.store.snapshot().is_authenticated());

    log_in(&a).await;
    settle().await;

    let state = b.store.snapshot();
    assert!(state.is_authenticated());
    assert_eq!(token_of(&b).as_deref(), Some("t1"));
    assert_eq!(state.user.unwrap().id.as_str(), "u1");
    // No request was made from the other tab
    assert_eq!(b.transport.count("/auth/"), 0);
}

#[tokio::test]
async fn test_logout_in_one_tab_ends_session_everywhere() {
    let browser = Browser::new();
    let a = browser.open_tab().await;
    let b = browser.open_tab().await;
    log_in(&a).await;
    settle().await;
    assert!(b.store.snapshot().is_authenticated());

    b.store.logout();
    settle().await;

    assert!(!a.store.snapshot().is_authenticated());
    assert!(a.store.snapshot().token.is_none());
    for key in keys::AUTH_KEYS {
        assert!(a.storage.get_string(key).is_none(), "{key} still stored");
    }
}

#[tokio::test]
async fn test_refresh_in_one_tab_is_adopted_by_others() {
    let browser = Browser::new();
    let a = browser.open_tab().await;
    let b = browser.open_tab().await;
    log_in(&a).await;
    settle().await;

    a.transport.route(Method::GET, "/orders/", |req| {
        if req.bearer().map(ExposeSecret::expose_secret) == Some("t2") {
            (StatusCode::OK, envelope(json!({ "_id": "o1", "status": "pending" })))
        } else {
            (StatusCode::UNAUTHORIZED, json!({ "success": false, "message": "jwt expired" }))
        }
    });
    a.transport.route(Method::POST, "/auth/refresh-token", |_| {
        (StatusCode::OK, refresh_ok("t2", "r2", TestTab::NOW + THIRTY_MINUTES))
    });

    let order = a.orders.get(&OrderId::new("o1")).await.unwrap();
    assert_eq!(order.id.as_str(), "o1");
    settle().await;

    // Both tabs hold the rotated token; storage holds the rotated pair.
    assert_eq!(token_of(&a).as_deref(), Some("t2"));
    assert_eq!(token_of(&b).as_deref(), Some("t2"));
    assert_eq!(a.storage.get_string(keys::REFRESH_TOKEN).as_deref(), Some("r2"));
    assert!(b.store.snapshot().is_authenticated());

    // The other tab's next request is sent with the rotated token.
    b.transport.route(Method::GET, "/orders/", |_| {
        (StatusCode::OK, envelope(json!({ "_id": "o2" })))
    });
    b.orders.get(&OrderId::new("o2")).await.unwrap();
    let sent = b.transport.calls().pop().unwrap();
    assert_eq!(sent.bearer().unwrap().expose_secret(), "t2");
    assert_eq!(b.transport.count("/auth/refresh-token"), 0);
}

#[tokio::test]
async fn test_failed_refresh_logs_out_every_tab() {
    let browser = Browser::new();
    let a = browser.open_tab().await;
    let b = browser.open_tab().await;
    log_in(&a).await;
    settle().await;

    let mut navigation = a.api.navigation();
    a.transport.route(Method::GET, "/orders/", |_| {
        (StatusCode::UNAUTHORIZED, json!({ "success": false, "message": "jwt expired" }))
    });
    a.transport.route(Method::POST, "/auth/refresh-token", |_| {
        (StatusCode::UNAUTHORIZED, json!({ "success": false, "message": "refresh token revoked" }))
    });

    let err = a.orders.get(&OrderId::new("o1")).await.unwrap_err();
    assert!(err.is_session_error());
    settle().await;

    assert_eq!(navigation.try_recv().unwrap(), Navigation::Login);
    assert!(navigation.try_recv().is_err());
    for tab in [&a, &b] {
        let state = tab.store.snapshot();
        assert!(state.token.is_none());
        assert!(state.user.is_none());
    }
    for key in keys::AUTH_KEYS {
        assert!(b.storage.get_string(key).is_none(), "{key} still stored");
    }
}

#[tokio::test]
async fn test_events_during_hydration_are_ignored() {
    let browser = Browser::new();
    let a = browser.open_tab().await;

    // A tab that is still hydrating its session.
    let late = TestTab::sharing(&browser.backend, &browser.channel);
    let _sync = CrossTabSync::spawn(late.store.clone(), &browser.channel);

    log_in(&a).await;
    settle().await;
    let state = late.store.snapshot();
    assert!(state.is_session_loading);
    assert!(state.token.is_none());

    // Hydration then reads the session straight from storage.
    late.store.initialize().await;
    assert!(late.store.snapshot().is_authenticated());
    assert_eq!(token_of(&late).as_deref(), Some("t1"));
}

#[tokio::test]
async fn test_tab_opened_later_hydrates_session() {
    let browser = Browser::new();
    let a = browser.open_tab().await;
    log_in(&a).await;

    let c = browser.open_tab().await;
    let state = c.store.snapshot();
    assert!(!state.is_session_loading);
    assert!(state.is_authenticated());
    assert_eq!(
        c.store.remaining_display().as_deref(),
        Some("30m"),
    );
}
