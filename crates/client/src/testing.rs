//! Test doubles: a scripted transport, a hand-driven clock, and a harness
//! that wires one "tab" together.
//!
//! Available to this crate's tests and, with the `test-util` feature, to
//! other crates' tests.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Method, StatusCode};
use serde_json::{Value, json};

use crate::clock::Clock;
use crate::config::{HttpConfig, SessionConfig};
use crate::http::{ApiClient, ApiRequest, ApiResponse, Transport, TransportError};
use crate::services::{AuthService, CatalogService, OrderService, PaymentService};
use crate::session::Store;
use crate::storage::{KeyValueStore, MemoryBackend};
use crate::sync::SyncChannel;

// =============================================================================
// Clock
// =============================================================================

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn new(now_ms: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: i64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

// =============================================================================
// Transport
// =============================================================================

type Handler = Arc<dyn Fn(&ApiRequest) -> (StatusCode, Value) + Send + Sync>;

struct Route {
    method: Method,
    prefix: String,
    delay: Option<Duration>,
    handler: Handler,
}

#[derive(Default)]
struct FakeInner {
    routes: Vec<Route>,
    calls: Vec<ApiRequest>,
}

/// Scripted transport.
///
/// Requests are answered by the route with the longest path prefix matching
/// the request's method; among equal prefixes the latest registration wins.
/// Unrouted requests fail as a connection error. Every request is recorded.
#[derive(Clone, Default)]
pub struct FakeTransport {
    inner: Arc<Mutex<FakeInner>>,
}

impl FakeTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `method` requests under `prefix` with `handler`.
    pub fn route<F>(&self, method: Method, prefix: &str, handler: F)
    where
        F: Fn(&ApiRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        self.add(method, prefix, None, Arc::new(handler));
    }

    /// Like [`FakeTransport::route`], answering only after `delay`.
    pub fn route_delayed<F>(&self, method: Method, prefix: &str, delay: Duration, handler: F)
    where
        F: Fn(&ApiRequest) -> (StatusCode, Value) + Send + Sync + 'static,
    {
        self.add(method, prefix, Some(delay), Arc::new(handler));
    }

    fn add(&self, method: Method, prefix: &str, delay: Option<Duration>, handler: Handler) {
        self.inner.lock().unwrap().routes.push(Route {
            method,
            prefix: prefix.to_string(),
            delay,
            handler,
        });
    }

    /// Every request sent so far, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.inner.lock().unwrap().calls.clone()
    }

    /// Number of requests whose path contains `fragment`.
    #[must_use]
    pub fn count(&self, fragment: &str) -> usize {
        self.inner
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.path().contains(fragment))
            .count()
    }
}

impl Transport for FakeTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
        let matched = {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(request.clone());
            inner
                .routes
                .iter()
                .enumerate()
                .filter(|(_, r)| &r.method == request.method() && request.path().starts_with(&r.prefix))
                .max_by_key(|(i, r)| (r.prefix.len(), *i))
                .map(|(_, r)| (r.delay, Arc::clone(&r.handler)))
        };

        Box::pin(async move {
            let Some((delay, handler)) = matched else {
                return Err(TransportError::Connect(format!(
                    "no route for {} {}",
                    request.method(),
                    request.path()
                )));
            };
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let (status, body) = handler(request);
            Ok(ApiResponse::new(status, body))
        })
    }
}

// =============================================================================
// Response bodies
// =============================================================================

/// `{ success: true, data }`.
#[must_use]
pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

/// A successful refresh-token response.
#[must_use]
pub fn refresh_ok(access: &str, refresh: &str, expiry_ms: i64) -> Value {
    envelope(json!({
        "tokens": { "accessToken": access, "refreshToken": refresh, "expiryTime": expiry_ms }
    }))
}

/// A successful login response.
#[must_use]
pub fn login_ok(user_id: &str, role: &str, access: &str, refresh: &str, expires_in: &str) -> Value {
    envelope(json!({
        "tokens": { "accessToken": access, "refreshToken": refresh, "expiresIn": expires_in },
        "user": user_value(user_id, role),
    }))
}

fn user_value(user_id: &str, role: &str) -> Value {
    json!({
        "_id": user_id,
        "name": "Test User",
        "email": format!("{user_id}@example.com"),
        "role": role,
        "isActive": true,
        "isEmailVerified": true,
    })
}

/// A persisted user record.
#[must_use]
pub fn user_json(user_id: &str, role: &str) -> String {
    user_value(user_id, role).to_string()
}

// =============================================================================
// Harness
// =============================================================================

/// One fully wired tab over an in-memory backend and a fake transport.
pub struct TestTab {
    pub backend: MemoryBackend,
    pub channel: SyncChannel,
    pub storage: KeyValueStore,
    pub transport: FakeTransport,
    pub clock: ManualClock,
    pub api: ApiClient,
    pub store: Store,
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub orders: OrderService,
    pub payments: PaymentService,
}

impl TestTab {
    /// Wall-clock time every harness starts at (2023-11-14T22:13:20Z).
    pub const NOW: i64 = 1_700_000_000_000;

    #[must_use]
    pub fn new() -> Self {
        Self::at(Self::NOW)
    }

    /// A fresh tab whose clock starts at `now_ms`.
    #[must_use]
    pub fn at(now_ms: i64) -> Self {
        Self::build(
            MemoryBackend::new(),
            SyncChannel::new(256),
            FakeTransport::new(),
            ManualClock::new(now_ms),
            SessionConfig::default(),
        )
    }

    #[must_use]
    pub fn with_config(config: SessionConfig) -> Self {
        Self::build(
            MemoryBackend::new(),
            SyncChannel::new(256),
            FakeTransport::new(),
            ManualClock::new(Self::NOW),
            config,
        )
    }

    /// Another tab over the same storage and sync channel, with its own
    /// transport and clock.
    #[must_use]
    pub fn sharing(backend: &MemoryBackend, channel: &SyncChannel) -> Self {
        Self::build(
            backend.clone(),
            channel.clone(),
            FakeTransport::new(),
            ManualClock::new(Self::NOW),
            SessionConfig::default(),
        )
    }

    /// Wire a tab from parts. The catalog listing is pre-routed to an empty
    /// menu so initialization is quiet; tests may route over it.
    #[must_use]
    pub fn build(
        backend: MemoryBackend,
        channel: SyncChannel,
        transport: FakeTransport,
        clock: ManualClock,
        config: SessionConfig,
    ) -> Self {
        transport.route(Method::GET, "/products", |_| (StatusCode::OK, envelope(json!([]))));

        let storage = KeyValueStore::new(Arc::new(backend.clone())).with_sync(channel.clone());
        let shared_clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let api = ApiClient::new(
            Arc::new(transport.clone()),
            storage.clone(),
            Arc::clone(&shared_clock),
            HttpConfig::default(),
        );
        let store = Store::new(api.clone(), shared_clock, config);

        Self {
            backend,
            channel,
            storage,
            transport,
            clock,
            auth: AuthService::new(api.clone()),
            catalog: CatalogService::new(api.clone()),
            orders: OrderService::new(api.clone()),
            payments: PaymentService::new(api.clone()),
            api,
            store,
        }
    }
}

impl Default for TestTab {
    fn default() -> Self {
        Self::new()
    }
}
