//! Session and cart store.
//!
//! [`Store`] owns the in-memory session (token, user), the cart, and the
//! catalog snapshot. State is published on a `tokio::sync::watch` channel so
//! route guards and front-ends can subscribe to it; every mutation persists
//! through the [`KeyValueStore`] before subscribers are notified.

mod expiry;

pub use expiry::{ExpiryAction, ExpiryWatch, decide};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use secrecy::{ExposeSecret, SecretString};
use tasty_bites_core::{
    Cart, CartLine, DEFAULT_TOKEN_LIFETIME_MS, ProductId, User, format_remaining, parse_expires_in,
};
use thiserror::Error;
use tokio::sync::watch;
use tracing::instrument;

use crate::clock::{Clock, SystemClock};
use crate::config::{ClientConfig, MissingExpiry, SessionConfig};
use crate::http::{ApiClient, ApiError, RefreshError, RefreshedTokens, ReqwestTransport, TransportError};
use crate::services::{
    AuthService, CatalogService, CheckoutDetails, Credentials, Order, OrderDraft, OrderService,
    Product, ProfileUpdate,
};
use crate::storage::{FileBackend, KeyValueStore, keys};
use crate::sync::{SyncChannel, TabId};

/// Errors surfaced by [`Store`] operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("cart is empty")]
    EmptyCart,
}

/// Token fields to persist. Omitted fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TokenData {
    pub access_token: Option<SecretString>,
    pub refresh_token: Option<SecretString>,
    /// Absolute expiry in epoch milliseconds.
    pub expiry_ms: Option<i64>,
}

impl From<RefreshedTokens> for TokenData {
    fn from(tokens: RefreshedTokens) -> Self {
        Self {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expiry_ms: Some(tokens.expiry_ms),
        }
    }
}

/// Snapshot of everything the store holds.
#[derive(Debug, Clone)]
pub struct StoreState {
    pub cart: Cart,
    pub token: Option<SecretString>,
    pub user: Option<User>,
    /// Catalog fetched during initialization.
    pub products: Vec<Product>,
    /// True until the one-time startup hydration has finished.
    pub is_session_loading: bool,
    /// A non-empty cart was restored into an authenticated session at startup.
    pub cart_restored: bool,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            cart: Cart::new(),
            token: None,
            user: None,
            products: Vec::new(),
            is_session_loading: true,
            cart_restored: false,
        }
    }
}

impl StoreState {
    /// Both a token and a user are present.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.token.is_some() && self.user.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.is_authenticated() && self.user.as_ref().is_some_and(User::is_admin)
    }
}

/// The session and cart store of one tab.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Store {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    storage: KeyValueStore,
    api: ApiClient,
    clock: Arc<dyn Clock>,
    config: SessionConfig,
    auth: AuthService,
    catalog: CatalogService,
    orders: OrderService,
    state: watch::Sender<StoreState>,
    initialized: AtomicBool,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("tab", &self.tab_id())
            .field("state", &*self.inner.state.borrow())
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Create a store on top of `api` (and the storage it reads credentials
    /// from). The persisted cart is loaded immediately; the session is not
    /// hydrated until [`Store::initialize`].
    #[must_use]
    pub fn new(api: ApiClient, clock: Arc<dyn Clock>, config: SessionConfig) -> Self {
        let storage = api.storage().clone();
        let cart = storage.get_json::<Cart>(keys::CART).unwrap_or_default();
        let (state, _) = watch::channel(StoreState {
            cart,
            ..StoreState::default()
        });

        Self {
            inner: Arc::new(StoreInner {
                auth: AuthService::new(api.clone()),
                catalog: CatalogService::new(api.clone()),
                orders: OrderService::new(api.clone()),
                storage,
                api,
                clock,
                config,
                state,
                initialized: AtomicBool::new(false),
            }),
        }
    }

    /// Wire a production store: file-backed storage, `reqwest` transport,
    /// and the system clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let storage = KeyValueStore::new(Arc::new(FileBackend::new(&config.storage_path)))
            .with_sync(SyncChannel::default());
        let transport = ReqwestTransport::new(&config.api_url, config.http.request_timeout)?;
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let api = ApiClient::new(Arc::new(transport), storage, Arc::clone(&clock), config.http);
        Ok(Self::new(api, clock, config.session))
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Subscribe to state changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StoreState> {
        self.inner.state.subscribe()
    }

    /// Clone of the current state.
    #[must_use]
    pub fn snapshot(&self) -> StoreState {
        self.inner.state.borrow().clone()
    }

    /// Whether startup hydration is still pending.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.inner.state.borrow().is_session_loading
    }

    #[must_use]
    pub fn tab_id(&self) -> TabId {
        self.inner.storage.tab_id()
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.inner.api
    }

    #[must_use]
    pub fn storage(&self) -> &KeyValueStore {
        &self.inner.storage
    }

    #[must_use]
    pub fn auth(&self) -> &AuthService {
        &self.inner.auth
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    // =========================================================================
    // Session lifecycle
    // =========================================================================

    /// One-time startup: hydrate the session from storage, then fetch the
    /// catalog. Later calls do nothing.
    ///
    /// A stored session that has already expired is purged. The loading flag
    /// is always cleared, whatever storage contains.
    #[instrument(skip(self), fields(tab = %self.tab_id()))]
    pub async fn initialize(&self) {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            tracing::debug!("Store already initialized");
            return;
        }

        self.hydrate_session();

        match self.inner.catalog.list_products().await {
            Ok(products) => {
                tracing::debug!(count = products.len(), "Catalog loaded");
                self.inner.state.send_modify(|state| state.products = products);
            }
            Err(e) => tracing::error!(error = %e, "Error fetching catalog"),
        }
    }

    fn hydrate_session(&self) {
        let storage = &self.inner.storage;
        let (token, user) = match storage.get_string(keys::TOKEN) {
            Some(_) if self.is_expired() => {
                tracing::info!("Stored session has expired; clearing it");
                storage.purge_auth();
                (None, None)
            }
            Some(token) => (
                Some(SecretString::from(token)),
                storage.get_json::<User>(keys::USER),
            ),
            None => (None, None),
        };

        self.inner.state.send_modify(|state| {
            state.cart_restored = token.is_some() && user.is_some() && !state.cart.is_empty();
            state.token = token;
            state.user = user;
            state.is_session_loading = false;
        });
    }

    /// Persist and adopt whichever tokens (and user) are given. Fields left
    /// out are not cleared.
    pub fn save_session(&self, tokens: &TokenData, user: Option<&User>) {
        let storage = &self.inner.storage;
        if let Some(token) = &tokens.access_token {
            storage.set_string(keys::TOKEN, token.expose_secret());
        }
        if let Some(refresh) = &tokens.refresh_token {
            storage.set_string(keys::REFRESH_TOKEN, refresh.expose_secret());
        }
        if let Some(expiry) = tokens.expiry_ms {
            storage.set_string(keys::TOKEN_EXPIRY, &expiry.to_string());
        }
        if let Some(user) = user {
            storage.set_json(keys::USER, user);
        }

        self.inner.state.send_if_modified(|state| {
            if let Some(token) = &tokens.access_token {
                state.token = Some(token.clone());
            }
            if let Some(user) = user {
                state.user = Some(user.clone());
            }
            tokens.access_token.is_some() || user.is_some()
        });
    }

    /// Purge the persisted session and forget token and user. The cart is
    /// kept. Stops any running expiry watch.
    pub fn clear_session(&self) {
        self.inner.storage.purge_auth();
        let cleared = self.inner.state.send_if_modified(|state| {
            let had_session = state.token.is_some() || state.user.is_some();
            state.token = None;
            state.user = None;
            state.cart_restored = false;
            had_session
        });
        if cleared {
            tracing::info!("Session cleared");
        }
    }

    /// Log out. Same as [`Store::clear_session`].
    pub fn logout(&self) {
        self.clear_session();
    }

    /// Whether the stored expiry has passed.
    ///
    /// A missing (or unreadable) expiry follows the configured
    /// [`MissingExpiry`] policy.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self.stored_expiry() {
            Some(expiry) => self.inner.clock.now_ms() >= expiry,
            None => self.inner.config.missing_expiry == MissingExpiry::TreatAsExpired,
        }
    }

    /// Milliseconds until the stored expiry (negative once past), or `None`
    /// if no expiry is stored.
    #[must_use]
    pub fn remaining_ms(&self) -> Option<i64> {
        self.stored_expiry()
            .map(|expiry| expiry.saturating_sub(self.inner.clock.now_ms()))
    }

    /// Remaining lifetime for display, e.g. `"12m"` or `"Expired"`.
    #[must_use]
    pub fn remaining_display(&self) -> Option<String> {
        self.remaining_ms().map(format_remaining)
    }

    fn stored_expiry(&self) -> Option<i64> {
        let raw = self.inner.storage.get_string(keys::TOKEN_EXPIRY)?;
        match raw.trim().parse() {
            Ok(expiry) => Some(expiry),
            Err(e) => {
                tracing::warn!(value = %raw, error = %e, "Unreadable token expiry");
                None
            }
        }
    }

    /// Exchange the stored refresh token for new tokens.
    ///
    /// Returns `false` (with the session cleared) if there is no refresh
    /// token or the refresh fails.
    #[instrument(skip(self), fields(tab = %self.tab_id()))]
    pub async fn refresh_session(&self) -> bool {
        match self.inner.api.refresh().await {
            Ok(tokens) => {
                // The client already persisted the new tokens.
                self.adopt_token(Some(tokens.access_token));
                true
            }
            Err(RefreshError::MissingRefreshToken) => {
                tracing::warn!("No refresh token available");
                self.clear_session();
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Error refreshing token");
                self.clear_session();
                false
            }
        }
    }

    // =========================================================================
    // Auth and profile
    // =========================================================================

    /// Log in and start a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` with a credential error for a wrong email
    /// or password; the current session is left untouched.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<User, SessionError> {
        let outcome = self.inner.auth.login(credentials).await?;
        let lifetime = outcome
            .expires_in
            .as_ref()
            .map_or(DEFAULT_TOKEN_LIFETIME_MS, parse_expires_in);

        let tokens = TokenData {
            access_token: Some(outcome.access_token),
            refresh_token: outcome.refresh_token,
            expiry_ms: Some(self.inner.clock.now_ms().saturating_add(lifetime)),
        };
        self.save_session(&tokens, Some(&outcome.user));
        tracing::info!(user_id = %outcome.user.id, "Logged in");
        Ok(outcome.user)
    }

    /// Re-fetch the profile and adopt it.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn reload_profile(&self) -> Result<User, SessionError> {
        let user = self.inner.auth.profile().await?;
        self.save_session(&TokenData::default(), Some(&user));
        Ok(user)
    }

    /// Update the profile and adopt the stored result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the update is rejected.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, SessionError> {
        let user = self.inner.auth.update_profile(update).await?;
        self.save_session(&TokenData::default(), Some(&user));
        Ok(user)
    }

    // =========================================================================
    // Cart
    // =========================================================================

    /// Add one unit of a product.
    pub fn add_item(&self, item: CartLine) {
        self.update_cart(|cart| {
            cart.add_item(item);
            true
        });
    }

    /// Returns `false` if the product is not in the cart.
    pub fn increase_quantity(&self, product_id: &ProductId) -> bool {
        self.update_cart(|cart| cart.increase_quantity(product_id))
    }

    /// Decrement a line, never below 1. Returns `true` if the quantity changed.
    pub fn decrease_quantity(&self, product_id: &ProductId) -> bool {
        self.update_cart(|cart| cart.decrease_quantity(product_id))
    }

    /// Returns `false` if the product was not in the cart.
    pub fn remove_item(&self, product_id: &ProductId) -> bool {
        self.update_cart(|cart| cart.remove_item(product_id))
    }

    pub fn clear_cart(&self) {
        self.update_cart(|cart| {
            let had_lines = !cart.is_empty();
            cart.clear();
            had_lines
        });
    }

    /// Apply `f` to the cart; if it reports a change, persist the new cart
    /// and notify subscribers.
    fn update_cart(&self, f: impl FnOnce(&mut Cart) -> bool) -> bool {
        let storage = &self.inner.storage;
        self.inner.state.send_if_modified(|state| {
            let changed = f(&mut state.cart);
            if changed {
                persist_cart(storage, &state.cart);
            }
            changed
        })
    }

    /// Submit the cart as an order and empty the cart on success.
    ///
    /// Each line is priced from the loaded catalog when the product is in
    /// it, otherwise at the price captured when it was added.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::EmptyCart` without calling the backend if the
    /// cart is empty, or the API error if the order is rejected (the cart is
    /// then kept).
    #[instrument(skip(self, details))]
    pub async fn checkout(&self, details: &CheckoutDetails) -> Result<Order, SessionError> {
        let draft = {
            let state = self.inner.state.borrow();
            if state.cart.is_empty() {
                return Err(SessionError::EmptyCart);
            }
            OrderDraft::from_cart(&state.cart, details, |id| {
                state.products.iter().find(|p| &p.id == id).map(|p| p.price)
            })
        };

        let order = self.inner.orders.create(&draft).await?;
        tracing::info!(order_id = %order.id, total = %draft.total(), "Order placed");
        self.clear_cart();
        Ok(order)
    }

    /// Notice shown once a returning user's saved cart has been restored.
    #[must_use]
    pub fn cart_restore_notice(&self) -> Option<String> {
        let state = self.inner.state.borrow();
        (state.cart_restored && state.is_authenticated() && !state.cart.is_empty()).then(|| {
            format!(
                "Welcome back! Your cart with {} items has been restored.",
                state.cart.len()
            )
        })
    }

    // =========================================================================
    // Adoption (state written elsewhere, not persisted again)
    // =========================================================================

    pub(crate) fn adopt_token(&self, token: Option<SecretString>) {
        self.inner.state.send_modify(|state| state.token = token);
    }

    pub(crate) fn adopt_user(&self, user: Option<User>) {
        self.inner.state.send_modify(|state| state.user = user);
    }

    pub(crate) fn adopt_cart(&self, cart: Cart) {
        self.inner.state.send_modify(|state| state.cart = cart);
    }
}

fn persist_cart(storage: &KeyValueStore, cart: &Cart) {
    if cart.is_empty() {
        storage.remove(keys::CART);
    } else {
        storage.set_json(keys::CART, cart);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::{Method, StatusCode};
    use rust_decimal::Decimal;
    use serde_json::json;
    use tasty_bites_core::{Email, PaymentMethod, Price};

    use super::*;
    use crate::testing::{TestTab, envelope, login_ok, refresh_ok, user_json};

    const NOW: i64 = TestTab::NOW;

    fn seed(tab: &TestTab, expiry: Option<i64>) {
        tab.storage.set_string(keys::TOKEN, "stored-token");
        tab.storage.set_string(keys::REFRESH_TOKEN, "stored-refresh");
        if let Some(expiry) = expiry {
            tab.storage.set_string(keys::TOKEN_EXPIRY, &expiry.to_string());
        }
        tab.storage.set_string(keys::USER, &user_json("u1", "user"));
    }

    fn line(id: &str) -> CartLine {
        CartLine::new(id, id.to_uppercase(), Price::new(Decimal::from(10)))
    }

    #[tokio::test]
    async fn test_initialize_adopts_valid_session() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 600_000));
        tab.store.initialize().await;

        let state = tab.store.snapshot();
        assert!(!state.is_session_loading);
        assert!(state.is_authenticated());
        assert_eq!(state.token.unwrap().expose_secret(), "stored-token");
    }

    #[tokio::test]
    async fn test_initialize_purges_expired_session() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW - 1));
        tab.store.initialize().await;

        let state = tab.store.snapshot();
        assert!(!state.is_session_loading);
        assert!(state.token.is_none());
        assert!(state.user.is_none());
        for key in keys::AUTH_KEYS {
            assert!(tab.storage.get_string(key).is_none());
        }
    }

    #[tokio::test]
    async fn test_initialize_survives_corrupt_storage() {
        let tab = TestTab::new();
        tab.storage.set_string(keys::TOKEN, "stored-token");
        tab.storage.set_string(keys::TOKEN_EXPIRY, "soon");
        tab.storage.set_string(keys::USER, "{broken");
        tab.store.initialize().await;

        let state = tab.store.snapshot();
        assert!(!state.is_session_loading);
        // Unreadable expiry counts as missing: the token is kept, but with no
        // user the session is not authenticated.
        assert!(state.token.is_some());
        assert!(!state.is_authenticated());
    }

    #[tokio::test]
    async fn test_missing_expiry_policy() {
        let tab = TestTab::new();
        seed(&tab, None);
        assert!(!tab.store.is_expired());

        let strict = TestTab::with_config(SessionConfig {
            missing_expiry: MissingExpiry::TreatAsExpired,
            ..SessionConfig::default()
        });
        seed(&strict, None);
        assert!(strict.store.is_expired());
        strict.store.initialize().await;
        assert!(strict.store.snapshot().token.is_none());
    }

    #[tokio::test]
    async fn test_initialize_runs_once_and_loads_catalog() {
        let tab = TestTab::new();
        tab.transport.route(Method::GET, "/products", |_| {
            (StatusCode::OK, envelope(json!([{"_id": "p1", "name": "Pho", "price": 40}])))
        });
        tab.store.initialize().await;
        tab.store.initialize().await;

        assert_eq!(tab.store.snapshot().products.len(), 1);
        assert_eq!(tab.transport.count("/products"), 1);
    }

    #[tokio::test]
    async fn test_save_session_is_additive() {
        let tab = TestTab::new();
        tab.store.initialize().await;

        tab.store.save_session(
            &TokenData {
                access_token: Some(SecretString::from("a1")),
                refresh_token: Some(SecretString::from("r1")),
                expiry_ms: Some(NOW + 1000),
            },
            None,
        );
        tab.store.save_session(
            &TokenData {
                access_token: Some(SecretString::from("a2")),
                ..TokenData::default()
            },
            None,
        );

        assert_eq!(tab.storage.get_string(keys::TOKEN).as_deref(), Some("a2"));
        assert_eq!(tab.storage.get_string(keys::REFRESH_TOKEN).as_deref(), Some("r1"));
        assert_eq!(tab.store.remaining_ms(), Some(1000));
    }

    #[tokio::test]
    async fn test_logout_keeps_cart() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 600_000));
        tab.store.initialize().await;
        tab.store.add_item(line("a"));

        tab.store.logout();

        let state = tab.store.snapshot();
        assert!(state.token.is_none());
        assert_eq!(state.cart.len(), 1);
        assert!(tab.storage.get_string(keys::CART).is_some());
        assert!(tab.storage.get_string(keys::TOKEN).is_none());
    }

    #[tokio::test]
    async fn test_cart_operations_persist() {
        let tab = TestTab::new();
        let a = ProductId::new("a");

        tab.store.add_item(line("a"));
        tab.store.add_item(line("a"));
        assert_eq!(tab.store.snapshot().cart.get(&a).unwrap().quantity, 2);

        assert!(tab.store.decrease_quantity(&a));
        assert!(!tab.store.decrease_quantity(&a));
        assert_eq!(tab.store.snapshot().cart.get(&a).unwrap().quantity, 1);

        let persisted: Cart = tab.storage.get_json(keys::CART).unwrap();
        assert_eq!(persisted, tab.store.snapshot().cart);

        assert!(tab.store.remove_item(&a));
        // An empty cart is removed from storage rather than stored as `[]`
        assert!(tab.storage.get_string(keys::CART).is_none());
    }

    #[tokio::test]
    async fn test_cart_restored_on_construction() {
        let tab = TestTab::new();
        tab.store.add_item(line("a"));
        tab.store.add_item(line("b"));

        let reopened = TestTab::sharing(&tab.backend, &tab.channel);
        assert_eq!(reopened.store.snapshot().cart, tab.store.snapshot().cart);
    }

    #[tokio::test]
    async fn test_cart_restore_notice() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 600_000));
        tab.storage.set_json(keys::CART, &Cart::from_lines([line("a"), line("b")]));

        let reopened = TestTab::sharing(&tab.backend, &tab.channel);
        assert!(reopened.store.cart_restore_notice().is_none());
        reopened.store.initialize().await;
        assert_eq!(
            reopened.store.cart_restore_notice().as_deref(),
            Some("Welcome back! Your cart with 2 items has been restored.")
        );
    }

    #[tokio::test]
    async fn test_login_computes_absolute_expiry() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/auth/login", |_| {
            (StatusCode::OK, login_ok("u1", "admin", "access", "refresh", "15m"))
        });
        tab.store.initialize().await;

        let credentials = Credentials {
            email: Email::parse("an@example.com").unwrap(),
            password: SecretString::from("secret"),
        };
        let user = tab.store.login(&credentials).await.unwrap();

        assert!(user.is_admin());
        assert!(tab.store.snapshot().is_admin());
        assert_eq!(
            tab.storage.get_string(keys::TOKEN_EXPIRY),
            Some((NOW + 15 * 60 * 1000).to_string())
        );
    }

    #[tokio::test]
    async fn test_login_with_huge_lifetime_stays_valid() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/auth/login", |_| {
            (StatusCode::OK, login_ok("u1", "user", "access", "refresh", "9999999999999999d"))
        });
        tab.store.initialize().await;

        let credentials = Credentials {
            email: Email::parse("an@example.com").unwrap(),
            password: SecretString::from("secret"),
        };
        tab.store.login(&credentials).await.unwrap();

        assert_eq!(
            tab.storage.get_string(keys::TOKEN_EXPIRY),
            Some(i64::MAX.to_string())
        );
        assert!(!tab.store.is_expired());
        assert!(tab.store.snapshot().is_authenticated());
    }

    #[tokio::test]
    async fn test_remaining_time_with_extreme_stored_expiry() {
        let tab = TestTab::new();
        seed(&tab, Some(i64::MIN));
        assert_eq!(tab.store.remaining_ms(), Some(i64::MIN));
        assert_eq!(tab.store.remaining_display().as_deref(), Some("Expired"));
        assert!(tab.store.is_expired());

        seed(&tab, Some(i64::MAX));
        assert_eq!(tab.store.remaining_ms(), Some(i64::MAX - NOW));
        assert!(!tab.store.is_expired());
    }

    #[tokio::test]
    async fn test_refresh_session_outcomes() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 60_000));
        tab.store.initialize().await;
        tab.transport.route(Method::POST, "/auth/refresh-token", |request| {
            let refresh = request.body().unwrap()["refreshToken"].clone();
            assert_eq!(refresh, "stored-refresh");
            (StatusCode::OK, refresh_ok("new-access", "new-refresh", NOW + 1_800_000))
        });

        assert!(tab.store.refresh_session().await);
        assert_eq!(
            tab.store.snapshot().token.unwrap().expose_secret(),
            "new-access"
        );
        assert_eq!(tab.store.remaining_ms(), Some(1_800_000));

        tab.storage.remove(keys::REFRESH_TOKEN);
        assert!(!tab.store.refresh_session().await);
        assert!(tab.store.snapshot().token.is_none());
        assert_eq!(tab.transport.count("/auth/refresh-token"), 1);
    }

    #[tokio::test]
    async fn test_checkout() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/orders/create-order", |request| {
            let items = request.body().unwrap()["items"].clone();
            (StatusCode::CREATED, envelope(json!({"_id": "o1", "items": items})))
        });
        let details = CheckoutDetails {
            name: "An".to_string(),
            email: Email::parse("an@example.com").unwrap(),
            phone: "0900".to_string(),
            shipping_address: "1 Le Loi".to_string(),
            payment_method: PaymentMethod::Cash,
            notes: String::new(),
        };

        let err = tab.store.checkout(&details).await.unwrap_err();
        assert!(matches!(err, SessionError::EmptyCart));

        tab.store.add_item(line("a"));
        let order = tab.store.checkout(&details).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert!(tab.store.snapshot().cart.is_empty());
    }

    #[tokio::test]
    async fn test_failed_checkout_keeps_cart() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/orders/create-order", |_| {
            (StatusCode::BAD_REQUEST, json!({"success": false, "message": "Invalid phone"}))
        });
        tab.store.add_item(line("a"));
        let details = CheckoutDetails {
            name: "An".to_string(),
            email: Email::parse("an@example.com").unwrap(),
            phone: String::new(),
            shipping_address: String::new(),
            payment_method: PaymentMethod::Cash,
            notes: String::new(),
        };

        assert!(tab.store.checkout(&details).await.is_err());
        assert_eq!(tab.store.snapshot().cart.len(), 1);
    }
}
