//! Authenticated HTTP client.
//!
//! [`ApiClient`] is the request pipeline every service call goes through:
//!
//! 1. The current access token is read from storage (never cached) and sent
//!    as `Authorization: Bearer <token>`.
//! 2. A 401 from a non-auth endpoint starts the refresh protocol. Only one
//!    refresh call is ever in flight; every other request that hits a 401
//!    meanwhile waits for that refresh's outcome.
//! 3. On success the new tokens are persisted and re-broadcast, and each
//!    waiting request is replayed exactly once with the new token.
//! 4. On failure every waiting request fails, the persisted session is purged
//!    once, and a [`Navigation::Login`] is emitted.

mod error;
mod request;
mod transport;

pub use error::{ApiError, RefreshError, TransportError};
pub use request::{ApiRequest, ApiResponse};
pub use transport::{ReqwestTransport, Transport};

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tasty_bites_core::DEFAULT_TOKEN_LIFETIME_MS;
use tokio::sync::{Mutex, broadcast, oneshot};
use tracing::instrument;

use crate::clock::Clock;
use crate::config::HttpConfig;
use crate::storage::{KeyValueStore, keys};

/// Endpoints whose 401s mean bad credentials rather than an expired session.
const AUTH_EXEMPT_ENDPOINTS: [&str; 5] = [
    "/auth/login",
    "/auth/register",
    "/auth/forgot-password",
    "/auth/reset-password",
    REFRESH_PATH,
];

const REFRESH_PATH: &str = "/auth/refresh-token";

/// Whether a 401 from `path` must be reported as a credential error instead
/// of starting a refresh. Matches by substring so query strings and prefixes
/// do not defeat it.
#[must_use]
pub fn is_auth_exempt(path: &str) -> bool {
    AUTH_EXEMPT_ENDPOINTS
        .iter()
        .any(|endpoint| path.contains(endpoint))
}

/// Navigation the front-end must perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Navigation {
    /// The session is gone; show the login entry point.
    Login,
}

/// Token set produced by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedTokens {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
    /// Absolute expiry in epoch milliseconds.
    pub expiry_ms: i64,
}

impl RefreshedTokens {
    /// Read the token set from a refresh-token response body.
    ///
    /// The refresh token falls back to `prior_refresh` and the expiry to
    /// `expiresIn` (relative) or 30 minutes from `now_ms` when the backend
    /// omits them.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::Rejected` if the envelope reports failure and
    /// `RefreshError::Malformed` if no access token is present.
    pub fn from_response(
        body: &Value,
        prior_refresh: &SecretString,
        now_ms: i64,
    ) -> Result<Self, RefreshError> {
        if body.get("success").and_then(Value::as_bool) != Some(true) {
            let message = body
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("Refresh token failed");
            return Err(RefreshError::Rejected(message.to_string()));
        }

        let tokens = body
            .pointer("/data/tokens")
            .or_else(|| body.get("tokens"))
            .ok_or_else(|| RefreshError::Malformed("missing tokens".to_string()))?;

        let access_token = tokens
            .get("accessToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| RefreshError::Malformed("missing accessToken".to_string()))?;

        let refresh_token = tokens
            .get("refreshToken")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map_or_else(|| prior_refresh.clone(), SecretString::from);

        let expiry_ms = match tokens.get("expiryTime") {
            Some(Value::Number(n)) => n.as_i64(),
            Some(Value::String(s)) => s.trim().parse().ok(),
            _ => None,
        }
        .or_else(|| {
            tokens
                .get("expiresIn")
                .map(|v| now_ms.saturating_add(tasty_bites_core::parse_expires_in(v)))
        })
        .unwrap_or(now_ms.saturating_add(DEFAULT_TOKEN_LIFETIME_MS));

        Ok(Self {
            access_token: SecretString::from(access_token),
            refresh_token,
            expiry_ms,
        })
    }
}

type RefreshOutcome = Result<RefreshedTokens, RefreshError>;

/// The refresh wait queue. Owned exclusively by [`ApiClient`].
#[derive(Default)]
struct RefreshGate {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<RefreshOutcome>>,
}

/// HTTP client with the auth interceptor.
///
/// Cheap to clone; clones share the transport and the refresh queue.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ApiClientInner>,
}

struct ApiClientInner {
    transport: Arc<dyn Transport>,
    storage: KeyValueStore,
    clock: Arc<dyn Clock>,
    gate: Mutex<RefreshGate>,
    refresh_timeout: Duration,
    navigation: broadcast::Sender<Navigation>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("refresh_timeout", &self.inner.refresh_timeout)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    /// Create a client sending through `transport` and reading credentials
    /// from `storage`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        storage: KeyValueStore,
        clock: Arc<dyn Clock>,
        config: HttpConfig,
    ) -> Self {
        let (navigation, _) = broadcast::channel(8);
        Self {
            inner: Arc::new(ApiClientInner {
                transport,
                storage,
                clock,
                gate: Mutex::new(RefreshGate::default()),
                refresh_timeout: config.refresh_timeout,
                navigation,
            }),
        }
    }

    /// Subscribe to forced navigations.
    #[must_use]
    pub fn navigation(&self) -> broadcast::Receiver<Navigation> {
        self.inner.navigation.subscribe()
    }

    /// The storage this client reads credentials from.
    #[must_use]
    pub fn storage(&self) -> &KeyValueStore {
        &self.inner.storage
    }

    /// Send a request through the interceptor.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Credentials` for a 401 from an auth endpoint,
    /// `ApiError::SessionExpired` for an unrecoverable 401,
    /// `ApiError::Refresh` if the shared refresh failed, `ApiError::Status`
    /// for any other non-success status, and `ApiError::Transport` if no
    /// response arrived.
    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    pub async fn execute(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        request.set_bearer(self.inner.storage.get_string(keys::TOKEN).map(SecretString::from));

        loop {
            let response = self.inner.transport.send(&request).await?;

            if response.status == StatusCode::UNAUTHORIZED {
                let token = self.recover(&request, &response).await?;
                request.set_bearer(Some(token));
                request.mark_retried();
                tracing::debug!("Replaying request with refreshed token");
                continue;
            }

            if !response.status.is_success() {
                return Err(ApiError::Status {
                    status: response.status,
                    message: response.failure_message(),
                });
            }
            return Ok(response);
        }
    }

    /// Decide how to answer a 401: fail, replay with a token another refresh
    /// already produced, or join the shared refresh.
    async fn recover(
        &self,
        request: &ApiRequest,
        response: &ApiResponse,
    ) -> Result<SecretString, ApiError> {
        let message = response.failure_message();

        if is_auth_exempt(request.path()) {
            return Err(ApiError::Credentials { message });
        }
        if request.is_retried() {
            return Err(ApiError::SessionExpired { message });
        }
        if self.inner.storage.get_string(keys::REFRESH_TOKEN).is_none() {
            return Err(ApiError::SessionExpired { message });
        }

        // A refresh that finished after this request was sent already rotated
        // the token; replay with it instead of refreshing again.
        if let Some(current) = self.inner.storage.get_string(keys::TOKEN) {
            let sent = request.bearer().map(ExposeSecret::expose_secret);
            if sent != Some(current.as_str()) {
                return Ok(SecretString::from(current));
            }
        }

        Ok(self.refresh().await?.access_token)
    }

    /// Run (or join) the shared token refresh.
    ///
    /// If a refresh is already in flight the caller waits for its outcome
    /// instead of starting another.
    ///
    /// # Errors
    ///
    /// Returns `RefreshError::MissingRefreshToken` without touching the
    /// session if no refresh token is stored. Any other error means the
    /// refresh failed and the persisted session has been purged.
    pub async fn refresh(&self) -> Result<RefreshedTokens, RefreshError> {
        let refresh_token = self
            .inner
            .storage
            .get_string(keys::REFRESH_TOKEN)
            .map(SecretString::from)
            .ok_or(RefreshError::MissingRefreshToken)?;

        let (tx, rx) = oneshot::channel();
        let leader = {
            let mut gate = self.inner.gate.lock().await;
            gate.waiters.push(tx);
            !std::mem::replace(&mut gate.in_flight, true)
        };

        if leader {
            // Runs detached so a cancelled caller cannot strand the queue.
            let client = self.clone();
            tokio::spawn(async move { client.run_refresh(refresh_token).await });
        } else {
            tracing::debug!("Waiting for in-flight token refresh");
        }

        rx.await.unwrap_or(Err(RefreshError::Abandoned))
    }

    #[instrument(skip_all)]
    async fn run_refresh(&self, refresh_token: SecretString) {
        let timeout = self.inner.refresh_timeout;
        let outcome = tokio::time::timeout(timeout, self.request_refresh(&refresh_token))
            .await
            .unwrap_or(Err(RefreshError::TimedOut(timeout)));

        match &outcome {
            Ok(tokens) => {
                let storage = &self.inner.storage;
                let access = tokens.access_token.expose_secret();
                storage.set_string(keys::TOKEN, access);
                storage.set_string(keys::REFRESH_TOKEN, tokens.refresh_token.expose_secret());
                storage.set_string(keys::TOKEN_EXPIRY, &tokens.expiry_ms.to_string());
                storage.broadcast(keys::TOKEN, Some(access.to_string()));
                tracing::info!(expiry_ms = tokens.expiry_ms, "Access token refreshed");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh failed; clearing session");
                self.inner.storage.purge_auth();
                self.inner.storage.broadcast(keys::TOKEN, None);
                let _ = self.inner.navigation.send(Navigation::Login);
            }
        }

        let waiters = {
            let mut gate = self.inner.gate.lock().await;
            gate.in_flight = false;
            std::mem::take(&mut gate.waiters)
        };
        tracing::debug!(waiters = waiters.len(), "Settling refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Call the refresh endpoint directly on the transport, bypassing the
    /// interceptor.
    async fn request_refresh(&self, refresh_token: &SecretString) -> RefreshOutcome {
        let request = ApiRequest::post(REFRESH_PATH)
            .json(&json!({ "refreshToken": refresh_token.expose_secret() }))
            .map_err(|e| RefreshError::Malformed(e.to_string()))?;

        let response = self.inner.transport.send(&request).await?;
        if !response.status.is_success() {
            return Err(RefreshError::Rejected(response.failure_message()));
        }
        RefreshedTokens::from_response(&response.body, refresh_token, self.inner.clock.now_ms())
    }
}
