//! Proactive token refresh.
//!
//! While a session is present, [`ExpiryWatch`] checks the stored expiry once
//! immediately and then every `refresh_interval`:
//!
//! - no stored expiry: the session is treated as corrupt and cleared
//! - expired: the session is cleared
//! - expiring within `refresh_threshold`: the session is refreshed

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::Store;

/// What one expiry check should do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryAction {
    Clear,
    Refresh,
    Nothing,
}

/// Decide the action for a session with `remaining_ms` left (`None` when no
/// expiry is stored).
#[must_use]
pub fn decide(remaining_ms: Option<i64>, threshold: Duration) -> ExpiryAction {
    let threshold_ms = i64::try_from(threshold.as_millis()).unwrap_or(i64::MAX);
    match remaining_ms {
        None => ExpiryAction::Clear,
        Some(ms) if ms <= 0 => ExpiryAction::Clear,
        Some(ms) if ms < threshold_ms => ExpiryAction::Refresh,
        Some(_) => ExpiryAction::Nothing,
    }
}

impl Store {
    /// Run one expiry check against the stored expiry and act on it.
    pub async fn check_expiry(&self) -> ExpiryAction {
        let remaining = self.remaining_ms();
        let action = decide(remaining, self.config().refresh_threshold);
        match action {
            ExpiryAction::Clear if remaining.is_none() => {
                tracing::warn!("No token expiry stored; clearing session");
                self.clear_session();
            }
            ExpiryAction::Clear => {
                tracing::info!("Access token expired; clearing session");
                self.clear_session();
            }
            ExpiryAction::Refresh => {
                tracing::info!(remaining_ms = remaining, "Access token expiring soon; refreshing");
                if !self.refresh_session().await {
                    tracing::warn!("Proactive token refresh failed");
                }
            }
            ExpiryAction::Nothing => {}
        }
        action
    }

    /// Start the expiry watch for this store. It stays idle until hydration
    /// has finished and a token is present, and stops when the returned
    /// handle is dropped.
    #[must_use]
    pub fn spawn_expiry_watch(&self) -> ExpiryWatch {
        let store = self.clone();
        ExpiryWatch {
            handle: tokio::spawn(run(store)),
        }
    }
}

/// Handle to a running expiry watch; dropping it cancels the watch.
#[derive(Debug)]
pub struct ExpiryWatch {
    handle: JoinHandle<()>,
}

impl ExpiryWatch {
    /// Whether the watch task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ExpiryWatch {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn same_token(a: Option<&SecretString>, b: Option<&SecretString>) -> bool {
    a.map(ExposeSecret::expose_secret) == b.map(ExposeSecret::expose_secret)
}

async fn run(store: Store) {
    let mut rx = store.subscribe();
    let interval = store.config().refresh_interval;

    loop {
        // Idle until hydration is done and there is a session to watch.
        let token = match rx
            .wait_for(|state| !state.is_session_loading && state.token.is_some())
            .await
        {
            Ok(state) => state.token.clone(),
            Err(_) => return,
        };

        tracing::debug!(interval_secs = interval.as_secs(), "Expiry watch started");
        // The first tick completes immediately.
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    store.check_expiry().await;
                }
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let current = rx.borrow_and_update().token.clone();
                    if !same_token(current.as_ref(), token.as_ref()) {
                        // Restart for the new token (or go idle without one).
                        break;
                    }
                }
            }
        }
        tracing::debug!("Expiry watch reset");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::{Method, StatusCode};

    use super::*;
    use crate::storage::keys;
    use crate::testing::{TestTab, refresh_ok, user_json};

    const NOW: i64 = TestTab::NOW;
    const MINUTE: i64 = 60_000;

    fn seed(tab: &TestTab, expiry: Option<i64>) {
        tab.storage.set_string(keys::TOKEN, "t1");
        tab.storage.set_string(keys::REFRESH_TOKEN, "r1");
        if let Some(expiry) = expiry {
            tab.storage.set_string(keys::TOKEN_EXPIRY, &expiry.to_string());
        }
        tab.storage.set_string(keys::USER, &user_json("u1", "user"));
        tab.transport.route(Method::POST, "/auth/refresh-token", |_| {
            (StatusCode::OK, refresh_ok("t2", "r2", NOW + 30 * MINUTE))
        });
    }

    #[test]
    fn test_decide() {
        let threshold = Duration::from_secs(300);
        assert_eq!(decide(None, threshold), ExpiryAction::Clear);
        assert_eq!(decide(Some(0), threshold), ExpiryAction::Clear);
        assert_eq!(decide(Some(-5), threshold), ExpiryAction::Clear);
        assert_eq!(decide(Some(200_000), threshold), ExpiryAction::Refresh);
        assert_eq!(decide(Some(299_999), threshold), ExpiryAction::Refresh);
        assert_eq!(decide(Some(300_000), threshold), ExpiryAction::Nothing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_four_minutes_left_refreshes_once() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 4 * MINUTE));
        tab.store.initialize().await;

        let _watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(61)).await;

        assert_eq!(tab.transport.count("/auth/refresh-token"), 1);
        assert_eq!(tab.storage.get_string(keys::TOKEN).as_deref(), Some("t2"));
        assert_eq!(
            tab.store.snapshot().token.unwrap().expose_secret(),
            "t2"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_token_cleared_on_next_tick() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 10 * MINUTE));
        tab.store.initialize().await;

        let _watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(tab.store.snapshot().token.is_some());

        tab.clock.advance(11 * MINUTE);
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(tab.store.snapshot().token.is_none());
        assert_eq!(tab.transport.count("/auth/refresh-token"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_expiry_clears_session() {
        let tab = TestTab::new();
        seed(&tab, None);
        tab.store.initialize().await;
        assert!(tab.store.snapshot().is_authenticated());

        let _watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(tab.store.snapshot().token.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_extreme_stored_expiry_does_not_kill_watch() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 10 * MINUTE));
        tab.store.initialize().await;
        let watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(1)).await;

        tab.storage.set_string(keys::TOKEN_EXPIRY, &i64::MAX.to_string());
        assert_eq!(tab.store.check_expiry().await, ExpiryAction::Nothing);
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!watch.is_finished());
        assert!(tab.store.snapshot().token.is_some());

        tab.storage.set_string(keys::TOKEN_EXPIRY, &i64::MIN.to_string());
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(tab.store.snapshot().token.is_none());
        assert!(!watch.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_waits_for_hydration_and_stops_on_drop() {
        let tab = TestTab::new();
        seed(&tab, Some(NOW + 4 * MINUTE));

        let watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(120)).await;
        // Still hydrating: nothing happens
        assert_eq!(tab.transport.count("/auth/refresh-token"), 0);

        drop(watch);
        tab.store.initialize().await;
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(tab.transport.count("/auth/refresh-token"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_watch_resumes_after_new_login() {
        let tab = TestTab::new();
        tab.store.initialize().await;
        let watch = tab.store.spawn_expiry_watch();
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!watch.is_finished());

        seed(&tab, Some(NOW + 2 * MINUTE));
        tab.store.save_session(
            &crate::session::TokenData {
                access_token: Some(SecretString::from("t1")),
                ..Default::default()
            },
            None,
        );
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(tab.transport.count("/auth/refresh-token"), 1);
    }
}
