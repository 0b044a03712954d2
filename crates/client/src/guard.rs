//! Route guard for protected views.
//!
//! A [`RouteGuard`] lives as long as one mounted view. Feed it every state
//! the view renders with; it decides whether to show a loading indicator,
//! redirect, render nothing, or render the protected content.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut guard = RouteGuard::require_auth();
//! let mut rx = store.subscribe();
//! match guard.wait_for_decision(&mut rx).await {
//!     GuardDecision::Redirect(path) => navigate(&path),
//!     GuardDecision::Render => render_orders(),
//!     GuardDecision::Loading | GuardDecision::Blank => {}
//! }
//! ```

use tokio::sync::watch;

use crate::session::StoreState;

/// Login entry point redirected to when no session is present.
pub const LOGIN_PATH: &str = "/login";

/// Where authenticated non-admins are sent from admin views.
pub const HOME_PATH: &str = "/";

/// What the guarded view should do for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    /// Session hydration in progress: show a loading indicator.
    Loading,
    /// Navigate to this path. Issued once per mount.
    Redirect(String),
    /// Access denied and the redirect was already issued: render nothing.
    Blank,
    /// Render the protected content.
    Render,
}

/// Per-mount gate in front of a protected view.
#[derive(Debug, Clone)]
pub struct RouteGuard {
    login_path: String,
    require_admin: bool,
    has_redirected: bool,
}

impl RouteGuard {
    /// Guard requiring any authenticated user.
    #[must_use]
    pub fn require_auth() -> Self {
        Self::new(LOGIN_PATH, false)
    }

    /// Guard for back-office views: also requires the admin role.
    #[must_use]
    pub fn require_admin() -> Self {
        Self::new(LOGIN_PATH, true)
    }

    #[must_use]
    pub fn new(login_path: impl Into<String>, require_admin: bool) -> Self {
        Self {
            login_path: login_path.into(),
            require_admin,
            has_redirected: false,
        }
    }

    /// Decide for one render of `state`.
    pub fn evaluate(&mut self, state: &StoreState) -> GuardDecision {
        if state.is_session_loading {
            self.has_redirected = false;
            return GuardDecision::Loading;
        }

        let target = if !state.is_authenticated() {
            self.login_path.as_str()
        } else if self.require_admin && !state.is_admin() {
            HOME_PATH
        } else {
            self.has_redirected = false;
            return GuardDecision::Render;
        };

        if self.has_redirected {
            GuardDecision::Blank
        } else {
            self.has_redirected = true;
            tracing::debug!(path = %target, "Route guard redirecting");
            GuardDecision::Redirect(target.to_string())
        }
    }

    /// Wait for hydration to finish, then decide.
    ///
    /// If the store is dropped while still loading, the last observed state
    /// is evaluated.
    pub async fn wait_for_decision(
        &mut self,
        rx: &mut watch::Receiver<StoreState>,
    ) -> GuardDecision {
        if rx.wait_for(|state| !state.is_session_loading).await.is_err() {
            tracing::debug!("Store dropped before hydration finished");
        }
        let state = rx.borrow().clone();
        self.evaluate(&state)
    }
}
