//! HTTP pipeline errors.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// Failure to get any response at all.
///
/// `Clone` so one failed refresh can be reported to every waiting request.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("HTTP error: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Failure of the shared token refresh.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("no refresh token available")]
    MissingRefreshToken,
    #[error("refresh rejected: {0}")]
    Rejected(String),
    #[error("refresh transport failure: {0}")]
    Transport(#[from] TransportError),
    #[error("refresh did not settle within {0:?}")]
    TimedOut(Duration),
    #[error("malformed refresh response: {0}")]
    Malformed(String),
    #[error("refresh task ended without a result")]
    Abandoned,
}

/// Errors surfaced by [`ApiClient`](super::ApiClient).
#[derive(Debug, Error)]
pub enum ApiError {
    /// No response was received.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Non-success status not handled by the refresh protocol.
    #[error("{status}: {message}")]
    Status { status: StatusCode, message: String },

    /// Authorization failure on an auth endpoint: bad credentials, not an
    /// expired session.
    #[error("{message}")]
    Credentials { message: String },

    /// Authorization failure that could not be recovered (no refresh token,
    /// or the request was already replayed once).
    #[error("session expired: {message}")]
    SessionExpired { message: String },

    /// The backend answered `"success": false`.
    #[error("{message}")]
    Rejected { message: String },

    /// The shared refresh failed; the session has been purged.
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// Request or response body did not (de)serialize.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// Bad credentials (login, register, password reset). Never triggers
    /// refresh or logout.
    #[must_use]
    pub const fn is_credential_error(&self) -> bool {
        matches!(self, Self::Credentials { .. })
    }

    /// The session is gone and the user must log in again.
    #[must_use]
    pub const fn is_session_error(&self) -> bool {
        matches!(self, Self::SessionExpired { .. } | Self::Refresh(_))
    }

    /// No response was received.
    #[must_use]
    pub const fn is_network_error(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Refresh(RefreshError::Transport(_)))
    }

    /// HTTP status, when the failure carried one.
    #[must_use]
    pub const fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Credentials { .. } | Self::SessionExpired { .. } => {
                Some(StatusCode::UNAUTHORIZED)
            }
            _ => None,
        }
    }
}
