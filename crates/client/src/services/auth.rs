//! Auth service: login, registration, profile, and password endpoints.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tasty_bites_core::{Email, User};
use tracing::instrument;

use crate::http::{ApiClient, ApiError, ApiRequest, RefreshError, RefreshedTokens};

/// Lifetime requested for access tokens at login.
pub const LOGIN_TOKEN_MINUTES: u32 = 30;

/// Login form.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: Email,
    pub password: SecretString,
}

/// Registration form.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: Email,
    pub password: SecretString,
}

/// Editable profile fields. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// What a successful login returns.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    /// Token lifetime as sent by the backend (seconds or `"30m"`-style).
    pub expires_in: Option<Value>,
    pub user: User,
}

#[derive(Deserialize)]
struct LoginData {
    tokens: LoginTokens,
    user: User,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginTokens {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<Value>,
}

/// Client for the `/auth` endpoints.
#[derive(Debug, Clone)]
pub struct AuthService {
    client: ApiClient,
}

impl AuthService {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Exchange credentials for a token pair and the user profile.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Credentials` for a wrong email or password and
    /// `ApiError::Rejected` when the backend refuses the login.
    #[instrument(skip(self, credentials), fields(email = %credentials.email))]
    pub async fn login(&self, credentials: &Credentials) -> Result<LoginOutcome, ApiError> {
        let request = ApiRequest::post("/auth/login").json(&json!({
            "email": credentials.email.as_str(),
            "password": credentials.password.expose_secret(),
            "expiresInMins": LOGIN_TOKEN_MINUTES,
        }))?;

        let data: LoginData = self.client.execute(request).await?.into_data()?;
        Ok(LoginOutcome {
            access_token: SecretString::from(data.tokens.access_token),
            refresh_token: data.tokens.refresh_token.map(SecretString::from),
            expires_in: data.tokens.expires_in,
            user: data.user,
        })
    }

    /// Create an account. Returns the new user when the backend includes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the registration.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: &Registration) -> Result<Option<User>, ApiError> {
        let request = ApiRequest::post("/auth/register").json(&json!({
            "name": registration.name,
            "email": registration.email.as_str(),
            "password": registration.password.expose_secret(),
        }))?;

        let data: Value = self.client.execute(request).await?.into_data()?;
        match data.get("user") {
            Some(user) => Ok(Some(serde_json::from_value(user.clone())?)),
            None => Ok(None),
        }
    }

    /// Fetch the current user's profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the session cannot be recovered.
    #[instrument(skip(self))]
    pub async fn profile(&self) -> Result<User, ApiError> {
        let data: Value = self
            .client
            .execute(ApiRequest::get("/auth/profile"))
            .await?
            .into_data()?;
        parse_user(data)
    }

    /// Update the current user's profile and return the stored result.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the update is rejected.
    #[instrument(skip(self, update))]
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        let request = ApiRequest::put("/auth/profile").json(update)?;
        let data: Value = self.client.execute(request).await?.into_data()?;
        parse_user(data)
    }

    /// Exchange the stored refresh token for a new token pair.
    ///
    /// Shares the client's single in-flight refresh, so calling this while
    /// the interceptor is already refreshing does not issue a second call.
    ///
    /// # Errors
    ///
    /// Returns a `RefreshError` if no refresh token is stored or the refresh
    /// fails (in which case the session has been purged).
    pub async fn refresh_token(&self) -> Result<RefreshedTokens, RefreshError> {
        self.client.refresh().await
    }

    /// Send a password-reset email.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self), fields(email = %email))]
    pub async fn forgot_password(&self, email: &Email) -> Result<Option<String>, ApiError> {
        let request =
            ApiRequest::post("/auth/forgot-password").json(&json!({ "email": email.as_str() }))?;
        let response = self.client.execute(request).await?;
        acknowledge(&response.body)
    }

    /// Set a new password using the token from a reset email.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Credentials` if the reset token is invalid or expired.
    #[instrument(skip_all)]
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &SecretString,
    ) -> Result<Option<String>, ApiError> {
        let request = ApiRequest::post("/auth/reset-password").json(&json!({
            "token": reset_token,
            "newPassword": new_password.expose_secret(),
        }))?;
        let response = self.client.execute(request).await?;
        acknowledge(&response.body)
    }

    /// Change the password of the logged-in user.
    ///
    /// # Errors
    ///
    /// Returns an error if the current password is wrong or the request fails.
    #[instrument(skip_all)]
    pub async fn change_password(
        &self,
        current_password: &SecretString,
        new_password: &SecretString,
    ) -> Result<Option<String>, ApiError> {
        let request = ApiRequest::put("/auth/change-password").json(&json!({
            "currentPassword": current_password.expose_secret(),
            "newPassword": new_password.expose_secret(),
        }))?;
        let response = self.client.execute(request).await?;
        acknowledge(&response.body)
    }
}

/// Profile payloads come either bare or wrapped as `{ user }`.
fn parse_user(data: Value) -> Result<User, ApiError> {
    let user = match data {
        Value::Object(mut map) if map.contains_key("user") => {
            map.remove("user").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(user)?)
}

/// Check a message-only envelope and return its message.
fn acknowledge(body: &Value) -> Result<Option<String>, ApiError> {
    let message = body.get("message").and_then(Value::as_str).map(str::to_string);
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        return Err(ApiError::Rejected {
            message: message.unwrap_or_else(|| "Request rejected".to_string()),
        });
    }
    Ok(message)
}
