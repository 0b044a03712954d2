//! Request and response values passed through the pipeline.

use reqwest::{Method, StatusCode};
use secrecy::SecretString;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::ApiError;

/// An outgoing API request.
///
/// The retry state lives on the request itself, so a request that has already
/// been replayed after a refresh never triggers a second refresh while
/// unrelated requests remain free to.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    query: Vec<(String, String)>,
    body: Option<Value>,
    bearer: Option<SecretString>,
    retried: bool,
}

impl ApiRequest {
    /// Create a request for `path` (relative to the API base URL).
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            bearer: None,
            retried: false,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append a query parameter.
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.query.push((key.into(), value.to_string()));
        self
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Json` if `body` cannot be serialized.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self, ApiError> {
        self.body = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn query_pairs(&self) -> &[(String, String)] {
        &self.query
    }

    #[must_use]
    pub const fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    /// Bearer credential the request is (or will be) sent with.
    #[must_use]
    pub const fn bearer(&self) -> Option<&SecretString> {
        self.bearer.as_ref()
    }

    /// Whether the request has already been replayed after a refresh.
    #[must_use]
    pub const fn is_retried(&self) -> bool {
        self.retried
    }

    pub(crate) fn set_bearer(&mut self, bearer: Option<SecretString>) {
        self.bearer = bearer;
    }

    pub(crate) const fn mark_retried(&mut self) {
        self.retried = true;
    }
}

/// A response as received from the transport.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    /// Parsed JSON body. Empty bodies are `Null`; non-JSON bodies are kept as
    /// a JSON string.
    pub body: Value,
}

impl ApiResponse {
    #[must_use]
    pub const fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    /// The `message` field of the response envelope, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.body.get("message").and_then(Value::as_str)
    }

    /// Message to surface for a failed response.
    #[must_use]
    pub fn failure_message(&self) -> String {
        self.message()
            .or_else(|| self.body.get("error").and_then(Value::as_str))
            .map_or_else(
                || {
                    self.status
                        .canonical_reason()
                        .unwrap_or("Request failed")
                        .to_string()
                },
                str::to_string,
            )
    }

    /// Whether the envelope reports failure (`"success": false`) despite a
    /// successful status.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.body.get("success").and_then(Value::as_bool) == Some(false)
    }

    /// Unwrap the `{success, message, data}` envelope.
    ///
    /// Bodies without a `data` field are treated as bare payloads.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Rejected` for `"success": false`, or `ApiError::Json`
    /// if the payload does not match `T`.
    pub fn into_data<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        if self.is_rejected() {
            return Err(ApiError::Rejected {
                message: self.failure_message(),
            });
        }
        let payload = match self.body {
            Value::Object(mut map) if map.contains_key("data") => {
                map.remove("data").unwrap_or(Value::Null)
            }
            other => other,
        };
        Ok(serde_json::from_value(payload)?)
    }
}
