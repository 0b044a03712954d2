//! Wire transport.

use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde_json::Value;
use tracing::instrument;
use url::Url;

use super::{ApiRequest, ApiResponse, TransportError};

/// Sends one request and returns whatever came back.
///
/// Implementations do no auth handling and no retries; every non-transport
/// outcome, 401 included, is a successful `ApiResponse`.
pub trait Transport: Send + Sync + 'static {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>>;
}

/// Production transport over `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
}

impl ReqwestTransport {
    /// Create a transport for `base_url`; request paths are appended to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url, TransportError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path()))
            .map_err(|e| TransportError::Other(format!("invalid URL: {e}")))?;
        if !request.query_pairs().is_empty() {
            url.query_pairs_mut().extend_pairs(request.query_pairs());
        }
        Ok(url)
    }

    #[instrument(skip(self, request), fields(method = %request.method(), path = %request.path()))]
    async fn dispatch(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request)?;
        let mut builder = self.client.request(request.method().clone(), url);
        if let Some(token) = request.bearer() {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let text = response.text().await?;
        tracing::debug!(status = %status, "Response received");

        Ok(ApiResponse::new(status, parse_body(status, &text)))
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a ApiRequest,
    ) -> BoxFuture<'a, Result<ApiResponse, TransportError>> {
        Box::pin(self.dispatch(request))
    }
}

fn parse_body(status: StatusCode, text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| {
        tracing::debug!(status = %status, "Non-JSON response body");
        Value::String(text.to_string())
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base_path_and_query() {
        let base = Url::parse("https://shop.example.com/api/").unwrap();
        let transport = ReqwestTransport::new(&base, Duration::from_secs(5)).unwrap();
        let request = ApiRequest::get("/orders/get-all-orders")
            .query("page", 1)
            .query("limit", 10);
        assert_eq!(
            transport.url_for(&request).unwrap().as_str(),
            "https://shop.example.com/api/orders/get-all-orders?page=1&limit=10"
        );
    }

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(StatusCode::NO_CONTENT, ""), Value::Null);
        assert_eq!(
            parse_body(StatusCode::OK, r#"{"success":true}"#),
            serde_json::json!({"success": true})
        );
        assert_eq!(
            parse_body(StatusCode::BAD_GATEWAY, "Bad gateway"),
            Value::String("Bad gateway".to_string())
        );
    }
}
