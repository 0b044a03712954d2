//! Payment gateway calls. The gateway flow itself is opaque to this crate:
//! requests and responses are passed through as JSON.

use serde::Serialize;
use serde_json::Value;
use tasty_bites_core::{CartLine, Price};
use tracing::instrument;

use crate::http::{ApiClient, ApiError, ApiRequest};

/// Payment creation request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub amount: Price,
    pub order_info: String,
    pub cart_items: Vec<CartLine>,
}

/// Client for the `/vnpay` endpoints.
#[derive(Debug, Clone)]
pub struct PaymentService {
    client: ApiClient,
}

impl PaymentService {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Start a gateway payment. The response usually carries a `paymentUrl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the gateway refuses it.
    #[instrument(skip(self, payment), fields(amount = %payment.amount))]
    pub async fn create_payment(&self, payment: &PaymentRequest) -> Result<Value, ApiError> {
        let request = ApiRequest::post("/vnpay/create-payment").json(payment)?;
        let response = self.client.execute(request).await?;
        reject_on_failure(response.body)
    }

    /// Verify a gateway callback; `params` are the callback's query values.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the gateway refuses it.
    #[instrument(skip(self, params))]
    pub async fn check_payment(&self, params: &Value) -> Result<Value, ApiError> {
        let request = ApiRequest::post("/vnpay/check-payment").json(params)?;
        let response = self.client.execute(request).await?;
        reject_on_failure(response.body)
    }
}

/// The payment URL of a `create_payment` response, wherever the gateway put it.
#[must_use]
pub fn payment_url(response: &Value) -> Option<&str> {
    response
        .get("paymentUrl")
        .or_else(|| response.pointer("/data/paymentUrl"))
        .and_then(Value::as_str)
}

fn reject_on_failure(body: Value) -> Result<Value, ApiError> {
    if body.get("success").and_then(Value::as_bool) == Some(false) {
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Payment failed")
            .to_string();
        return Err(ApiError::Rejected { message });
    }
    Ok(body)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use reqwest::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::testing::TestTab;

    #[tokio::test]
    async fn test_create_payment_returns_url() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/vnpay/create-payment", |_| {
            (StatusCode::OK, json!({"success": true, "paymentUrl": "https://pay.example/x"}))
        });

        let payment = PaymentRequest {
            amount: Price::default(),
            order_info: "Order 1".to_string(),
            cart_items: Vec::new(),
        };
        let response = tab.payments.create_payment(&payment).await.unwrap();
        assert_eq!(payment_url(&response), Some("https://pay.example/x"));
        assert_eq!(tab.transport.calls()[0].body().unwrap()["orderInfo"], "Order 1");
    }

    #[tokio::test]
    async fn test_gateway_refusal() {
        let tab = TestTab::new();
        tab.transport.route(Method::POST, "/vnpay/check-payment", |_| {
            (StatusCode::OK, json!({"success": false, "message": "Invalid signature"}))
        });

        let err = tab.payments.check_payment(&json!({})).await.unwrap_err();
        assert!(matches!(err, ApiError::Rejected { ref message } if message == "Invalid signature"));
    }
}
