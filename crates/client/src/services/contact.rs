//! Contact form submission.

use serde::Serialize;
use tasty_bites_core::Email;
use tracing::instrument;

use crate::http::{ApiClient, ApiError, ApiRequest};

/// A message from the contact form.
#[derive(Debug, Clone, Serialize)]
pub struct ContactMessage {
    pub name: String,
    pub email: Email,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ContactService {
    client: ApiClient,
}

impl ContactService {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Send a contact message.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the message is rejected.
    #[instrument(skip(self, message), fields(email = %message.email))]
    pub async fn send(&self, message: &ContactMessage) -> Result<(), ApiError> {
        let request = ApiRequest::post("/portfolio/contact").json(message)?;
        let response = self.client.execute(request).await?;
        if response.is_rejected() {
            return Err(ApiError::Rejected {
                message: response.failure_message(),
            });
        }
        Ok(())
    }
}
