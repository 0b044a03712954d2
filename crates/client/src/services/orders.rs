//! Order service: checkout submission and the order back-office.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tasty_bites_core::{Cart, Email, OrderId, OrderStatus, PaymentMethod, Price, ProductId};
use tracing::instrument;

use crate::http::{ApiClient, ApiError, ApiRequest};

/// Default page size of the order list.
pub const DEFAULT_PAGE_SIZE: u32 = 12;

/// Contact details captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// One ordered product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    #[serde(alias = "_id", alias = "id")]
    pub product_id: ProductId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Price,
    pub quantity: u32,
}

/// Checkout form contents other than the cart.
#[derive(Debug, Clone)]
pub struct CheckoutDetails {
    pub name: String,
    pub email: Email,
    pub phone: String,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub notes: String,
}

/// The order payload sent to `/orders/create-order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub customer: Customer,
    pub items: Vec<OrderItem>,
    pub shipping_address: String,
    pub payment_method: PaymentMethod,
    pub notes: String,
}

impl OrderDraft {
    /// Build a draft from the cart. `price_of` supplies the current catalog
    /// price of a product; lines it does not know keep their captured price.
    #[must_use]
    pub fn from_cart(
        cart: &Cart,
        details: &CheckoutDetails,
        price_of: impl Fn(&ProductId) -> Option<Price>,
    ) -> Self {
        let items = cart
            .lines()
            .iter()
            .map(|line| OrderItem {
                product_id: line.product_id.clone(),
                name: line.name.clone(),
                price: price_of(&line.product_id).unwrap_or(line.price),
                quantity: line.quantity,
            })
            .collect();

        Self {
            customer: Customer {
                name: details.name.trim().to_string(),
                email: details.email.as_str().to_string(),
                phone: details.phone.trim().to_string(),
            },
            items,
            shipping_address: details.shipping_address.trim().to_string(),
            payment_method: details.payment_method,
            notes: details.notes.trim().to_string(),
        }
    }

    /// Sum of every item's price times quantity.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(|i| i.price.line_total(i.quantity)).sum()
    }
}

/// An order as stored by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(alias = "_id")]
    pub id: OrderId,
    #[serde(default)]
    pub order_number: Option<String>,
    #[serde(default)]
    pub customer: Option<Customer>,
    #[serde(default)]
    pub items: Vec<OrderItem>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub payment_method: Option<PaymentMethod>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub total_amount: Price,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Human-facing label: the order number, or the id when there is none.
    #[must_use]
    pub fn label(&self) -> String {
        self.order_number
            .clone()
            .unwrap_or_else(|| format!("Order #{}", self.id))
    }
}

/// Pagination block of the order list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Pagination {
    pub current_page: u32,
    pub total_pages: u32,
    pub total_orders: u64,
    pub orders_on_current_page: u32,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

/// One page of orders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OrderPage {
    #[serde(default, rename = "data")]
    pub orders: Vec<Order>,
    #[serde(default)]
    pub pagination: Option<Pagination>,
}

/// Client for the `/orders` endpoints.
#[derive(Debug, Clone)]
pub struct OrderService {
    client: ApiClient,
}

impl OrderService {
    #[must_use]
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    /// Submit an order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the backend rejects the order.
    #[instrument(skip(self, draft), fields(items = draft.items.len()))]
    pub async fn create(&self, draft: &OrderDraft) -> Result<Order, ApiError> {
        let request = ApiRequest::post("/orders/create-order").json(draft)?;
        let data: Value = self.client.execute(request).await?.into_data()?;
        parse_order(data)
    }

    /// List orders, newest first, `limit` per page. Pages start at 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    #[instrument(skip(self))]
    pub async fn list(&self, page: u32, limit: u32) -> Result<OrderPage, ApiError> {
        let request = ApiRequest::get("/orders/get-all-orders")
            .query("page", page.max(1))
            .query("limit", limit.max(1));
        let response = self.client.execute(request).await?;
        if response.is_rejected() {
            return Err(ApiError::Rejected {
                message: response.failure_message(),
            });
        }
        // The list keeps `pagination` beside `data`, so the envelope is read whole.
        Ok(serde_json::from_value(response.body)?)
    }

    /// Fetch one order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the order does not exist.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn get(&self, id: &OrderId) -> Result<Order, ApiError> {
        let data: Value = self
            .client
            .execute(ApiRequest::get(format!("/orders/{id}")))
            .await?
            .into_data()?;
        parse_order(data)
    }

    /// Move an order to `status` (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self), fields(order_id = %id, status = %status))]
    pub async fn update_status(&self, id: &OrderId, status: OrderStatus) -> Result<Order, ApiError> {
        let request = ApiRequest::put(format!("/orders/{id}")).json(&json!({ "status": status }))?;
        let data: Value = self.client.execute(request).await?.into_data()?;
        parse_order(data)
    }

    /// Delete an order (admin).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the caller is not an admin.
    #[instrument(skip(self), fields(order_id = %id))]
    pub async fn delete(&self, id: &OrderId) -> Result<(), ApiError> {
        self.client
            .execute(ApiRequest::delete(format!("/orders/{id}")))
            .await?;
        Ok(())
    }
}

/// Single-order payloads come bare or wrapped as `{ order }`.
fn parse_order(data: Value) -> Result<Order, ApiError> {
    let order = match data {
        Value::Object(mut map) if map.contains_key("order") => {
            map.remove("order").unwrap_or(Value::Null)
        }
        other => other,
    };
    Ok(serde_json::from_value(order)?)
}
