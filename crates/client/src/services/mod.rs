//! REST service wrappers.
//!
//! Each service is a thin typed layer over [`ApiClient`](crate::http::ApiClient),
//! so every call goes through the auth interceptor.

pub mod auth;
pub mod catalog;
pub mod contact;
pub mod orders;
pub mod payments;

pub use auth::{AuthService, Credentials, LoginOutcome, ProfileUpdate, Registration};
pub use catalog::{CatalogService, Product, ProductInput};
pub use contact::{ContactMessage, ContactService};
pub use orders::{CheckoutDetails, Customer, Order, OrderDraft, OrderItem, OrderPage, OrderService};
pub use payments::{PaymentRequest, PaymentService};
