//! Tasty Bites client library.
//!
//! Client-side core of the Tasty Bites storefront: the authenticated HTTP
//! pipeline, the session and cart store, and the plumbing that keeps several
//! open instances ("tabs") of the storefront in agreement.
//!
//! # Architecture
//!
//! ```text
//!  front-end ──► session::Store ──► services::* ──► http::ApiClient ──► Transport
//!                    │   ▲                               │
//!                    ▼   │                               ▼ (refresh / purge)
//!              storage::KeyValueStore ◄──────────────────┘
//!                    │
//!                    ▼ StorageEvent
//!              sync::SyncChannel ──► sync::CrossTabSync (other tabs)
//!
//!  guard::RouteGuard reads session::StoreState
//! ```
//!
//! Every component is constructed explicitly and passed by handle; there
//! are no global singletons. Handles are cheap to clone (`Arc` inside).

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod clock;
pub mod config;
pub mod guard;
pub mod http;
pub mod services;
pub mod session;
pub mod storage;
pub mod sync;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{ClientConfig, ConfigError, HttpConfig, MissingExpiry, SessionConfig};
pub use guard::{GuardDecision, RouteGuard};
pub use http::{
    ApiClient, ApiError, ApiRequest, ApiResponse, Navigation, RefreshError, RefreshedTokens,
    ReqwestTransport, Transport, TransportError,
};
pub use services::{
    AuthService, CatalogService, CheckoutDetails, ContactService, Credentials, Order,
    OrderService, PaymentService, Product,
};
pub use session::{ExpiryAction, ExpiryWatch, SessionError, Store, StoreState, TokenData};
pub use storage::{FileBackend, KeyValueStore, MemoryBackend, StorageBackend, StorageError};
pub use sync::{CrossTabSync, StorageEvent, SyncChannel, TabId};
