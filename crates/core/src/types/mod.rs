//! Core types for Tasty Bites.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod duration;
pub mod email;
pub mod id;
pub mod price;
pub mod status;
pub mod user;

pub use cart::{Cart, CartLine};
pub use duration::{DEFAULT_TOKEN_LIFETIME_MS, format_remaining, parse_expires_in};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use status::*;
pub use user::{Role, User};
