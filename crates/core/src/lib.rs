//! Tasty Bites Core - Shared domain types.
//!
//! This crate provides the types shared by every Tasty Bites component:
//! - `client` - Session, cart, and HTTP plumbing for the storefront
//! - `cli` - Terminal front-end driving the client
//!
//! # Architecture
//!
//! The core crate contains only types and pure state transitions - no I/O,
//! no storage access, no HTTP clients. This keeps it lightweight and allows
//! it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, prices, users, the cart, and token durations

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
