//! Data models for storefront entities.
//!
//! This module contains the request and response payloads exchanged with
//! the storefront service:
//!
//! - `Product`: catalog entries with price and inventory
//! - `OrderItem`, `NewOrder`, `OrderReceipt`, `Order`: order placement and lookup
//! - `NewUser`, `Credentials`, `Registration`, `TokenResponse`: identity

pub mod order;
pub mod product;
pub mod user;

pub use order::{NewOrder, Order, OrderItem, OrderReceipt};
pub use product::Product;
pub use user::{Credentials, NewUser, Registration, RevocationResponse, TokenResponse};
