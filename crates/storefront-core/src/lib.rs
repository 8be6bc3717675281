//! Storefront Core - session client, credential store and catalog API.
//!
//! This crate contains everything needed to talk to a storefront service:
//!
//! - `auth`: credential store, session persistence, and the renewal protocol
//! - `api`: the session client with transparent renewal, identity and catalog operations
//! - `models`: products, orders, and identity payloads
//! - `cache`: offline copy of the product catalog
//! - `config`: application configuration
//! - `utils`: display formatting

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, ApiRequest, LogoutOutcome, RetryPolicy, SessionClient};
pub use auth::{
    AccessToken, CredentialStore, RenewalError, RenewalMode, RenewalToken, Renewer, Session,
};
pub use config::Config;
