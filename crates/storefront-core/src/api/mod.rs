//! REST API client module for the storefront service.
//!
//! This module provides the `SessionClient`, which attaches the stored
//! bearer token to protected requests and recovers from an expired token by
//! renewing once and retrying once, and the `ApiClient` built on top of it.

pub mod client;
pub mod error;
pub mod request;
pub mod session_client;

pub use client::{ApiClient, LogoutOutcome};
pub use error::ApiError;
pub use request::ApiRequest;
pub use session_client::{RetryPolicy, SessionClient};
