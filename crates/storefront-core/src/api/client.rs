//! API client for the storefront service.
//!
//! `ApiClient` wraps a [`SessionClient`] and exposes the operations the
//! presentation layer uses: identity (register, login, logout) and catalog
//! (list products, fetch a product, place and look up orders).

use anyhow::Context;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info, warn};

use super::session_client::{RetryPolicy, SessionClient};
use super::{ApiError, ApiRequest};
use crate::auth::{AccessToken, CredentialStore, RenewalMode, RenewalToken, Renewer, Session};
use crate::config::Config;
use crate::models::{
    Credentials, NewOrder, NewUser, Order, OrderItem, OrderReceipt, Product, Registration,
    RevocationResponse, TokenResponse,
};

// ============================================================================
// Endpoints
// ============================================================================

const PRODUCTS_PATH: &str = "/products/";
const ORDERS_PATH: &str = "/orders/";
const REGISTER_PATH: &str = "/users/register";
const LOGIN_PATH: &str = "/users/login";
const LOGOUT_PATH: &str = "/users/logout";

/// Login header asking the server to keep the renewal token in a cookie.
const USE_COOKIE_HEADER: &str = "x-use-cookie";

// Fallback messages when the server gives no usable detail
const LOAD_PRODUCTS_FAILED: &str = "Failed to load products";
const PRODUCT_NOT_FOUND: &str = "Product not found";
const ORDER_FAILED: &str = "Order failed";
const ORDER_NOT_FOUND: &str = "Order not found";
const REGISTRATION_FAILED: &str = "Registration failed";
const LOGIN_FAILED: &str = "Login failed";
const LOGOUT_FAILED: &str = "Logout failed";

#[derive(Serialize)]
struct RevokeRequest<'a> {
    refresh_token: &'a str,
}

/// Result of [`ApiClient::logout`].
///
/// The local session is always gone by the time this is returned.
/// `revocation` reports whether the server was told; callers that do not
/// care drop it.
#[derive(Debug)]
pub struct LogoutOutcome {
    /// `Ok(true)` if the server revoked a stored renewal token.
    pub revocation: Result<bool, ApiError>,
}

/// Storefront API client.
/// Clone is cheap - all clones share the connection pool and credential store.
#[derive(Clone)]
pub struct ApiClient {
    session: SessionClient,
}

impl ApiClient {
    /// Build a client for the server and renewal mode named in `config`.
    pub fn new(config: &Config, store: CredentialStore) -> anyhow::Result<Self> {
        let mode = config.renewal_mode;
        let mut builder = Client::builder().timeout(config.request_timeout());
        // The implicit flow keeps the renewal token in a server-set cookie,
        // held by the store so it is persisted with the session.
        if mode == RenewalMode::Implicit {
            builder = builder.cookie_provider(store.cookies());
        }
        let http = builder.build().context("Failed to build HTTP client")?;

        let retry = match config.rate_limit_retries {
            Some(max_retries) => RetryPolicy {
                max_retries,
                ..RetryPolicy::default()
            },
            None => RetryPolicy::default(),
        };

        let base_url = config.api_base().to_string();
        let renewer = Renewer::new(http.clone(), &base_url, mode, store.clone());
        debug!(base_url = %base_url, ?mode, "API client configured");

        Ok(Self::from_session_client(SessionClient::new(
            http, base_url, store, renewer, retry,
        )))
    }

    pub fn from_session_client(session: SessionClient) -> Self {
        Self { session }
    }

    pub fn session_client(&self) -> &SessionClient {
        &self.session
    }

    pub fn store(&self) -> &CredentialStore {
        self.session.store()
    }

    pub async fn session(&self) -> Session {
        self.store().get().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.store().is_authenticated().await
    }

    async fn parse_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            ApiError::InvalidResponse(format!(
                "Failed to parse {}: {} (body: {})",
                what,
                e,
                ApiError::truncate_body(&body)
            ))
        })
    }

    // ===== Identity =====

    /// Create an account. Does not log in and does not touch the credential store.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: Option<&str>,
    ) -> Result<Registration, ApiError> {
        let request = ApiRequest::post(REGISTER_PATH).json(&NewUser {
            email,
            password,
            full_name,
        })?;
        let response = self.session.request(&request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Registration rejected");
            return Err(ApiError::operation_failed(&body, REGISTRATION_FAILED));
        }

        let registration: Registration = Self::parse_json(response, "registration").await?;
        info!(user_id = registration.id, "Account registered");
        Ok(registration)
    }

    /// Log in and seed the credential store.
    ///
    /// On failure the store is left exactly as it was.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        let mut request = ApiRequest::post(LOGIN_PATH).json(&Credentials { email, password })?;
        if self.session.renewer().mode() == RenewalMode::Implicit {
            request = request.header(
                HeaderName::from_static(USE_COOKIE_HEADER),
                HeaderValue::from_static("1"),
            );
        }

        let response = self.session.request(&request).await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Login rejected");
            return Err(ApiError::operation_failed(&body, LOGIN_FAILED));
        }

        let tokens: TokenResponse = Self::parse_json(response, "login response").await?;
        let has_refresh = tokens.refresh_token.is_some();
        self.store()
            .update(
                Some(AccessToken::from(tokens.access_token)),
                tokens.refresh_token.map(RenewalToken::from),
            )
            .await;

        info!(has_refresh, "Login successful");
        Ok(self.store().get().await)
    }

    /// Tell the server to revoke the session, then clear local credentials.
    ///
    /// Never fails: the revocation call is best effort and its result is
    /// only reported in the returned [`LogoutOutcome`].
    pub async fn logout(&self) -> LogoutOutcome {
        let refresh = self.store().refresh_token().await;
        let revocation = self.revoke(refresh.as_ref()).await;
        if let Err(ref e) = revocation {
            warn!(error = %e, "Server-side logout failed, clearing local session anyway");
        }

        self.store().clear().await;
        info!("Logged out");
        LogoutOutcome { revocation }
    }

    async fn revoke(&self, refresh: Option<&RenewalToken>) -> Result<bool, ApiError> {
        let mut request = ApiRequest::post(LOGOUT_PATH);
        if let Some(token) = refresh {
            request = request.json(&RevokeRequest {
                refresh_token: token.as_str(),
            })?;
        }

        let response = self.session.request(&request).await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::operation_failed(&body, LOGOUT_FAILED));
        }

        let revoked: RevocationResponse = response.json().await.unwrap_or_default();
        Ok(revoked.revoked)
    }

    // ===== Catalog =====

    /// Fetch the full product catalog. Public endpoint.
    pub async fn list_products(&self) -> Result<Vec<Product>, ApiError> {
        let response = self.session.request(&ApiRequest::get(PRODUCTS_PATH)).await?;
        if !response.status().is_success() {
            debug!(status = %response.status(), "Product list request failed");
            return Err(ApiError::OperationFailed(LOAD_PRODUCTS_FAILED.to_string()));
        }
        let products: Vec<Product> = Self::parse_json(response, "product list").await?;
        debug!(count = products.len(), "Products loaded");
        Ok(products)
    }

    /// Fetch a single product. Public endpoint.
    pub async fn fetch_product(&self, product_id: i64) -> Result<Product, ApiError> {
        let path = format!("{}{}", PRODUCTS_PATH, product_id);
        let response = self.session.request(&ApiRequest::get(path)).await?;
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::operation_failed(&body, PRODUCT_NOT_FOUND));
        }
        Self::parse_json(response, "product").await
    }

    /// Place an order for `items`. Requires a logged-in session.
    pub async fn place_order(&self, items: Vec<OrderItem>) -> Result<OrderReceipt, ApiError> {
        let request = ApiRequest::post(ORDERS_PATH).json(&NewOrder { items })?;
        let response = self.session.authorized_request(&request).await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body, ORDER_FAILED));
        }

        let receipt: OrderReceipt = Self::parse_json(response, "order receipt").await?;
        info!(order_id = receipt.order_id, total_cents = receipt.total_cents, "Order placed");
        Ok(receipt)
    }

    /// Look up a placed order by ID.
    pub async fn fetch_order(&self, order_id: i64) -> Result<Order, ApiError> {
        let path = format!("{}{}", ORDERS_PATH, order_id);
        let response = self
            .session
            .authorized_request(&ApiRequest::get(path))
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status, &body, ORDER_NOT_FOUND));
        }
        Self::parse_json(response, "order").await
    }
}
