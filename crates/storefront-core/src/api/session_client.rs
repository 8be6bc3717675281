//! Authenticated HTTP calls with at most one transparent renewal.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::{debug, warn};

use super::{ApiError, ApiRequest};
use crate::auth::{AccessToken, CredentialStore, Renewer};

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Backoff applied when the server answers 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RATE_LIMIT_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Hand 429 responses straight back to the caller.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }
}

/// Issues requests against the storefront API.
/// Clone is cheap - the HTTP client, store and renewer are all shared handles.
#[derive(Clone)]
pub struct SessionClient {
    http: Client,
    base_url: String,
    store: CredentialStore,
    renewer: Renewer,
    retry: RetryPolicy,
}

impl SessionClient {
    pub fn new(
        http: Client,
        base_url: impl Into<String>,
        store: CredentialStore,
        renewer: Renewer,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            store,
            renewer,
            retry,
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn renewer(&self) -> &Renewer {
        &self.renewer
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send `request` with the stored access token, renewing once on 401.
    ///
    /// The first response is returned as-is unless it is 401. On 401 the
    /// renewal protocol runs; if it succeeds the request is sent exactly once
    /// more with the new token and that response is final, whatever its
    /// status. If the server refuses the renewal the store has been cleared
    /// and `RenewalFailed` is returned without retrying. If the renewal
    /// endpoint cannot be reached the result is `Network` and the store is
    /// left as it was.
    pub async fn authorized_request(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        let token = self.store.access_token().await;
        let response = self.dispatch(request, token.as_ref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(
            method = %request.method(),
            path = request.path(),
            had_token = token.is_some(),
            "Request unauthorized, renewing session"
        );
        let renewed = self.renewer.renew_rejected(token.as_ref()).await?;

        let response = self.dispatch(request, Some(&renewed)).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = request.path(), "Request still unauthorized after renewal");
        }
        Ok(response)
    }

    /// Send `request` without credentials. Never renews.
    pub async fn request(&self, request: &ApiRequest) -> Result<Response, ApiError> {
        self.dispatch(request, None).await
    }

    async fn dispatch(
        &self,
        request: &ApiRequest,
        token: Option<&AccessToken>,
    ) -> Result<Response, ApiError> {
        let mut retries = 0;
        let mut backoff = self.retry.initial_backoff;

        loop {
            let response = request
                .build(&self.http, &self.base_url, token)
                .send()
                .await?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS
                || retries >= self.retry.max_retries
            {
                return Ok(response);
            }

            retries += 1;
            warn!(
                path = request.path(),
                retry = retries,
                backoff_ms = backoff.as_millis() as u64,
                "Rate limited, backing off"
            );
            tokio::time::sleep(backoff).await;
            backoff *= 2; // Exponential backoff
        }
    }
}
