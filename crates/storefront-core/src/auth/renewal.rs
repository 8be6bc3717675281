//! Renewal protocol: trade a renewal credential for a fresh access token.
//!
//! Renewal runs at most once at a time per [`Renewer`]. Callers that ask for
//! a renewal while one is in flight await the same shared future, so a burst
//! of expired requests produces a single call to the renewal endpoint.
//!
//! A failure the server answered (a rejection or an unreadable token
//! response), or a missing renewal credential, clears the credential store
//! before it is reported. A transport failure leaves the store untouched: the
//! renewal credential may still be good once the network is back.

use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::api::error::server_detail;
use crate::models::TokenResponse;

use super::session::{AccessToken, RenewalToken};
use super::store::CredentialStore;

/// Renewal endpoint, relative to the API base URL.
pub const RENEW_PATH: &str = "/users/refresh";

/// Fallback message when the renewal endpoint gives no detail.
const RENEWAL_FALLBACK: &str = "Failed to refresh token";

/// How the renewal credential reaches the server.
///
/// Must match what the server expects, otherwise every renewal is rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenewalMode {
    /// The stored renewal token is sent in the request body.
    #[default]
    Explicit,
    /// The server keeps the renewal token in an HttpOnly cookie that the
    /// HTTP client's cookie jar sends back automatically.
    Implicit,
}

impl std::str::FromStr for RenewalMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "explicit" | "token" => Ok(RenewalMode::Explicit),
            "implicit" | "cookie" => Ok(RenewalMode::Implicit),
            other => Err(anyhow::anyhow!("Unknown renewal mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum RenewalError {
    #[error("No renewal credential stored")]
    NoRenewalCredential,

    #[error("Renewal rejected (status {status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Renewal request failed: {0}")]
    Transport(#[source] Arc<reqwest::Error>),

    #[error("Invalid renewal response: {0}")]
    MalformedResponse(String),
}

impl RenewalError {
    /// Whether the stored credentials are unusable after this failure.
    pub fn ends_session(&self) -> bool {
        !matches!(self, RenewalError::Transport(_))
    }
}

type PendingRenewal = Shared<BoxFuture<'static, Result<AccessToken, RenewalError>>>;

#[derive(Serialize)]
struct RenewRequest<'a> {
    refresh_token: &'a str,
}

/// Runs the renewal protocol against one server for one credential store.
/// Clone is cheap and clones share the in-flight latch.
#[derive(Clone)]
pub struct Renewer {
    inner: Arc<RenewerInner>,
}

struct RenewerInner {
    job: RenewalJob,
    pending: Mutex<Option<PendingRenewal>>,
}

/// Everything one renewal exchange needs, owned so the shared future does not
/// hold the `Renewer` itself.
#[derive(Clone)]
struct RenewalJob {
    http: Client,
    url: String,
    mode: RenewalMode,
    store: CredentialStore,
}

impl Renewer {
    pub fn new(http: Client, base_url: &str, mode: RenewalMode, store: CredentialStore) -> Self {
        let url = format!("{}{}", base_url.trim_end_matches('/'), RENEW_PATH);
        Self {
            inner: Arc::new(RenewerInner {
                job: RenewalJob {
                    http,
                    url,
                    mode,
                    store,
                },
                pending: Mutex::new(None),
            }),
        }
    }

    pub fn mode(&self) -> RenewalMode {
        self.inner.job.mode
    }

    /// Obtain a new access token, joining a renewal that is already in flight.
    pub async fn renew(&self) -> Result<AccessToken, RenewalError> {
        let pending = {
            let mut slot = self.inner.pending.lock().await;
            match slot.as_ref().map(|p| (p, p.peek())) {
                Some((pending, None)) => {
                    debug!("Joining in-flight renewal");
                    pending.clone()
                }
                // Finished but not yet collected: the renewal token it used
                // has been rotated, so take its result instead of renewing again.
                Some((_, Some(Ok(token)))) => {
                    debug!("Reusing just-completed renewal");
                    return Ok(token.clone());
                }
                _ => {
                    let pending = self.inner.job.clone().run().boxed().shared();
                    *slot = Some(pending.clone());
                    pending
                }
            }
        };

        let result = pending.clone().await;

        let mut slot = self.inner.pending.lock().await;
        if slot.as_ref().is_some_and(|p| p.ptr_eq(&pending)) {
            *slot = None;
        }
        result
    }

    /// Renew after the server rejected `rejected`.
    ///
    /// If the store already holds a different access token, another caller
    /// has renewed in the meantime and that token is returned without
    /// contacting the server.
    pub async fn renew_rejected(
        &self,
        rejected: Option<&AccessToken>,
    ) -> Result<AccessToken, RenewalError> {
        if let Some(current) = self.inner.job.store.access_token().await {
            if Some(&current) != rejected {
                debug!("Access token already renewed by another request");
                return Ok(current);
            }
        }
        self.renew().await
    }
}

impl RenewalJob {
    async fn run(self) -> Result<AccessToken, RenewalError> {
        debug!(mode = ?self.mode, "Renewing access token");
        let result = self.exchange().await;
        match &result {
            Ok(_) => info!("Access token renewed"),
            Err(e) if e.ends_session() => {
                warn!(error = %e, "Renewal failed, clearing session");
                self.store.clear().await;
            }
            Err(e) => warn!(error = %e, "Renewal endpoint unreachable, keeping session"),
        }
        result
    }

    async fn exchange(&self) -> Result<AccessToken, RenewalError> {
        let mut request = self.http.post(&self.url);

        if self.mode == RenewalMode::Explicit {
            let token = self
                .store
                .refresh_token()
                .await
                .ok_or(RenewalError::NoRenewalCredential)?;
            request = request.json(&RenewRequest {
                refresh_token: token.as_str(),
            });
        }

        let response = request
            .send()
            .await
            .map_err(|e| RenewalError::Transport(Arc::new(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RenewalError::Rejected {
                status: status.as_u16(),
                detail: server_detail(&body).unwrap_or_else(|| RENEWAL_FALLBACK.to_string()),
            });
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| RenewalError::MalformedResponse(e.to_string()))?;

        let access = AccessToken::from(tokens.access_token);
        self.store
            .update(
                Some(access.clone()),
                tokens.refresh_token.map(RenewalToken::from),
            )
            .await;
        Ok(access)
    }
}
