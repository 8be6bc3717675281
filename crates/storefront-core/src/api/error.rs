use std::sync::Arc;

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::RenewalError;

#[derive(Error, Debug)]
pub enum ApiError {
    /// The server could not be reached. Shared because a failed renewal
    /// reports the same transport error to every caller that joined it.
    #[error("Network error: {0}")]
    Network(#[source] Arc<reqwest::Error>),

    #[error("Unauthorized - credentials were rejected after renewal")]
    Unauthorized,

    /// The session could not be renewed and has been cleared.
    #[error("Session expired: {0}")]
    RenewalFailed(RenewalError),

    /// A business endpoint refused the request. Carries the server's reason
    /// when it gave one.
    #[error("{0}")]
    OperationFailed(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(Arc::new(e))
    }
}

impl From<RenewalError> for ApiError {
    /// An unreachable renewal endpoint is a network failure, not a lost session.
    fn from(e: RenewalError) -> Self {
        match e {
            RenewalError::Transport(source) => ApiError::Network(source),
            other => ApiError::RenewalFailed(other),
        }
    }
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Extract the human-readable `detail` string from an error body.
///
/// Validation errors carry a list in `detail`; those are not meant for
/// display and yield `None`.
pub(crate) fn server_detail(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s),
        _ => None,
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    pub(crate) fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    /// Failure of a business endpoint: the server's detail, or `fallback`.
    pub fn operation_failed(body: &str, fallback: &str) -> Self {
        ApiError::OperationFailed(server_detail(body).unwrap_or_else(|| fallback.to_string()))
    }

    /// Map a non-success status from a protected endpoint.
    pub fn from_status(status: StatusCode, body: &str, fallback: &str) -> Self {
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            429 => ApiError::RateLimited,
            _ => Self::operation_failed(body, fallback),
        }
    }

    /// True when the credential store has been cleared and the user must log in again.
    pub fn is_logged_out(&self) -> bool {
        matches!(self, ApiError::RenewalFailed(_))
    }
}
