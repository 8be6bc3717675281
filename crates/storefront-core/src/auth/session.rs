use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::cookies::StoredCookie;

/// Short-lived bearer token attached to protected requests.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

/// Longer-lived token exchanged at the renewal endpoint for a new access token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RenewalToken(String);

macro_rules! opaque_token {
    ($name:ident) => {
        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        // Tokens end up in tracing output through Debug, never print the value.
        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "(<{} bytes>)"), self.0.len())
            }
        }
    };
}

opaque_token!(AccessToken);
opaque_token!(RenewalToken);

/// The credential pair owned by the [`CredentialStore`](super::CredentialStore).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: Option<AccessToken>,
    pub refresh_token: Option<RenewalToken>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    /// Server-set cookies carrying the renewal token in the implicit flow.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cookies: Vec<StoredCookie>,
}

impl Session {
    /// An access credential present means the caller is authenticated.
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn access_token(&self) -> Option<&AccessToken> {
        self.access_token.as_ref()
    }

    pub fn refresh_token(&self) -> Option<&RenewalToken> {
        self.refresh_token.as_ref()
    }

    /// Minutes since the credentials were last written, if known.
    pub fn age_minutes(&self) -> Option<i64> {
        self.updated_at.map(|t| (Utc::now() - t).num_minutes())
    }
}
