use serde::{Deserialize, Serialize};

/// Body of `POST /users/register`.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub full_name: Option<&'a str>,
}

/// Body of `POST /users/login`.
#[derive(Debug, Clone, Serialize)]
pub struct Credentials<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub id: i64,
    pub email: String,
}

/// Returned by both login and renewal.
///
/// `refresh_token` is absent when the server keeps the renewal credential
/// in a cookie instead.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationResponse {
    #[serde(default)]
    pub revoked: bool,
}
