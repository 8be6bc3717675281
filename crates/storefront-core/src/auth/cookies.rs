//! Cookie jar for the implicit renewal flow.
//!
//! The server keeps the renewal token in an HttpOnly cookie. reqwest's
//! [`Jar`] handles matching and expiry; [`SessionCookies`] wraps it and
//! remembers the raw `Set-Cookie` headers it received so the
//! [`CredentialStore`](super::CredentialStore) can persist them with the
//! session and replay them into a fresh jar on the next start.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderValue;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A `Set-Cookie` header as received, with the URL of the response.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCookie {
    pub url: String,
    pub set_cookie: String,
}

impl StoredCookie {
    pub fn name(&self) -> &str {
        self.set_cookie
            .split(|c| c == '=' || c == ';')
            .next()
            .unwrap_or_default()
            .trim()
    }
}

// The value is a renewal credential, keep it out of logs.
impl fmt::Debug for StoredCookie {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCookie")
            .field("url", &self.url)
            .field("name", &self.name())
            .finish()
    }
}

/// Cookie provider shared between the HTTP client and the credential store.
#[derive(Default)]
pub struct SessionCookies {
    jar: RwLock<Arc<Jar>>,
    received: Mutex<Vec<StoredCookie>>,
}

impl SessionCookies {
    /// Replace the jar's contents with `cookies`, replayed in order.
    pub fn restore(&self, cookies: &[StoredCookie]) {
        let jar = Jar::default();
        for cookie in cookies {
            match Url::parse(&cookie.url) {
                Ok(url) => jar.add_cookie_str(&cookie.set_cookie, &url),
                Err(e) => warn!(error = %e, cookie = cookie.name(), "Skipping stored cookie"),
            }
        }
        if !cookies.is_empty() {
            debug!(count = cookies.len(), "Cookies restored");
        }

        *self.jar.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(jar);
        *self.received.lock().unwrap_or_else(PoisonError::into_inner) = cookies.to_vec();
    }

    /// The latest `Set-Cookie` header received for each cookie name.
    pub fn snapshot(&self) -> Vec<StoredCookie> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn reset(&self) {
        self.restore(&[]);
    }

    fn jar(&self) -> Arc<Jar> {
        self.jar
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        {
            let mut received = self.received.lock().unwrap_or_else(PoisonError::into_inner);
            for value in &headers {
                let Ok(set_cookie) = value.to_str() else {
                    continue;
                };
                let cookie = StoredCookie {
                    url: url.to_string(),
                    set_cookie: set_cookie.to_string(),
                };
                received.retain(|c| c.name() != cookie.name());
                received.push(cookie);
            }
        }
        self.jar().set_cookies(&mut headers.into_iter(), url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar().cookies(url)
    }
}
