//! Authentication module for managing session credentials.
//!
//! This module provides:
//! - `CredentialStore`: the single owner of the access and renewal tokens
//! - `SessionBackend`: persistence for the store (memory, encrypted file, keychain)
//! - `SessionCookies`: the cookie jar that carries the implicit renewal token
//! - `Renewer`: the renewal protocol, with in-flight de-duplication
//!
//! Tokens are opaque strings; nothing here inspects or validates them.

pub mod backend;
pub mod cookies;
pub mod crypto;
pub mod renewal;
pub mod session;
pub mod store;

pub use backend::{FileBackend, KeychainBackend, MemoryBackend, SessionBackend, SessionStorage};
pub use cookies::{SessionCookies, StoredCookie};
pub use crypto::SecretSource;
pub use renewal::{RenewalError, RenewalMode, Renewer};
pub use session::{AccessToken, RenewalToken, Session};
pub use store::CredentialStore;
