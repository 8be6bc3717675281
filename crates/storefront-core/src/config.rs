//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the API base URL, the renewal mode the server expects, where the session
//! is persisted, and the last email used to log in.
//!
//! Configuration is stored at `~/.config/storefront/config.json`. Environment
//! variables override the file so a deployment can be pointed at another
//! server without editing it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::auth::{
    FileBackend, KeychainBackend, MemoryBackend, RenewalMode, SecretSource, SessionBackend,
    SessionStorage,
};

/// Application name used for config/cache directory paths
pub const APP_NAME: &str = "storefront";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Server used when neither the config file nor the environment names one.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Keychain account holding the session (keychain storage) or the file key secret.
const KEYCHAIN_SESSION_ACCOUNT: &str = "session";
const KEYCHAIN_SECRET_ACCOUNT: &str = "session-key";

/// HTTP request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_BASE: &str = "STOREFRONT_API_BASE";
pub const ENV_RENEWAL_MODE: &str = "STOREFRONT_RENEWAL_MODE";
pub const ENV_SESSION_STORAGE: &str = "STOREFRONT_SESSION_STORAGE";
pub const ENV_SESSION_PASSPHRASE: &str = "STOREFRONT_SESSION_PASSPHRASE";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_base: Option<String>,
    #[serde(default)]
    pub renewal_mode: RenewalMode,
    #[serde(default)]
    pub session_storage: SessionStorage,
    pub request_timeout_secs: Option<u64>,
    pub rate_limit_retries: Option<u32>,
    pub last_email: Option<String>,
}

impl Config {
    /// Load from the default location, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load from `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Record the email of a successful login in the config file.
    ///
    /// Only `last_email` changes: overrides that came from the environment
    /// or the command line are not written back.
    pub fn remember_email(email: &str) -> Result<()> {
        Self::remember_email_at(&Self::config_path()?, email)
    }

    pub fn remember_email_at(path: &Path, email: &str) -> Result<()> {
        let mut on_disk = Self::load_from(path)?;
        on_disk.last_email = Some(email.to_string());
        on_disk.save_to(path)
    }

    /// Apply overrides from `lookup` (the process environment in production).
    /// Unparseable values are logged and ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = lookup(ENV_API_BASE).filter(|v| !v.trim().is_empty()) {
            self.api_base = Some(base.trim().to_string());
        }
        if let Some(mode) = lookup(ENV_RENEWAL_MODE) {
            match mode.parse() {
                Ok(mode) => self.renewal_mode = mode,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_RENEWAL_MODE),
            }
        }
        if let Some(storage) = lookup(ENV_SESSION_STORAGE) {
            match storage.parse() {
                Ok(storage) => self.session_storage = storage,
                Err(e) => warn!(error = %e, "Ignoring {}", ENV_SESSION_STORAGE),
            }
        }
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the session backend selected by `session_storage`.
    ///
    /// The file backend uses `STOREFRONT_SESSION_PASSPHRASE` as its key
    /// secret when set, otherwise a random secret kept in the keychain.
    pub fn session_backend(&self) -> Result<Box<dyn SessionBackend>> {
        let backend: Box<dyn SessionBackend> = match self.session_storage {
            SessionStorage::Memory => Box::new(MemoryBackend),
            SessionStorage::File => {
                let secret = match std::env::var(ENV_SESSION_PASSPHRASE) {
                    Ok(pass) if !pass.is_empty() => SecretSource::Passphrase(pass),
                    _ => SecretSource::Keychain {
                        service: APP_NAME.to_string(),
                        account: KEYCHAIN_SECRET_ACCOUNT.to_string(),
                    },
                };
                Box::new(FileBackend::new(self.cache_dir()?, secret))
            }
            SessionStorage::Keychain => {
                Box::new(KeychainBackend::new(APP_NAME, KEYCHAIN_SESSION_ACCOUNT))
            }
        };
        Ok(backend)
    }
}
