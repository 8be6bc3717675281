use std::path::PathBuf;

use anyhow::{Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};

use super::crypto::{SecretSource, SessionCipher};
use super::session::Session;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.bin";

/// Where a [`CredentialStore`](super::CredentialStore) persists its session.
///
/// Backends are only called from inside the store's lock, so implementations
/// never see concurrent writes.
pub trait SessionBackend: Send + Sync {
    /// Load the persisted session, `None` if nothing is stored.
    fn load(&self) -> Result<Option<Session>>;

    fn save(&self, session: &Session) -> Result<()>;

    /// Remove the persisted session. Removing a missing session is not an error.
    fn clear(&self) -> Result<()>;
}

/// Which backend to build from configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStorage {
    /// Credentials live only as long as the process.
    Memory,
    /// Encrypted file in the cache directory.
    #[default]
    File,
    /// Plain entry in the OS keychain.
    Keychain,
}

impl std::str::FromStr for SessionStorage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "memory" => Ok(SessionStorage::Memory),
            "file" => Ok(SessionStorage::File),
            "keychain" | "keyring" => Ok(SessionStorage::Keychain),
            other => Err(anyhow::anyhow!("Unknown session storage: {}", other)),
        }
    }
}

/// No persistence: every process starts anonymous.
#[derive(Debug, Default)]
pub struct MemoryBackend;

impl SessionBackend for MemoryBackend {
    fn load(&self) -> Result<Option<Session>> {
        Ok(None)
    }

    fn save(&self, _session: &Session) -> Result<()> {
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        Ok(())
    }
}

/// Session persisted as encrypted JSON in the cache directory.
pub struct FileBackend {
    cache_dir: PathBuf,
    cipher: SessionCipher,
}

impl FileBackend {
    pub fn new(cache_dir: PathBuf, secret: SecretSource) -> Self {
        Self {
            cache_dir,
            cipher: SessionCipher::new(secret),
        }
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}

impl SessionBackend for FileBackend {
    fn load(&self) -> Result<Option<Session>> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(None);
        }
        let sealed = std::fs::read(&path).context("Failed to read session file")?;
        let contents = self.cipher.open(&sealed)?;
        let session: Session =
            serde_json::from_slice(&contents).context("Failed to parse session file")?;
        Ok(Some(session))
    }

    fn save(&self, session: &Session) -> Result<()> {
        let path = self.session_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_vec(session)?;
        let sealed = self.cipher.seal(&contents)?;
        std::fs::write(path, sealed).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Session stored as a JSON password in the OS keychain.
pub struct KeychainBackend {
    service: String,
    account: String,
}

impl KeychainBackend {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, &self.account).context("Failed to create keyring entry")
    }
}

impl SessionBackend for KeychainBackend {
    fn load(&self) -> Result<Option<Session>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let session = serde_json::from_str(&json)
                    .context("Failed to parse session from keychain")?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve session from keychain"),
        }
    }

    fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&json)
            .context("Failed to store session in keychain")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
