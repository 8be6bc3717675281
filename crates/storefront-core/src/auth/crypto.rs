//! At-rest encryption for the session file.
//!
//! Layout of a sealed blob: `salt (16) | nonce (12) | ciphertext`.
//! The ChaCha20-Poly1305 key is derived with Argon2 from a secret and the
//! salt. A [`SessionCipher`] derives once and keeps the key: later saves reuse
//! that salt with a fresh random nonce.

use std::sync::{Mutex, OnceLock, PoisonError};

use anyhow::{anyhow, Context, Result};
use argon2::Argon2;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use rand::RngCore;
use tracing::debug;

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Length of a generated keychain secret.
const GENERATED_SECRET_LEN: usize = 32;

/// Where the key-derivation secret comes from.
#[derive(Clone)]
pub enum SecretSource {
    /// A user-supplied passphrase.
    Passphrase(String),
    /// A random secret generated on first use and kept in the OS keychain.
    Keychain { service: String, account: String },
}

impl std::fmt::Debug for SecretSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SecretSource::Passphrase(_) => f.write_str("Passphrase(..)"),
            SecretSource::Keychain { service, account } => f
                .debug_struct("Keychain")
                .field("service", service)
                .field("account", account)
                .finish(),
        }
    }
}

impl SecretSource {
    fn secret(&self) -> Result<Vec<u8>> {
        match self {
            SecretSource::Passphrase(pass) => Ok(pass.as_bytes().to_vec()),
            SecretSource::Keychain { service, account } => {
                let entry = Entry::new(service, account)
                    .context("Failed to create keyring entry")?;
                match entry.get_secret() {
                    Ok(secret) => Ok(secret),
                    Err(keyring::Error::NoEntry) => {
                        debug!(service = %service, "Generating session encryption secret");
                        let mut secret = vec![0u8; GENERATED_SECRET_LEN];
                        rand::thread_rng().fill_bytes(&mut secret);
                        entry
                            .set_secret(&secret)
                            .context("Failed to store encryption secret in keychain")?;
                        Ok(secret)
                    }
                    Err(e) => Err(e).context("Failed to read encryption secret from keychain"),
                }
            }
        }
    }
}

struct DerivedKey {
    salt: [u8; SALT_LEN],
    key: Key,
}

pub struct SessionCipher {
    source: SecretSource,
    secret: OnceLock<Vec<u8>>,
    derived: Mutex<Option<DerivedKey>>,
}

impl SessionCipher {
    pub fn new(source: SecretSource) -> Self {
        Self {
            source,
            secret: OnceLock::new(),
            derived: Mutex::new(None),
        }
    }

    fn secret(&self) -> Result<&[u8]> {
        if let Some(secret) = self.secret.get() {
            return Ok(secret);
        }
        let secret = self.source.secret()?;
        Ok(self.secret.get_or_init(|| secret))
    }

    fn derive(&self, salt: &[u8]) -> Result<Key> {
        let mut key = [0u8; KEY_LEN];
        Argon2::default()
            .hash_password_into(self.secret()?, salt, &mut key)
            .map_err(|e| anyhow!("Failed to derive session key: {}", e))?;
        debug!("Session key derived");
        Ok(Key::clone_from_slice(&key))
    }

    /// Key for `salt`, derived on first use and cached.
    fn key_for(&self, salt: &[u8]) -> Result<Key> {
        let mut derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = derived.as_ref().filter(|d| d.salt[..] == *salt) {
            return Ok(cached.key);
        }
        let key = self.derive(salt)?;
        let mut cached_salt = [0u8; SALT_LEN];
        cached_salt.copy_from_slice(salt);
        *derived = Some(DerivedKey {
            salt: cached_salt,
            key,
        });
        Ok(key)
    }

    fn sealing_salt(&self) -> [u8; SALT_LEN] {
        let derived = self.derived.lock().unwrap_or_else(PoisonError::into_inner);
        match derived.as_ref() {
            Some(cached) => cached.salt,
            None => {
                let mut salt = [0u8; SALT_LEN];
                rand::thread_rng().fill_bytes(&mut salt);
                salt
            }
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let salt = self.sealing_salt();
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = ChaCha20Poly1305::new(&self.key_for(&salt)?)
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|e| anyhow!("Failed to encrypt session: {}", e))?;

        let mut sealed = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&salt);
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < SALT_LEN + NONCE_LEN {
            return Err(anyhow!("Session file is truncated ({} bytes)", sealed.len()));
        }
        let (salt, rest) = sealed.split_at(SALT_LEN);
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        ChaCha20Poly1305::new(&self.key_for(salt)?)
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| anyhow!("Failed to decrypt session (wrong key or corrupted file)"))
    }
}
