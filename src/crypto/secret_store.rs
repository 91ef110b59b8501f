//! Per-item symmetric keys in OS-protected storage.
//!
//! Every encrypted content file has exactly one 256-bit key, stored under a
//! service account derived deterministically from the content reference so
//! lookups need no auxiliary index. Keys never leave this module in
//! plaintext to anything but the cipher engine.

use crate::error::{Error, Result};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// Key length (bytes) - 256 bits for AES-256
pub const KEY_LEN: usize = 32;

/// Durable store of per-item symmetric keys.
///
/// `load_key` returns `None` (not an error) when no key exists; that is the
/// expected case for unknown or already-deleted content. `delete_key` is
/// idempotent.
pub trait SecretStore: Send + Sync {
    /// Return the existing key for `content_ref`, generating and persisting
    /// a fresh random key if none exists yet.
    fn get_or_create_key(&self, content_ref: &str) -> Result<[u8; KEY_LEN]>;

    /// Load the key for `content_ref`, or `None` if absent.
    fn load_key(&self, content_ref: &str) -> Result<Option<[u8; KEY_LEN]>>;

    /// Delete the key for `content_ref`. Deleting a missing key is not an
    /// error.
    fn delete_key(&self, content_ref: &str) -> Result<()>;
}

/// Derive the key-store account id for a content reference.
///
/// Hashing keeps the account name reproducible, fixed-length and free of
/// filename characters the platform store might reject.
pub fn account_id(content_ref: &str) -> String {
    let digest = Sha256::digest(content_ref.as_bytes());
    hex::encode(digest)
}

fn generate_key() -> [u8; KEY_LEN] {
    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);
    key
}

fn decode_key(encoded: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = hex::decode(encoded)
        .map_err(|e| Error::KeyStore(format!("stored key is not valid hex: {}", e)))?;
    if bytes.len() != KEY_LEN {
        return Err(Error::KeyStore(format!(
            "stored key has wrong length: {} bytes",
            bytes.len()
        )));
    }
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&bytes);
    Ok(key)
}

/// Platform-backed secret store using the OS keyring
/// (Keychain / Secret Service / Credential Manager).
pub struct KeyringSecretStore {
    service: String,
}

impl KeyringSecretStore {
    pub fn new() -> Self {
        Self::with_service("papervault")
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    fn entry(&self, content_ref: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &account_id(content_ref))
            .map_err(|e| Error::KeyStore(e.to_string()))
    }
}

impl Default for KeyringSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeyringSecretStore {
    fn get_or_create_key(&self, content_ref: &str) -> Result<[u8; KEY_LEN]> {
        if let Some(key) = self.load_key(content_ref)? {
            return Ok(key);
        }

        let key = generate_key();
        self.entry(content_ref)?
            .set_password(&hex::encode(key))
            .map_err(|e| Error::KeyStore(e.to_string()))?;
        Ok(key)
    }

    fn load_key(&self, content_ref: &str) -> Result<Option<[u8; KEY_LEN]>> {
        match self.entry(content_ref)?.get_password() {
            Ok(encoded) => Ok(Some(decode_key(&encoded)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::KeyStore(e.to_string())),
        }
    }

    fn delete_key(&self, content_ref: &str) -> Result<()> {
        match self.entry(content_ref)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::KeyStore(e.to_string())),
        }
    }
}

/// In-memory secret store implementing the same contract.
///
/// Used by tests and anywhere a platform keyring is unavailable. Can simulate
/// a locked device (keys inaccessible) and injected write failures.
#[derive(Default)]
pub struct MemorySecretStore {
    keys: Mutex<HashMap<String, [u8; KEY_LEN]>>,
    locked: Mutex<bool>,
    fail_writes: Mutex<bool>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the device lock state. While locked, every key access fails.
    pub fn set_device_locked(&self, locked: bool) {
        *self.locked.lock().expect("lock poisoned") = locked;
    }

    /// Make subsequent key writes fail, as if the platform store were full.
    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().expect("lock poisoned") = fail;
    }

    fn check_unlocked(&self) -> Result<()> {
        if *self.locked.lock().expect("lock poisoned") {
            Err(Error::KeyStore("device is locked".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SecretStore for MemorySecretStore {
    fn get_or_create_key(&self, content_ref: &str) -> Result<[u8; KEY_LEN]> {
        self.check_unlocked()?;
        let mut keys = self.keys.lock().expect("lock poisoned");
        if let Some(key) = keys.get(&account_id(content_ref)) {
            return Ok(*key);
        }
        if *self.fail_writes.lock().expect("lock poisoned") {
            return Err(Error::KeyStore("secure storage rejected write".to_string()));
        }
        let key = generate_key();
        keys.insert(account_id(content_ref), key);
        Ok(key)
    }

    fn load_key(&self, content_ref: &str) -> Result<Option<[u8; KEY_LEN]>> {
        self.check_unlocked()?;
        let keys = self.keys.lock().expect("lock poisoned");
        Ok(keys.get(&account_id(content_ref)).copied())
    }

    fn delete_key(&self, content_ref: &str) -> Result<()> {
        let mut keys = self.keys.lock().expect("lock poisoned");
        keys.remove(&account_id(content_ref));
        Ok(())
    }
}
