//! AES-256-GCM content encryption.
//!
//! AES-GCM is an AEAD construction: the authentication tag detects any
//! modification of the ciphertext. Each call uses a fresh random 96-bit
//! nonce; keys are per-item, so random nonces are safe at this volume.
//!
//! Blob layout: nonce (12 bytes) || ciphertext (plaintext + 16-byte tag).
//! The content store treats the whole thing as opaque.

use crate::crypto::secret_store::SecretStore;
use crate::error::{Error, Result};
use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;

/// Nonce length (bytes) - 96 bits
pub const NONCE_LEN: usize = 12;

/// Authentication tag length (bytes) - 128 bits
pub const TAG_LEN: usize = 16;

/// Authenticated encryption of content blobs with per-item keys.
pub struct CipherEngine {
    keys: Arc<dyn SecretStore>,
}

impl CipherEngine {
    pub fn new(keys: Arc<dyn SecretStore>) -> Self {
        Self { keys }
    }

    /// Encrypt `plaintext` under the key for `content_ref`, creating the key
    /// if this is the first encryption for that reference.
    pub fn encrypt(&self, plaintext: &[u8], content_ref: &str) -> Result<Vec<u8>> {
        let key = self.keys.get_or_create_key(content_ref)?;
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Crypto(format!("invalid key: {}", e)))?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Crypto(format!("encryption failed: {}", e)))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`encrypt`](Self::encrypt).
    ///
    /// Fails with [`Error::KeyNotFound`] when no key exists for the
    /// reference and with [`Error::TamperedOrCorrupt`] when tag verification
    /// fails - never with partial plaintext.
    pub fn decrypt(&self, blob: &[u8], content_ref: &str) -> Result<Vec<u8>> {
        let key = self
            .keys
            .load_key(content_ref)?
            .ok_or_else(|| Error::KeyNotFound(content_ref.to_string()))?;

        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::TamperedOrCorrupt);
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| Error::Crypto(format!("invalid key: {}", e)))?;
        let nonce = Nonce::from_slice(&blob[..NONCE_LEN]);

        cipher
            .decrypt(nonce, &blob[NONCE_LEN..])
            .map_err(|_| Error::TamperedOrCorrupt)
    }
}
