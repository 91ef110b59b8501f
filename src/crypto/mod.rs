//! Cryptography: per-item key management, authenticated content encryption
//! and PIN hashing.

pub mod cipher;
pub mod pin;
pub mod secret_store;

pub use cipher::{CipherEngine, NONCE_LEN, TAG_LEN};
pub use secret_store::{KeyringSecretStore, MemorySecretStore, SecretStore, KEY_LEN};
