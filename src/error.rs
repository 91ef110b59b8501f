//! Error taxonomy for the vault engine.
//!
//! Failures that callers need to tell apart get their own variant; everything
//! else carries a message. Tamper detection is deliberately separate from a
//! missing key so a decrypt caller can distinguish "key was deleted" from
//! "ciphertext was modified".

use thiserror::Error;

/// Errors returned by the vault engine.
#[derive(Error, Debug)]
pub enum Error {
    /// The OS-protected key store rejected a read or write.
    #[error("key store error: {0}")]
    KeyStore(String),

    /// Decrypt was attempted for a content reference with no stored key.
    #[error("no key found for content reference '{0}'")]
    KeyNotFound(String),

    /// Authentication-tag verification failed. The blob was modified or
    /// truncated; no plaintext is ever returned in this case.
    #[error("ciphertext failed authentication (tampered or corrupt)")]
    TamperedOrCorrupt,

    /// Internal cipher failure (bad key length, encryption error).
    #[error("crypto failure: {0}")]
    Crypto(String),

    /// Filesystem read/write failure in the content store.
    #[error("content I/O error: {0}")]
    ContentIo(#[from] std::io::Error),

    /// A persisted record could not be decoded into its entity shape.
    #[error("corrupt record '{id}': {reason}")]
    CorruptRecord { id: String, reason: String },

    /// One legacy domain failed to decode or bulk-insert during migration.
    #[error("migration failed for domain '{domain}': {reason}")]
    MigrationDomain {
        domain: &'static str,
        reason: String,
    },

    /// Optical text extraction failed. Non-fatal for the owning item.
    #[error("text extraction failed: {0}")]
    Indexing(String),

    /// A vault operation was attempted without an unlocked session.
    #[error("vault is locked")]
    VaultLocked,

    /// Security is enabled but no PIN has been configured yet.
    #[error("security is enabled but no PIN is configured")]
    PinSetupRequired,

    /// Underlying SQLite error from the metadata store.
    #[error("metadata store error: {0}")]
    Metadata(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
