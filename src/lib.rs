//! PaperVault Core Library
//!
//! Storage engine for an encrypted personal document vault.
//! Provides the following capabilities:
//! - Per-item AEAD encryption of document images with OS-keychain key storage
//! - SQLite metadata index with case-insensitive search over all fields
//! - PIN/biometric access control gating every vault operation
//! - One-time migration of legacy JSON blobs into the structured store
//! - Background OCR indexing of document text via an external recognizer
//!
//! Pipeline: Add (encrypt + store + record) -> Index (OCR off the critical
//! path) -> Search/Open

pub mod access;
pub mod config;
pub mod crypto;
pub mod error;
pub mod indexer;
pub mod model;
pub mod storage;
pub mod vault;

// Re-export main types
pub use access::{AccessController, AccessState, BiometricAuthenticator, NoopBiometrics};
pub use config::Config;
pub use crypto::{CipherEngine, KeyringSecretStore, MemorySecretStore, SecretStore};
pub use error::{Error, Result};
pub use indexer::{IndexingEvent, NullRecognizer, TesseractRecognizer, TextIndexer, TextRecognizer};
pub use model::{DocumentType, Note, Task, VaultItem};
pub use storage::{ContentStore, MetadataStore, MigrationGate, MigrationReport};
pub use vault::VaultService;
