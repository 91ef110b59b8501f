//! Persistence: encrypted content files, the SQLite metadata store and the
//! one-time legacy-store migration.

pub mod content;
pub mod metadata;
pub mod migration;

pub use content::ContentStore;
pub use metadata::MetadataStore;
pub use migration::{MigrationGate, MigrationReport};
