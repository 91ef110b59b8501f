//! One-time migration from the legacy flat key-value store.
//!
//! The legacy format is three JSON blobs (notes, tasks, vault items), each a
//! flat sequence of records. Migration is additive: blobs are decoded,
//! converted to the structured entity shapes and bulk-inserted; the legacy
//! files are never deleted. Completion is tracked per domain, so a retry
//! after a partial failure re-runs only the domains that failed, and inserts
//! skip ids that already exist - running the gate twice can never duplicate
//! records.

use crate::error::{Error, Result};
use crate::model::{DocumentType, Note, Task, VaultItem};
use crate::storage::metadata::MetadataStore;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const DOMAIN_NOTES: &str = "notes";
pub const DOMAIN_TASKS: &str = "tasks";
pub const DOMAIN_VAULT_ITEMS: &str = "vault_items";

/// Legacy blob file names, fixed by the old store.
const NOTES_BLOB: &str = "saved_notes.json";
const TASKS_BLOB: &str = "saved_tasks.json";
const VAULT_ITEMS_BLOB: &str = "vault_items.json";

/// Outcome of one `run_once` call.
#[derive(Debug, Default)]
pub struct MigrationReport {
    /// Domains migrated during this call, with their record counts.
    pub migrated: Vec<(&'static str, usize)>,
    /// Domains already migrated on a previous run.
    pub skipped: Vec<&'static str>,
    /// Per-domain failures. Failed domains stay unmarked and are retried on
    /// the next call.
    pub failures: Vec<Error>,
}

impl MigrationReport {
    /// Whether every domain is now migrated.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One-time, idempotent transfer of legacy records into the metadata store.
pub struct MigrationGate {
    legacy_dir: PathBuf,
}

impl MigrationGate {
    pub fn new(legacy_dir: impl AsRef<Path>) -> Self {
        Self {
            legacy_dir: legacy_dir.as_ref().to_path_buf(),
        }
    }

    /// Run the migration. No-op for domains that already completed; a domain
    /// with no legacy blob counts as completed (nothing to migrate). Must run
    /// before any vault read in the same process.
    pub fn run_once(&self, store: &mut MetadataStore) -> Result<MigrationReport> {
        let mut report = MigrationReport::default();

        self.run_domain(store, DOMAIN_NOTES, &mut report, |gate, store| {
            gate.migrate_notes(store)
        })?;
        self.run_domain(store, DOMAIN_TASKS, &mut report, |gate, store| {
            gate.migrate_tasks(store)
        })?;
        self.run_domain(store, DOMAIN_VAULT_ITEMS, &mut report, |gate, store| {
            gate.migrate_vault_items(store)
        })?;

        if report.is_complete() && !report.migrated.is_empty() {
            info!("[Migration] All legacy domains migrated");
        }
        Ok(report)
    }

    fn run_domain(
        &self,
        store: &mut MetadataStore,
        domain: &'static str,
        report: &mut MigrationReport,
        migrate: impl Fn(&Self, &mut MetadataStore) -> Result<usize>,
    ) -> Result<()> {
        if store.is_domain_migrated(domain)? {
            report.skipped.push(domain);
            return Ok(());
        }

        match migrate(self, store) {
            Ok(count) => {
                store.mark_domain_migrated(domain)?;
                info!("[Migration] Migrated {} {} record(s)", count, domain);
                report.migrated.push((domain, count));
            }
            Err(e) => {
                let failure = Error::MigrationDomain {
                    domain,
                    reason: e.to_string(),
                };
                warn!("[Migration] {}", failure);
                report.failures.push(failure);
            }
        }
        Ok(())
    }

    fn read_blob<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<Option<Vec<T>>> {
        let path = self.legacy_dir.join(name);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        let records = serde_json::from_str(&content).map_err(|e| Error::CorruptRecord {
            id: name.to_string(),
            reason: format!("cannot decode legacy blob: {}", e),
        })?;
        Ok(Some(records))
    }

    fn migrate_notes(&self, store: &mut MetadataStore) -> Result<usize> {
        let Some(old_notes) = self.read_blob::<LegacyNote>(NOTES_BLOB)? else {
            info!("[Migration] No legacy notes blob found");
            return Ok(0);
        };

        let notes: Vec<Note> = old_notes.into_iter().map(Note::from).collect();
        store.insert_notes(&notes)
    }

    fn migrate_tasks(&self, store: &mut MetadataStore) -> Result<usize> {
        let Some(old_tasks) = self.read_blob::<LegacyTask>(TASKS_BLOB)? else {
            info!("[Migration] No legacy tasks blob found");
            return Ok(0);
        };

        let tasks: Vec<Task> = old_tasks.into_iter().map(Task::from).collect();
        store.insert_tasks(&tasks)
    }

    fn migrate_vault_items(&self, store: &mut MetadataStore) -> Result<usize> {
        let Some(old_items) = self.read_blob::<LegacyVaultItem>(VAULT_ITEMS_BLOB)? else {
            info!("[Migration] No legacy vault items blob found");
            return Ok(0);
        };

        let items: Vec<VaultItem> = old_items.into_iter().map(VaultItem::from).collect();
        store.insert_items(&items)
    }
}

// Legacy record shapes. Field names follow the old store's camelCase
// encoding; unknown fields are ignored.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyNote {
    id: Uuid,
    title: String,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<LegacyNote> for Note {
    fn from(old: LegacyNote) -> Self {
        Self {
            id: old.id,
            title: old.title,
            content: old.content,
            created_at: old.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTask {
    id: Uuid,
    title: String,
    is_completed: bool,
    created_at: DateTime<Utc>,
    #[serde(default)]
    due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    category: Option<String>,
    priority: i32,
    #[serde(default)]
    notes: Option<String>,
    has_reminder: bool,
    #[serde(default)]
    reminder_time: Option<DateTime<Utc>>,
}

impl From<LegacyTask> for Task {
    fn from(old: LegacyTask) -> Self {
        Self {
            id: old.id,
            title: old.title,
            is_completed: old.is_completed,
            created_at: old.created_at,
            due_date: old.due_date,
            category: old.category,
            priority: old.priority,
            notes: old.notes,
            has_reminder: old.has_reminder,
            reminder_time: old.reminder_time,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyVaultItem {
    id: Uuid,
    title: String,
    category: String,
    image_name: String,
    #[serde(default)]
    thumbnail_name: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    notes: Option<String>,
}

impl From<LegacyVaultItem> for VaultItem {
    fn from(old: LegacyVaultItem) -> Self {
        Self {
            id: old.id,
            title: old.title,
            category: old.category,
            content_ref: Some(old.image_name),
            thumbnail_ref: old.thumbnail_name,
            created_at: old.created_at,
            tags: old.tags,
            notes: old.notes,
            // New fields, absent from the legacy schema
            extracted_text: None,
            document_type: DocumentType::Image,
        }
    }
}
