//! SQLite metadata store for vault items, notes and tasks.
//!
//! Only metadata lives here; document contents stay in the content store as
//! encrypted blobs. Upserts key on the record id so no operation can create
//! duplicate ids, bulk work runs in transactions, and row decoding returns a
//! typed corrupt-record error instead of panicking - persisted data can
//! predate schema changes.

use crate::error::{Error, Result};
use crate::model::{DocumentType, Note, Task, VaultItem};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use uuid::Uuid;

/// Structured, indexed record store backing the vault.
pub struct MetadataStore {
    conn: Connection,
}

impl MetadataStore {
    /// Open or create the metadata database under `vault_dir`.
    pub fn open(vault_dir: &Path) -> Result<Self> {
        let db_path = vault_dir.join("index.db");

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Open the store in memory (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize database schema.
    fn init_schema(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS vault_items (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                category TEXT NOT NULL,
                content_ref TEXT,
                thumbnail_ref TEXT,
                created_at TEXT NOT NULL,
                tags TEXT NOT NULL DEFAULT '[]',
                notes TEXT,
                extracted_text TEXT,
                document_type TEXT NOT NULL DEFAULT 'image'
            );

            CREATE INDEX IF NOT EXISTS idx_vault_items_category ON vault_items(category);
            CREATE INDEX IF NOT EXISTS idx_vault_items_created_at ON vault_items(created_at);

            CREATE TABLE IF NOT EXISTS notes (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY NOT NULL,
                title TEXT NOT NULL,
                is_completed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                due_date TEXT,
                category TEXT,
                priority INTEGER NOT NULL DEFAULT 1,
                notes TEXT,
                has_reminder INTEGER NOT NULL DEFAULT 0,
                reminder_time TEXT
            );

            -- Per-domain completion tracking for the legacy-store migration
            CREATE TABLE IF NOT EXISTS migration_state (
                domain TEXT PRIMARY KEY NOT NULL,
                completed_at TEXT NOT NULL
            );
        ",
        )?;
        Ok(())
    }

    // ---- vault items ----

    /// Insert or update a vault item. Keys on id, so the same id is never
    /// duplicated.
    pub fn upsert_item(&self, item: &VaultItem) -> Result<()> {
        let tags = encode_tags(&item.tags)?;
        self.conn.execute(
            "INSERT INTO vault_items
                (id, title, category, content_ref, thumbnail_ref, created_at,
                 tags, notes, extracted_text, document_type)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                category = excluded.category,
                content_ref = excluded.content_ref,
                thumbnail_ref = excluded.thumbnail_ref,
                created_at = excluded.created_at,
                tags = excluded.tags,
                notes = excluded.notes,
                extracted_text = excluded.extracted_text,
                document_type = excluded.document_type",
            params![
                item.id.to_string(),
                item.title,
                item.category,
                item.content_ref,
                item.thumbnail_ref,
                item.created_at.to_rfc3339(),
                tags,
                item.notes,
                item.extracted_text,
                item.document_type.as_str(),
            ],
        )?;
        Ok(())
    }

    /// Get a vault item by id.
    pub fn get_item(&self, id: Uuid) -> Result<Option<VaultItem>> {
        let row: Option<ItemRow> = self
            .conn
            .query_row(
                &format!("SELECT {} FROM vault_items WHERE id = ?1", ITEM_COLUMNS),
                params![id.to_string()],
                ItemRow::from_row,
            )
            .optional()?;

        row.map(VaultItem::try_from).transpose()
    }

    /// List all vault items, newest first.
    pub fn list_items(&self) -> Result<Vec<VaultItem>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM vault_items ORDER BY created_at DESC",
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map([], ItemRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(VaultItem::try_from(row?)?);
        }
        Ok(items)
    }

    /// Case-insensitive substring search over title, category, tags and
    /// extracted text. Results are sorted newest first.
    ///
    /// Tags are matched per decoded value via `json_each`, not against the
    /// stored JSON text, so queries containing JSON punctuation cannot
    /// false-match the encoding.
    pub fn search_items(&self, query: &str) -> Result<Vec<VaultItem>> {
        let pattern = format!("%{}%", query.to_lowercase());
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {} FROM vault_items
             WHERE lower(title) LIKE ?1
                OR lower(category) LIKE ?1
                OR lower(ifnull(extracted_text, '')) LIKE ?1
                OR EXISTS (
                    SELECT 1 FROM json_each(vault_items.tags)
                    WHERE lower(json_each.value) LIKE ?1
                )
             ORDER BY created_at DESC",
            ITEM_COLUMNS
        ))?;
        let rows = stmt.query_map(params![pattern], ItemRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(VaultItem::try_from(row?)?);
        }
        Ok(items)
    }

    /// Delete a vault item record. Returns whether a record existed.
    pub fn delete_item(&self, id: Uuid) -> Result<bool> {
        let affected = self.conn.execute(
            "DELETE FROM vault_items WHERE id = ?1",
            params![id.to_string()],
        )?;
        Ok(affected > 0)
    }

    /// Count vault items.
    pub fn count_items(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM vault_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// Set the extracted OCR text on an item. Returns false when the item no
    /// longer exists (deleted while indexing ran).
    pub fn set_extracted_text(&self, id: Uuid, text: &str) -> Result<bool> {
        let affected = self.conn.execute(
            "UPDATE vault_items SET extracted_text = ?2 WHERE id = ?1",
            params![id.to_string(), text],
        )?;
        Ok(affected > 0)
    }

    /// Bulk-insert vault items inside one transaction, skipping ids that are
    /// already present. Returns the number actually inserted.
    pub fn insert_items(&mut self, items: &[VaultItem]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO vault_items
                    (id, title, category, content_ref, thumbnail_ref, created_at,
                     tags, notes, extracted_text, document_type)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            for item in items {
                let tags = encode_tags(&item.tags)?;
                inserted += stmt.execute(params![
                    item.id.to_string(),
                    item.title,
                    item.category,
                    item.content_ref,
                    item.thumbnail_ref,
                    item.created_at.to_rfc3339(),
                    tags,
                    item.notes,
                    item.extracted_text,
                    item.document_type.as_str(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    // ---- notes ----

    /// Bulk-insert notes, skipping existing ids.
    pub fn insert_notes(&mut self, notes: &[Note]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO notes (id, title, content, created_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            for note in notes {
                inserted += stmt.execute(params![
                    note.id.to_string(),
                    note.title,
                    note.content,
                    note.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Count notes.
    pub fn count_notes(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ---- tasks ----

    /// Bulk-insert tasks, skipping existing ids.
    pub fn insert_tasks(&mut self, tasks: &[Task]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tasks
                    (id, title, is_completed, created_at, due_date, category,
                     priority, notes, has_reminder, reminder_time)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO NOTHING",
            )?;
            for task in tasks {
                inserted += stmt.execute(params![
                    task.id.to_string(),
                    task.title,
                    task.is_completed,
                    task.created_at.to_rfc3339(),
                    task.due_date.map(|d| d.to_rfc3339()),
                    task.category,
                    task.priority,
                    task.notes,
                    task.has_reminder,
                    task.reminder_time.map(|d| d.to_rfc3339()),
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Count tasks.
    pub fn count_tasks(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ---- migration state ----

    /// Whether a legacy domain has already been migrated.
    pub fn is_domain_migrated(&self, domain: &str) -> Result<bool> {
        let found: Option<String> = self
            .conn
            .query_row(
                "SELECT domain FROM migration_state WHERE domain = ?1",
                params![domain],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Record a legacy domain as migrated.
    pub fn mark_domain_migrated(&self, domain: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO migration_state (domain, completed_at)
             VALUES (?1, ?2)
             ON CONFLICT(domain) DO NOTHING",
            params![domain, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }
}

const ITEM_COLUMNS: &str = "id, title, category, content_ref, thumbnail_ref, created_at, \
                            tags, notes, extracted_text, document_type";

fn encode_tags(tags: &[String]) -> Result<String> {
    serde_json::to_string(tags).map_err(|e| Error::CorruptRecord {
        id: String::new(),
        reason: format!("cannot encode tags: {}", e),
    })
}

/// Intermediate struct mapping a raw SQLite row; typed decoding into
/// [`VaultItem`] happens in `TryFrom` so decode failures surface as
/// [`Error::CorruptRecord`].
struct ItemRow {
    id: String,
    title: String,
    category: String,
    content_ref: Option<String>,
    thumbnail_ref: Option<String>,
    created_at: String,
    tags: String,
    notes: Option<String>,
    extracted_text: Option<String>,
    document_type: String,
}

impl ItemRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            title: row.get(1)?,
            category: row.get(2)?,
            content_ref: row.get(3)?,
            thumbnail_ref: row.get(4)?,
            created_at: row.get(5)?,
            tags: row.get(6)?,
            notes: row.get(7)?,
            extracted_text: row.get(8)?,
            document_type: row.get(9)?,
        })
    }
}

impl TryFrom<ItemRow> for VaultItem {
    type Error = Error;

    fn try_from(row: ItemRow) -> Result<VaultItem> {
        let corrupt = |reason: String| Error::CorruptRecord {
            id: row.id.clone(),
            reason,
        };

        let id = Uuid::parse_str(&row.id).map_err(|e| corrupt(format!("bad id: {}", e)))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| corrupt(format!("bad created_at: {}", e)))?;
        let tags: Vec<String> = serde_json::from_str(&row.tags)
            .map_err(|e| corrupt(format!("bad tags encoding: {}", e)))?;
        let document_type = DocumentType::parse(&row.document_type)
            .ok_or_else(|| corrupt(format!("unknown document type '{}'", row.document_type)))?;

        Ok(VaultItem {
            id,
            title: row.title,
            category: row.category,
            content_ref: row.content_ref,
            thumbnail_ref: row.thumbnail_ref,
            created_at,
            tags,
            notes: row.notes,
            extracted_text: row.extracted_text,
            document_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_item(title: &str) -> VaultItem {
        VaultItem::new(
            title,
            "Documents",
            format!("{}.jpg", Uuid::new_v4().simple()),
            vec!["2024".to_string(), "apartment".to_string()],
            None,
        )
    }

    #[test]
    fn test_upsert_and_get() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        let item = test_item("Lease");

        store.upsert_item(&item)?;

        let loaded = store.get_item(item.id)?.expect("item missing");
        assert_eq!(loaded.title, "Lease");
        assert_eq!(loaded.tags, item.tags);
        assert_eq!(loaded.document_type, DocumentType::Image);
        Ok(())
    }

    #[test]
    fn test_upsert_never_duplicates() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        let mut item = test_item("Lease");

        store.upsert_item(&item)?;
        item.title = "Lease (signed)".to_string();
        store.upsert_item(&item)?;

        assert_eq!(store.count_items()?, 1);
        let loaded = store.get_item(item.id)?.expect("item missing");
        assert_eq!(loaded.title, "Lease (signed)");
        Ok(())
    }

    #[test]
    fn test_list_newest_first() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;

        let mut older = test_item("older");
        older.created_at = Utc::now() - Duration::hours(1);
        let newer = test_item("newer");

        store.upsert_item(&older)?;
        store.upsert_item(&newer)?;

        let items = store.list_items()?;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].title, "newer");
        assert_eq!(items[1].title, "older");
        Ok(())
    }

    #[test]
    fn test_search_matches_all_text_fields() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;

        let mut item = test_item("Lease");
        item.category = "Rental Property".to_string();
        store.upsert_item(&item)?;
        store.set_extracted_text(item.id, "invoice total $42")?;

        // title, category (case-insensitive), tag, OCR text
        assert_eq!(store.search_items("lease")?.len(), 1);
        assert_eq!(store.search_items("RENTAL")?.len(), 1);
        assert_eq!(store.search_items("apartment")?.len(), 1);
        assert_eq!(store.search_items("total")?.len(), 1);
        assert_eq!(store.search_items("zzz")?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_search_ignores_tag_encoding_syntax() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        // Two tags, so the stored encoding contains ["...","..."]
        store.upsert_item(&test_item("Lease"))?;

        // JSON punctuation from the encoding must never match
        for query in ["\",\"", "[\"", "\"]", "\"", ","] {
            assert_eq!(
                store.search_items(query)?.len(),
                0,
                "query {:?} matched the tag encoding",
                query
            );
        }

        // Tag values themselves still match, including substrings
        assert_eq!(store.search_items("apart")?.len(), 1);
        assert_eq!(store.search_items("2024")?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_delete_item() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        let item = test_item("Lease");
        store.upsert_item(&item)?;

        assert!(store.delete_item(item.id)?);
        assert!(!store.delete_item(item.id)?);
        assert_eq!(store.count_items()?, 0);
        Ok(())
    }

    #[test]
    fn test_set_extracted_text_on_deleted_item() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        let item = test_item("Lease");
        store.upsert_item(&item)?;
        store.delete_item(item.id)?;

        assert!(!store.set_extracted_text(item.id, "late OCR result")?);
        Ok(())
    }

    #[test]
    fn test_corrupt_row_is_typed_error() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;
        let id = Uuid::new_v4();

        // A row written by some earlier schema with an unknown document type
        store.conn().execute(
            "INSERT INTO vault_items (id, title, category, created_at, tags, document_type)
             VALUES (?1, 'x', 'y', ?2, '[]', 'hologram')",
            params![id.to_string(), Utc::now().to_rfc3339()],
        )?;

        assert!(matches!(
            store.get_item(id),
            Err(Error::CorruptRecord { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_migration_state_tracking() -> Result<()> {
        let store = MetadataStore::open_in_memory()?;

        assert!(!store.is_domain_migrated("notes")?);
        store.mark_domain_migrated("notes")?;
        assert!(store.is_domain_migrated("notes")?);
        // marking twice is harmless
        store.mark_domain_migrated("notes")?;
        assert!(!store.is_domain_migrated("tasks")?);
        Ok(())
    }
}
