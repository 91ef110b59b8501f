//! VaultService - single API over the vault's stores and pipelines.
//!
//! All collaborators are constructed explicitly and injected, so tests swap
//! in in-memory stores and fake recognizers without touching global state.
//! Every operation is gated on the access session. The record, the encrypted
//! blob and the per-item key are created together and destroyed together; a
//! failure partway through `add` cleans up whatever was already created
//! before the error surfaces.

use crate::access::AccessController;
use crate::crypto::{CipherEngine, SecretStore};
use crate::error::{Error, Result};
use crate::indexer::TextIndexer;
use crate::model::{DocumentType, VaultItem};
use crate::storage::{ContentStore, MetadataStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Generate a fresh content reference: random token plus the fixed
/// extension for the document type. Carries no plaintext semantics.
fn new_content_ref(document_type: DocumentType) -> String {
    format!("{}.{}", Uuid::new_v4().simple(), document_type.extension())
}

/// Orchestrates metadata, content encryption, key lifecycle, access control
/// and text indexing behind one API.
pub struct VaultService {
    store: MetadataStore,
    content: ContentStore,
    keys: Arc<dyn SecretStore>,
    cipher: CipherEngine,
    indexer: TextIndexer,
    access: AccessController,
}

impl VaultService {
    pub fn new(
        store: MetadataStore,
        content: ContentStore,
        keys: Arc<dyn SecretStore>,
        indexer: TextIndexer,
        access: AccessController,
    ) -> Self {
        let cipher = CipherEngine::new(Arc::clone(&keys));
        Self {
            store,
            content,
            keys,
            cipher,
            indexer,
            access,
        }
    }

    /// The session's access controller (for driving authentication).
    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub fn access_mut(&mut self) -> &mut AccessController {
        &mut self.access
    }

    fn ensure_unlocked(&self) -> Result<()> {
        if self.access.is_unlocked() {
            Ok(())
        } else {
            Err(Error::VaultLocked)
        }
    }

    /// Add a document image to the vault.
    ///
    /// Encrypts the image under a fresh per-item key, stores the blob,
    /// persists the record, then queues text extraction off the critical
    /// path. The returned item has `extracted_text == None`; it fills in
    /// once [`process_indexing_events`](Self::process_indexing_events) picks
    /// up the completed job.
    pub fn add(
        &mut self,
        image: &[u8],
        title: &str,
        category: &str,
        tags: Vec<String>,
        notes: Option<String>,
    ) -> Result<VaultItem> {
        self.ensure_unlocked()?;

        let content_ref = new_content_ref(DocumentType::Image);
        let blob = self.cipher.encrypt(image, &content_ref)?;

        if let Err(e) = self.content.write(&content_ref, &blob) {
            // Key was created by encrypt; do not leave it orphaned
            if let Err(cleanup) = self.keys.delete_key(&content_ref) {
                warn!("[Vault] Orphaned key left for {}: {}", content_ref, cleanup);
            }
            return Err(e);
        }

        let item = VaultItem::new(title, category, content_ref.clone(), tags, notes);
        if let Err(e) = self.store.upsert_item(&item) {
            if let Err(cleanup) = self.content.delete(&content_ref) {
                warn!("[Vault] Orphaned blob left at {}: {}", content_ref, cleanup);
            }
            if let Err(cleanup) = self.keys.delete_key(&content_ref) {
                warn!("[Vault] Orphaned key left for {}: {}", content_ref, cleanup);
            }
            return Err(e);
        }

        self.indexer.submit(item.id, image.to_vec());
        info!("[Vault] Added item {} ('{}')", item.id, item.title);
        Ok(item)
    }

    /// Fetch a single item by id.
    pub fn get(&self, id: Uuid) -> Result<Option<VaultItem>> {
        self.ensure_unlocked()?;
        self.store.get_item(id)
    }

    /// List all items, newest first.
    pub fn list(&self) -> Result<Vec<VaultItem>> {
        self.ensure_unlocked()?;
        self.store.list_items()
    }

    /// Update an existing item's metadata.
    pub fn update(&mut self, item: &VaultItem) -> Result<()> {
        self.ensure_unlocked()?;
        self.store.upsert_item(item)
    }

    /// Delete an item together with its blob and key.
    ///
    /// Removal order is blob, key, record. The record must go last: blob
    /// and key deletion are idempotent and a record with a dangling
    /// `content_ref` is harmless (`open` reads it as `None`), so a failure
    /// partway leaves the item addressable and the caller retries the whole
    /// delete until nothing is left. An orphaned key or blob is never
    /// tolerated as a terminal state.
    pub fn delete(&mut self, id: Uuid) -> Result<bool> {
        self.ensure_unlocked()?;

        let Some(item) = self.store.get_item(id)? else {
            return Ok(false);
        };

        if let Some(content_ref) = &item.content_ref {
            self.content.delete(content_ref)?;
            self.keys.delete_key(content_ref)?;
        }
        if let Some(thumbnail_ref) = &item.thumbnail_ref {
            self.content.delete(thumbnail_ref)?;
            self.keys.delete_key(thumbnail_ref)?;
        }
        self.store.delete_item(id)?;

        info!("[Vault] Deleted item {}", id);
        Ok(true)
    }

    /// Case-insensitive substring search over title, category, tags and
    /// extracted text, newest first.
    pub fn search(&self, query: &str) -> Result<Vec<VaultItem>> {
        self.ensure_unlocked()?;
        self.store.search_items(query)
    }

    /// Decrypt and return an item's document contents.
    ///
    /// `Ok(None)` when the item has no content or the blob is currently
    /// inaccessible (device locked) - retryable, not an error. Tamper and
    /// missing-key conditions surface as their own errors.
    pub fn open(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        self.ensure_unlocked()?;

        let Some(item) = self.store.get_item(id)? else {
            return Ok(None);
        };
        let Some(content_ref) = &item.content_ref else {
            return Ok(None);
        };
        let Some(blob) = self.content.read(content_ref)? else {
            return Ok(None);
        };

        self.cipher.decrypt(&blob, content_ref).map(Some)
    }

    /// Drain completed indexing events and persist their text. This is the
    /// only writer of `extracted_text`, keeping the metadata store
    /// single-writer. Events for items deleted in the meantime are dropped.
    /// Returns how many records were updated.
    pub fn process_indexing_events(&mut self) -> Result<usize> {
        let mut updated = 0;
        while let Some(event) = self.indexer.try_next_event() {
            if let Some(text) = &event.text {
                if self.store.set_extracted_text(event.item_id, text)? {
                    debug!("[Vault] Indexed text for {}", event.item_id);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    /// Block up to `timeout` for the next indexing event, then drain the
    /// rest. Convenience for callers that want extraction results before
    /// exiting (the CLI, tests).
    pub fn wait_for_indexing(&mut self, timeout: Duration) -> Result<usize> {
        let mut updated = 0;
        if let Some(event) = self.indexer.next_event_timeout(timeout) {
            if let Some(text) = &event.text {
                if self.store.set_extracted_text(event.item_id, text)? {
                    updated += 1;
                }
            }
        }
        Ok(updated + self.process_indexing_events()?)
    }

    /// Counts for the status surface: (vault items, notes, tasks).
    pub fn counts(&self) -> Result<(usize, usize, usize)> {
        Ok((
            self.store.count_items()?,
            self.store.count_notes()?,
            self.store.count_tasks()?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::NoopBiometrics;
    use crate::crypto::MemorySecretStore;
    use crate::indexer::{NullRecognizer, TextRecognizer};
    use tempfile::TempDir;

    struct FixedRecognizer(&'static str);

    impl TextRecognizer for FixedRecognizer {
        fn extract(&self, _image: &[u8]) -> Result<Option<String>> {
            Ok(Some(self.0.to_string()))
        }
    }

    fn unlocked_service(
        temp: &TempDir,
        keys: Arc<MemorySecretStore>,
        recognizer: Box<dyn TextRecognizer>,
    ) -> Result<VaultService> {
        let store = MetadataStore::open_in_memory()?;
        let content = ContentStore::new(temp.path().join("content"))?;
        let indexer = TextIndexer::spawn(recognizer)?;
        let mut access = AccessController::new(false, None, Box::new(NoopBiometrics));
        access.request_access()?;
        Ok(VaultService::new(store, content, keys, indexer, access))
    }

    #[test]
    fn test_add_scenario() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(
            &temp,
            Arc::clone(&keys),
            Box::new(FixedRecognizer("monthly rent due on the 1st")),
        )?;

        let item = vault.add(
            b"fake image bytes",
            "Lease",
            "Rental Property",
            vec!["2024".to_string(), "apartment".to_string()],
            None,
        )?;

        // Immediately after add: content exists, no extracted text yet
        let content_ref = item.content_ref.clone().expect("no content ref");
        assert_eq!(item.document_type, DocumentType::Image);
        assert!(item.extracted_text.is_none());
        assert!(keys.load_key(&content_ref)?.is_some());

        // Indexing completes asynchronously; drain and re-read
        vault.wait_for_indexing(Duration::from_secs(5))?;
        let indexed = vault.get(item.id)?.expect("item missing");
        assert_eq!(
            indexed.extracted_text.as_deref(),
            Some("monthly rent due on the 1st")
        );

        // And the OCR text is searchable
        assert_eq!(vault.search("rent")?.len(), 1);
        assert_eq!(vault.search("zzz")?.len(), 0);
        Ok(())
    }

    #[test]
    fn test_open_roundtrip() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, keys, Box::new(NullRecognizer))?;

        let item = vault.add(b"original plaintext", "Doc", "Misc", vec![], None)?;
        let plaintext = vault.open(item.id)?.expect("no content");
        assert_eq!(plaintext, b"original plaintext");
        Ok(())
    }

    #[test]
    fn test_orphan_invariant() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, Arc::clone(&keys), Box::new(NullRecognizer))?;

        let item = vault.add(b"bytes", "Doc", "Misc", vec![], None)?;
        let content_ref = item.content_ref.clone().expect("no content ref");

        // After add: record, blob and key all exist
        assert!(vault.get(item.id)?.is_some());
        assert!(vault.content.exists(&content_ref));
        assert!(keys.load_key(&content_ref)?.is_some());

        // After delete: none of the three remain
        assert!(vault.delete(item.id)?);
        assert!(vault.get(item.id)?.is_none());
        assert!(!vault.content.exists(&content_ref));
        assert!(keys.load_key(&content_ref)?.is_none());

        // Deleting again is a clean no-op
        assert!(!vault.delete(item.id)?);
        Ok(())
    }

    #[test]
    fn test_failed_delete_is_retryable() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, Arc::clone(&keys), Box::new(NullRecognizer))?;

        let item = vault.add(b"bytes", "Doc", "Misc", vec![], None)?;
        let content_ref = item.content_ref.clone().expect("no content ref");

        // Obstruct blob removal by putting a directory in the blob's place
        let blob_path = temp.path().join("content").join(&content_ref);
        std::fs::remove_file(&blob_path).map_err(Error::ContentIo)?;
        std::fs::create_dir(&blob_path).map_err(Error::ContentIo)?;

        // The failed delete must leave the record in place so the item
        // stays addressable for a retry
        assert!(vault.delete(item.id).is_err());
        assert!(vault.get(item.id)?.is_some());
        assert!(keys.load_key(&content_ref)?.is_some());

        // Clear the obstruction and retry: record, blob and key all go
        std::fs::remove_dir(&blob_path).map_err(Error::ContentIo)?;
        assert!(vault.delete(item.id)?);
        assert!(vault.get(item.id)?.is_none());
        assert!(!vault.content.exists(&content_ref));
        assert!(keys.load_key(&content_ref)?.is_none());
        Ok(())
    }

    #[test]
    fn test_failed_add_leaves_no_artifacts() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, Arc::clone(&keys), Box::new(NullRecognizer))?;

        keys.set_fail_writes(true);
        assert!(vault.add(b"bytes", "Doc", "Misc", vec![], None).is_err());

        keys.set_fail_writes(false);
        let (items, _, _) = vault.counts()?;
        assert_eq!(items, 0);
        Ok(())
    }

    #[test]
    fn test_locked_vault_refuses_operations() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, keys, Box::new(NullRecognizer))?;

        vault.access_mut().lock();
        assert!(matches!(vault.list(), Err(Error::VaultLocked)));
        assert!(matches!(
            vault.add(b"x", "t", "c", vec![], None),
            Err(Error::VaultLocked)
        ));
        assert!(matches!(vault.search("x"), Err(Error::VaultLocked)));
        Ok(())
    }

    #[test]
    fn test_indexing_event_for_deleted_item_is_dropped() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(
            &temp,
            keys,
            Box::new(FixedRecognizer("text that arrives too late")),
        )?;

        let item = vault.add(b"bytes", "Doc", "Misc", vec![], None)?;
        vault.delete(item.id)?;

        // Event arrives after the record is gone; nothing to update
        let updated = vault.wait_for_indexing(Duration::from_secs(5))?;
        assert_eq!(updated, 0);
        Ok(())
    }

    #[test]
    fn test_tampered_blob_fails_open() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let keys = Arc::new(MemorySecretStore::new());
        let mut vault = unlocked_service(&temp, keys, Box::new(NullRecognizer))?;

        let item = vault.add(b"sensitive", "Doc", "Misc", vec![], None)?;
        let content_ref = item.content_ref.clone().expect("no content ref");

        // Flip one bit in the stored ciphertext
        let mut blob = vault.content.read(&content_ref)?.expect("blob missing");
        blob[0] ^= 0x01;
        vault.content.write(&content_ref, &blob)?;

        assert!(matches!(
            vault.open(item.id),
            Err(Error::TamperedOrCorrupt)
        ));
        Ok(())
    }
}
