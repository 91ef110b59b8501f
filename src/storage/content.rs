//! Encrypted blob persistence on the filesystem.
//!
//! Writes are atomic: the blob goes to a temporary file first and is renamed
//! into place, so a crash mid-write never leaves a half-written blob under
//! the reference. Files are created with 0600 permissions, the closest
//! portable analog of a platform at-rest protection attribute; encryption
//! protects against exfiltration, file permissions against in-place reads.

use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Filesystem store for opaque encrypted blobs, addressed by content
/// reference.
pub struct ContentStore {
    dir: PathBuf,
}

impl ContentStore {
    /// Open the store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dir, fs::Permissions::from_mode(0o700))?;
        }

        Ok(Self { dir })
    }

    fn path_for(&self, content_ref: &str) -> Result<PathBuf> {
        // References are bare file names; anything path-like is rejected.
        if content_ref.is_empty()
            || content_ref.contains('/')
            || content_ref.contains('\\')
            || content_ref.contains("..")
        {
            return Err(Error::ContentIo(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("invalid content reference: {:?}", content_ref),
            )));
        }
        Ok(self.dir.join(content_ref))
    }

    /// Atomically store `blob` under `content_ref`, replacing any previous
    /// blob. On failure the partially written temporary file is removed and
    /// the previous blob (if any) is left intact.
    pub fn write(&self, content_ref: &str, blob: &[u8]) -> Result<()> {
        let path = self.path_for(content_ref)?;
        let tmp = self.dir.join(format!("{}.tmp", content_ref));

        if let Err(e) = write_owner_only(&tmp, blob) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::ContentIo(e));
        }

        if let Err(e) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(Error::ContentIo(e));
        }

        debug!("[ContentStore] Wrote {} bytes to {}", blob.len(), content_ref);
        Ok(())
    }

    /// Read the blob for `content_ref`. Returns `None` if the reference does
    /// not exist or the file is currently inaccessible (device locked); both
    /// are retryable, non-error conditions for the caller.
    pub fn read(&self, content_ref: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(content_ref)?;
        match fs::read(&path) {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if matches!(e.kind(), ErrorKind::NotFound | ErrorKind::PermissionDenied) => {
                Ok(None)
            }
            Err(e) => Err(Error::ContentIo(e)),
        }
    }

    /// Delete the blob for `content_ref`. Deleting a missing blob is not an
    /// error.
    pub fn delete(&self, content_ref: &str) -> Result<()> {
        let path = self.path_for(content_ref)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::ContentIo(e)),
        }
    }

    /// Whether a blob exists for `content_ref`.
    pub fn exists(&self, content_ref: &str) -> bool {
        self.path_for(content_ref)
            .map(|p| p.exists())
            .unwrap_or(false)
    }
}

/// Write `blob` to a file born with 0600 permissions. Creating first and
/// chmodding after would leave a window where the default umask applies to
/// the ciphertext.
fn write_owner_only(path: &Path, blob: &[u8]) -> std::io::Result<()> {
    use std::io::Write;

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(blob)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_roundtrip() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path().join("content"))?;

        store.write("doc.jpg", b"ciphertext bytes")?;
        let read = store.read("doc.jpg")?;
        assert_eq!(read.as_deref(), Some(b"ciphertext bytes".as_slice()));

        Ok(())
    }

    #[test]
    fn test_missing_blob_is_none() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path())?;
        assert!(store.read("nothing.jpg")?.is_none());
        Ok(())
    }

    #[test]
    fn test_replace_is_atomic_visible() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path())?;

        store.write("doc.jpg", b"v1")?;
        store.write("doc.jpg", b"v2")?;
        assert_eq!(store.read("doc.jpg")?.as_deref(), Some(b"v2".as_slice()));

        // No temporary residue left behind
        assert!(!temp.path().join("doc.jpg.tmp").exists());
        Ok(())
    }

    #[test]
    fn test_delete_is_idempotent() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path())?;

        store.write("doc.jpg", b"data")?;
        store.delete("doc.jpg")?;
        assert!(!store.exists("doc.jpg"));
        store.delete("doc.jpg")?;
        Ok(())
    }

    #[test]
    fn test_path_like_reference_rejected() -> Result<()> {
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path())?;

        assert!(store.write("../escape.jpg", b"x").is_err());
        assert!(store.write("a/b.jpg", b"x").is_err());
        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_blob_permissions() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let temp = TempDir::new().map_err(Error::ContentIo)?;
        let store = ContentStore::new(temp.path().join("content"))?;

        store.write("doc.jpg", b"data")?;
        let blob_path = temp.path().join("content").join("doc.jpg");
        let mode = fs::metadata(&blob_path)
            .map_err(Error::ContentIo)?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);

        // Replacement keeps the same mode
        store.write("doc.jpg", b"data v2")?;
        let mode = fs::metadata(&blob_path)
            .map_err(Error::ContentIo)?
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
        Ok(())
    }
}
