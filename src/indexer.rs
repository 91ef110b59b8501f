//! Asynchronous text extraction from decrypted document images.
//!
//! Recognition always runs on plaintext bitmaps, never on ciphertext, and
//! always off the caller's critical path: jobs go to a worker thread over a
//! channel, results come back as events. The component that owns the
//! metadata store drains the event queue and performs the single mutating
//! upsert, so the record never sees two racing writers.

use crate::error::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

/// Optical text recognition capability.
pub trait TextRecognizer: Send {
    /// Extract text from a decrypted image. `Ok(None)` means the recognizer
    /// ran but found no text.
    fn extract(&self, image: &[u8]) -> Result<Option<String>>;
}

/// Recognizer wrapping the `tesseract` command line tool, fed the image on
/// stdin so plaintext never touches the disk.
pub struct TesseractRecognizer {
    command: PathBuf,
}

impl TesseractRecognizer {
    pub fn new() -> Self {
        Self::with_command("tesseract")
    }

    pub fn with_command(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

impl Default for TesseractRecognizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn extract(&self, image: &[u8]) -> Result<Option<String>> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Indexing(format!("cannot run {:?}: {}", self.command, e)))?;

        if let Some(stdin) = child.stdin.as_mut() {
            stdin
                .write_all(image)
                .map_err(|e| Error::Indexing(format!("cannot feed recognizer: {}", e)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| Error::Indexing(format!("recognizer failed: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Indexing(format!(
                "recognizer exited with {}",
                output.status
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text))
        }
    }
}

/// Recognizer that never finds text. Used when OCR is disabled.
pub struct NullRecognizer;

impl TextRecognizer for NullRecognizer {
    fn extract(&self, _image: &[u8]) -> Result<Option<String>> {
        Ok(None)
    }
}

/// Result of one indexing job. `text` is `None` both when extraction found
/// nothing and when it failed; either way the item stays usable and
/// searchable by its other fields.
#[derive(Debug)]
pub struct IndexingEvent {
    pub item_id: Uuid,
    pub text: Option<String>,
}

struct IndexJob {
    item_id: Uuid,
    image: Vec<u8>,
}

/// Background text-indexing pipeline.
///
/// Dropping the indexer closes the job channel and lets the worker thread
/// wind down on its own.
pub struct TextIndexer {
    jobs: Sender<IndexJob>,
    events: Receiver<IndexingEvent>,
}

impl TextIndexer {
    /// Spawn the worker thread around a recognizer.
    pub fn spawn(recognizer: Box<dyn TextRecognizer>) -> Result<Self> {
        let (job_tx, job_rx) = channel::<IndexJob>();
        let (event_tx, event_rx) = channel();

        thread::Builder::new()
            .name("papervault-indexer".to_string())
            .spawn(move || {
                while let Ok(job) = job_rx.recv() {
                    let text = match recognizer.extract(&job.image) {
                        Ok(text) => text,
                        Err(e) => {
                            // Non-fatal: the item keeps a null extracted_text
                            warn!("[Indexer] Extraction failed for {}: {}", job.item_id, e);
                            None
                        }
                    };
                    debug!(
                        "[Indexer] Finished {} ({} chars)",
                        job.item_id,
                        text.as_deref().map(str::len).unwrap_or(0)
                    );
                    if event_tx
                        .send(IndexingEvent {
                            item_id: job.item_id,
                            text,
                        })
                        .is_err()
                    {
                        break;
                    }
                }
            })
            .map_err(|e| Error::Indexing(format!("cannot spawn indexer thread: {}", e)))?;

        Ok(Self {
            jobs: job_tx,
            events: event_rx,
        })
    }

    /// Queue an image for extraction. Fire-and-forget: a dead worker only
    /// costs this item its extracted text.
    pub fn submit(&self, item_id: Uuid, image: Vec<u8>) {
        if self.jobs.send(IndexJob { item_id, image }).is_err() {
            warn!("[Indexer] Worker gone, dropping job for {}", item_id);
        }
    }

    /// Pop a completed event without blocking.
    pub fn try_next_event(&self) -> Option<IndexingEvent> {
        self.events.try_recv().ok()
    }

    /// Pop a completed event, waiting up to `timeout`.
    pub fn next_event_timeout(&self, timeout: Duration) -> Option<IndexingEvent> {
        self.events.recv_timeout(timeout).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecognizer(Option<String>);

    impl TextRecognizer for FixedRecognizer {
        fn extract(&self, _image: &[u8]) -> Result<Option<String>> {
            Ok(self.0.clone())
        }
    }

    struct FailingRecognizer;

    impl TextRecognizer for FailingRecognizer {
        fn extract(&self, _image: &[u8]) -> Result<Option<String>> {
            Err(Error::Indexing("engine crashed".to_string()))
        }
    }

    #[test]
    fn test_event_arrives_with_text() -> Result<()> {
        let indexer = TextIndexer::spawn(Box::new(FixedRecognizer(Some(
            "invoice total $42".to_string(),
        ))))?;
        let id = Uuid::new_v4();

        indexer.submit(id, vec![1, 2, 3]);

        let event = indexer
            .next_event_timeout(Duration::from_secs(5))
            .expect("no event");
        assert_eq!(event.item_id, id);
        assert_eq!(event.text.as_deref(), Some("invoice total $42"));
        Ok(())
    }

    #[test]
    fn test_failure_degrades_to_none() -> Result<()> {
        let indexer = TextIndexer::spawn(Box::new(FailingRecognizer))?;
        let id = Uuid::new_v4();

        indexer.submit(id, vec![1]);

        let event = indexer
            .next_event_timeout(Duration::from_secs(5))
            .expect("no event");
        assert_eq!(event.item_id, id);
        assert!(event.text.is_none());
        Ok(())
    }

    #[test]
    fn test_jobs_complete_in_order() -> Result<()> {
        let indexer = TextIndexer::spawn(Box::new(FixedRecognizer(Some("x".to_string()))))?;
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        indexer.submit(first, vec![]);
        indexer.submit(second, vec![]);

        let e1 = indexer.next_event_timeout(Duration::from_secs(5)).expect("no event");
        let e2 = indexer.next_event_timeout(Duration::from_secs(5)).expect("no event");
        assert_eq!(e1.item_id, first);
        assert_eq!(e2.item_id, second);
        Ok(())
    }

    #[test]
    fn test_try_next_event_is_non_blocking() -> Result<()> {
        let indexer = TextIndexer::spawn(Box::new(NullRecognizer))?;
        assert!(indexer.try_next_event().is_none());
        Ok(())
    }
}
