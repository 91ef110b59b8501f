//! Entity types persisted in the metadata store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of document stored behind a vault item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    #[default]
    Image,
    Pdf,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Pdf => "pdf",
        }
    }

    /// Parse the persisted representation. Unknown values are rejected so
    /// schema drift surfaces as a corrupt-record error, not a silent default.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "image" => Some(Self::Image),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// File extension used for the encrypted content file.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Image => "jpg",
            Self::Pdf => "pdf",
        }
    }
}

/// A document stored in the secure vault.
///
/// `content_ref` links the record 1:1 to an encrypted blob in the content
/// store and a key in the secret store; the three are created and destroyed
/// together. `thumbnail_ref` is reserved and currently never populated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VaultItem {
    pub id: Uuid,
    pub title: String,
    pub category: String,
    pub content_ref: Option<String>,
    pub thumbnail_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    /// OCR text, filled in asynchronously after creation. None until the
    /// indexer completes (or permanently, if extraction failed).
    pub extracted_text: Option<String>,
    pub document_type: DocumentType,
}

impl VaultItem {
    /// Create a new item with a fresh id and the current timestamp.
    pub fn new(
        title: impl Into<String>,
        category: impl Into<String>,
        content_ref: String,
        tags: Vec<String>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            category: category.into(),
            content_ref: Some(content_ref),
            thumbnail_ref: None,
            created_at: Utc::now(),
            tags,
            notes,
            extracted_text: None,
            document_type: DocumentType::Image,
        }
    }
}

/// Plain note. No encryption; shares the metadata store and migration
/// mechanics with vault items.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Task entry. Same persistence regime as [`Note`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub is_completed: bool,
    pub created_at: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub category: Option<String>,
    pub priority: i32,
    pub notes: Option<String>,
    pub has_reminder: bool,
    pub reminder_time: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_parse() {
        assert_eq!(DocumentType::parse("image"), Some(DocumentType::Image));
        assert_eq!(DocumentType::parse("pdf"), Some(DocumentType::Pdf));
        assert_eq!(DocumentType::parse("spreadsheet"), None);
    }

    #[test]
    fn test_new_item_defaults() {
        let item = VaultItem::new(
            "Lease",
            "Rental Property",
            "abc123.jpg".to_string(),
            vec!["2024".to_string()],
            None,
        );
        assert!(item.content_ref.is_some());
        assert!(item.thumbnail_ref.is_none());
        assert!(item.extracted_text.is_none());
        assert_eq!(item.document_type, DocumentType::Image);
    }
}
