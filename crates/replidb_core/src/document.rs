//! Documents.

use crate::error::CoreResult;
use serde_json::Value;

/// A document as seen by callers of the store.
///
/// `content` is `None` for a tombstone. `rev` is the revision the document
/// was read at; writes use it as the base for optimistic concurrency.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Document id, immutable once created.
    pub doc_id: String,
    /// Revision string (`origin:counter|...`). Empty for a never-stored doc.
    pub rev: String,
    /// JSON content, or `None` if deleted.
    pub content: Option<Value>,
    /// Whether the document has unresolved conflicts.
    pub has_conflicts: bool,
}

impl Document {
    /// Creates a document.
    pub fn new(doc_id: impl Into<String>, rev: impl Into<String>, content: Option<Value>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev: rev.into(),
            content,
            has_conflicts: false,
        }
    }

    /// Creates a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not valid JSON.
    pub fn from_json(
        doc_id: impl Into<String>,
        rev: impl Into<String>,
        json: Option<&str>,
    ) -> CoreResult<Self> {
        let content = json.map(serde_json::from_str).transpose()?;
        Ok(Self::new(doc_id, rev, content))
    }

    /// Returns the content serialized as compact JSON text.
    #[must_use]
    pub fn get_json(&self) -> Option<String> {
        self.content.as_ref().map(Value::to_string)
    }

    /// Replaces the content with parsed JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error if `json` is not valid JSON.
    pub fn set_json(&mut self, json: &str) -> CoreResult<()> {
        self.content = Some(serde_json::from_str(json)?);
        Ok(())
    }

    /// Returns true if the document is deleted.
    #[must_use]
    pub fn is_tombstone(&self) -> bool {
        self.content.is_none()
    }

    /// Turns the document into a tombstone.
    pub fn make_tombstone(&mut self) {
        self.content = None;
    }

    /// Returns true if both documents carry the same content.
    #[must_use]
    pub fn same_content_as(&self, other: &Self) -> bool {
        self.content == other.content
    }
}
