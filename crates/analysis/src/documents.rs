use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Snapshot of an open document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub uri: String,
    /// Filesystem path, when the URI is a `file:` URI.
    pub path: Option<PathBuf>,
    pub language_id: String,
    pub text: Arc<str>,
    pub version: Option<i32>,
}

impl Document {
    pub fn new(
        uri: impl Into<String>,
        path: Option<PathBuf>,
        language_id: impl Into<String>,
        text: impl Into<Arc<str>>,
        version: Option<i32>,
    ) -> Self {
        Self {
            uri: uri.into(),
            path,
            language_id: language_id.into(),
            text: text.into(),
            version,
        }
    }
}

/// Open documents keyed by URI.
#[derive(Debug, Default)]
pub struct DocumentStore {
    documents: DashMap<String, Document>,
}

impl DocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, document: Document) {
        self.documents.insert(document.uri.clone(), document);
    }

    /// Replace the text of an open document and return the new snapshot.
    ///
    /// Returns `None` if the document is not open.
    pub fn update(
        &self,
        uri: &str,
        text: impl Into<Arc<str>>,
        version: Option<i32>,
    ) -> Option<Document> {
        let mut entry = self.documents.get_mut(uri)?;
        entry.text = text.into();
        if version.is_some() {
            entry.version = version;
        }
        Some(entry.value().clone())
    }

    #[must_use]
    pub fn get(&self, uri: &str) -> Option<Document> {
        self.documents.get(uri).map(|entry| entry.value().clone())
    }

    pub fn close(&self, uri: &str) -> Option<Document> {
        self.documents.remove(uri).map(|(_, document)| document)
    }

    /// Snapshots of every open document, ordered by URI.
    #[must_use]
    pub fn all(&self) -> Vec<Document> {
        let mut documents: Vec<Document> = self
            .documents
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        documents.sort_by(|a, b| a.uri.cmp(&b.uri));
        documents
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
