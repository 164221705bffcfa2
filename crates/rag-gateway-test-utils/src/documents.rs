use async_trait::async_trait;
use parking_lot::Mutex;
use rag_gateway_core::{DocumentError, DocumentId, DocumentStore};

/// In-memory corpus; documents are listed in insertion order.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Vec<(DocumentId, Vec<u8>)>,
    loads: Mutex<Vec<DocumentId>>,
    fail_list: bool,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(mut self, id: impl Into<DocumentId>, contents: impl Into<Vec<u8>>) -> Self {
        self.documents.push((id.into(), contents.into()));
        self
    }

    /// Make `list` fail.
    pub fn failing_list(mut self) -> Self {
        self.fail_list = true;
        self
    }

    /// Ids passed to `load`, in call order.
    pub fn loads(&self) -> Vec<DocumentId> {
        self.loads.lock().clone()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError> {
        if self.fail_list {
            return Err(DocumentError::Io {
                path: "memory".into(),
                source: std::io::Error::other("listing disabled"),
            });
        }
        Ok(self.documents.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn load(&self, id: &DocumentId) -> Result<Vec<u8>, DocumentError> {
        self.loads.lock().push(id.clone());
        self.documents
            .iter()
            .find(|(doc_id, _)| doc_id == id)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| DocumentError::NotFound(id.clone()))
    }
}
