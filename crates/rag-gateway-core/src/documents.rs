//! Corpus document storage.

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifier for a corpus document. For filesystem stores this is the
/// document path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document not found: {0}")]
    NotFound(DocumentId),
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Source of corpus documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Enumerate every document, in a stable order.
    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError>;

    /// Read the full contents of one document.
    async fn load(&self, id: &DocumentId) -> Result<Vec<u8>, DocumentError>;
}

/// Documents are the regular files directly inside one directory.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn list(&self) -> Result<Vec<DocumentId>, DocumentError> {
        let io_err = |source| DocumentError::Io {
            path: self.root.clone(),
            source,
        };
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(io_err)?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            // metadata follows symlinks, so a link to a file counts as a file
            let metadata = tokio::fs::metadata(&path)
                .await
                .map_err(|source| DocumentError::Io {
                    path: path.clone(),
                    source,
                })?;
            if !metadata.is_file() {
                debug!("skipping non-file corpus entry {}", path.display());
                continue;
            }
            ids.push(DocumentId::new(path.to_string_lossy()));
        }
        ids.sort();
        Ok(ids)
    }

    async fn load(&self, id: &DocumentId) -> Result<Vec<u8>, DocumentError> {
        let path = PathBuf::from(id.as_str());
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(DocumentError::NotFound(id.clone()))
            }
            Err(source) => Err(DocumentError::Io { path, source }),
        }
    }
}
