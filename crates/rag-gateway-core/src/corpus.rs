//! One-time corpus embedding shared by every request.
//!
//! The first request to need the corpus starts the build; everyone else awaits
//! the same outcome. The build runs on its own task, so a caller that goes
//! away mid-build does not cancel it, and a failed build stays failed.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use std::sync::{Arc, OnceLock};
use thiserror::Error;

use crate::documents::{DocumentId, DocumentStore};
use crate::providers::{EmbeddingProvider, RequestAuth};

pub type Embedding = Vec<f32>;

/// One embedded corpus document.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub id: DocumentId,
    pub embedding: Embedding,
}

/// The embedded corpus, in document enumeration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorpusIndex {
    datasets: Vec<Dataset>,
}

impl CorpusIndex {
    /// Build an index, checking that every embedding has the same dimension.
    pub fn new(datasets: Vec<Dataset>) -> Result<Self, CorpusError> {
        if let Some(first) = datasets.first() {
            let expected = first.embedding.len();
            if let Some(odd) = datasets.iter().find(|d| d.embedding.len() != expected) {
                return Err(CorpusError::Dimension {
                    id: odd.id.clone(),
                    expected,
                    got: odd.embedding.len(),
                });
            }
        }
        Ok(Self { datasets })
    }

    pub fn datasets(&self) -> &[Dataset] {
        &self.datasets
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    /// Embedding dimension, or `None` for an empty corpus.
    pub fn dimension(&self) -> Option<usize> {
        self.datasets.first().map(|d| d.embedding.len())
    }
}

/// Failure of the corpus build. Cloned out to every waiting request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorpusError {
    #[error("failed to enumerate documents: {0}")]
    Enumerate(String),
    #[error("failed to load document {id}: {message}")]
    Load { id: DocumentId, message: String },
    #[error("failed to embed documents: {0}")]
    Embed(String),
    #[error("embedding service returned {got} vectors for {expected} documents")]
    CountMismatch { expected: usize, got: usize },
    #[error("document {id} has embedding dimension {got}, expected {expected}")]
    Dimension {
        id: DocumentId,
        expected: usize,
        got: usize,
    },
    #[error("corpus build task aborted: {0}")]
    Aborted(String),
}

type BuildOutcome = Result<Arc<CorpusIndex>, CorpusError>;

/// Lazily builds the corpus index exactly once.
pub struct CorpusEmbedder {
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    build: OnceLock<Shared<BoxFuture<'static, BuildOutcome>>>,
}

impl CorpusEmbedder {
    pub fn new(
        documents: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        batch_size: usize,
    ) -> Self {
        Self {
            documents,
            embedder,
            batch_size: batch_size.max(1),
            build: OnceLock::new(),
        }
    }

    /// Return the corpus index, building it with `auth` if nobody has yet.
    ///
    /// Must be called from within a tokio runtime.
    pub async fn ensure(&self, auth: &RequestAuth) -> Result<Arc<CorpusIndex>, CorpusError> {
        let build = self
            .build
            .get_or_init(|| self.start_build(auth.clone()))
            .clone();
        build.await
    }

    /// Outcome of a finished build, if any.
    pub fn peek(&self) -> Option<Result<Arc<CorpusIndex>, CorpusError>> {
        self.build.get().and_then(|build| build.peek().cloned())
    }

    fn start_build(&self, auth: RequestAuth) -> Shared<BoxFuture<'static, BuildOutcome>> {
        info!("starting corpus build (batch_size={})", self.batch_size);
        let task = tokio::spawn(build_index(
            Arc::clone(&self.documents),
            Arc::clone(&self.embedder),
            auth,
            self.batch_size,
        ));
        async move {
            let outcome = task
                .await
                .unwrap_or_else(|err| Err(CorpusError::Aborted(err.to_string())));
            match &outcome {
                Ok(index) => info!(
                    "corpus ready (datasets={}, dimension={:?})",
                    index.len(),
                    index.dimension()
                ),
                Err(err) => warn!("corpus build failed: {err}"),
            }
            outcome
        }
        .boxed()
        .shared()
    }
}

async fn build_index(
    documents: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    auth: RequestAuth,
    batch_size: usize,
) -> BuildOutcome {
    let ids = documents
        .list()
        .await
        .map_err(|err| CorpusError::Enumerate(err.to_string()))?;
    debug!("corpus documents enumerated (count={})", ids.len());

    let mut texts = Vec::with_capacity(ids.len());
    for id in &ids {
        let bytes = documents.load(id).await.map_err(|err| CorpusError::Load {
            id: id.clone(),
            message: err.to_string(),
        })?;
        texts.push(String::from_utf8_lossy(&bytes).into_owned());
    }

    let mut vectors = Vec::with_capacity(texts.len());
    for (batch_index, batch) in texts.chunks(batch_size).enumerate() {
        debug!(
            "embedding corpus batch {} (size={})",
            batch_index,
            batch.len()
        );
        let embedded = embedder
            .embed(&auth, batch.to_vec())
            .await
            .map_err(|err| CorpusError::Embed(err.to_string()))?;
        if embedded.len() != batch.len() {
            return Err(CorpusError::CountMismatch {
                expected: batch.len(),
                got: embedded.len(),
            });
        }
        vectors.extend(embedded);
    }

    let datasets = ids
        .into_iter()
        .zip(vectors)
        .map(|(id, embedding)| Dataset { id, embedding })
        .collect();
    CorpusIndex::new(datasets).map(Arc::new)
}
