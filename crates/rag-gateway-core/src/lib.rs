//! Core request pipeline for the retrieval-augmented completion gateway.
//!
//! This crate owns payload verification, the shared corpus index, similarity
//! selection, and the orchestrator that stitches them together in front of a
//! downstream completion service.

pub mod copilot;
pub mod corpus;
pub mod documents;
pub mod error;
pub mod keys;
pub mod orchestrator;
pub mod providers;
pub mod selector;
pub mod verifier;

pub use copilot::CopilotClient;
pub use corpus::{CorpusEmbedder, CorpusError, CorpusIndex, Dataset, Embedding};
pub use documents::{DocumentError, DocumentId, DocumentStore, FsDocumentStore};
pub use error::{FailureKind, GatewayError};
pub use keys::{
    KeyError, PublishedKey, PublishedKeys, fetch_published_key, read_public_key, resolve_verifier,
};
pub use orchestrator::relay::{MAX_LINE_BYTES, RelayError, RelaySummary, relay_lines};
pub use orchestrator::{
    CompletionOrchestrator, GatewayServices, InboundRequest, InjectedContext, PreparedCompletion,
    RequestStage, RetrievalSettings,
};
pub use providers::{
    CompletionProvider, CompletionStream, EmbeddingProvider, ProviderError, RequestAuth,
};
pub use selector::{Scored, SelectionError, cosine_similarity, select_best};
pub use verifier::{PayloadVerifier, SignatureError};
