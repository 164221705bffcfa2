//! Test helpers shared across RAG gateway crates.

pub mod documents;
pub mod llm;
pub mod signing;

pub use documents::MemoryDocumentStore;
pub use llm::{
    FailingCompletion, FailingEmbedder, ScriptedCompletion, StaticEmbedder, broken_stream,
};
pub use signing::TestSigner;
