//! Wire protocol types for inbound chat requests and the Copilot API.

mod chat;
mod embeddings;

pub use chat::{ChatCompletionsRequest, ChatMessage, ChatRequest, Model, Role};
pub use embeddings::{EmbeddingData, EmbeddingUsage, EmbeddingsRequest, EmbeddingsResponse};
