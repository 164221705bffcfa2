//! Seams to the embedding and completion services.

use async_trait::async_trait;
use rag_gateway_protocol::ChatCompletionsRequest;
use std::fmt;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncBufRead;

/// Credentials forwarded from the inbound request.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestAuth {
    /// Bearer token for the downstream services.
    pub token: String,
    /// Integration identifier sent alongside the token.
    pub integration_id: String,
}

impl RequestAuth {
    pub fn new(token: impl Into<String>, integration_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            integration_id: integration_id.into(),
        }
    }
}

impl fmt::Debug for RequestAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestAuth")
            .field("token", &"<redacted>")
            .field("integration_id", &self.integration_id)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("{0}")]
    Other(String),
}

/// Raw downstream response body, read line by line by the relay.
pub type CompletionStream = Pin<Box<dyn AsyncBufRead + Send>>;

/// Turns texts into embedding vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `inputs`; the result holds one vector per input, in input order.
    async fn embed(
        &self,
        auth: &RequestAuth,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, ProviderError>;
}

/// Opens a streaming chat completion.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send `request` and hand back the response body once the service has
    /// accepted it.
    async fn stream_completion(
        &self,
        auth: &RequestAuth,
        request: &ChatCompletionsRequest,
    ) -> Result<CompletionStream, ProviderError>;
}
