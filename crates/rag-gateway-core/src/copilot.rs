//! HTTP client for the Copilot embeddings and chat completion endpoints.

use async_trait::async_trait;
use futures_util::TryStreamExt;
use log::{debug, warn};
use rag_gateway_config::CopilotConfig;
use rag_gateway_protocol::{ChatCompletionsRequest, EmbeddingsRequest, EmbeddingsResponse, Model};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderValue};
use reqwest::{Client, RequestBuilder, StatusCode};
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;

use crate::providers::{
    CompletionProvider, CompletionStream, EmbeddingProvider, ProviderError, RequestAuth,
};

/// Header carrying the integration identifier.
pub const INTEGRATION_ID_HEADER: &str = "Copilot-Integration-Id";
const RETRY_BASE_MS: u64 = 200;

/// Talks to an OpenAI-compatible Copilot endpoint with per-request credentials.
#[derive(Debug, Clone)]
pub struct CopilotClient {
    client: Client,
    base_url: String,
    embeddings_model: Model,
    completion_integration_id: Option<String>,
    max_retries: usize,
}

impl CopilotClient {
    pub fn new(config: &CopilotConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Reuse an existing `reqwest` client.
    pub fn with_client(client: Client, config: &CopilotConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            embeddings_model: Model::new(config.embeddings_model.clone()),
            completion_integration_id: config.completion_integration_id.clone(),
            max_retries: config.max_retries,
        }
    }

    fn post(
        &self,
        path: &str,
        auth: &RequestAuth,
        integration_id: &str,
    ) -> Result<RequestBuilder, ProviderError> {
        let bearer = HeaderValue::from_str(&format!("Bearer {}", auth.token))
            .map_err(|err| ProviderError::Other(format!("invalid token: {err}")))?;
        let integration = HeaderValue::from_str(integration_id)
            .map_err(|err| ProviderError::Other(format!("invalid integration id: {err}")))?;
        Ok(self
            .client
            .post(format!("{}/{path}", self.base_url))
            .header(AUTHORIZATION, bearer)
            .header(INTEGRATION_ID_HEADER, integration))
    }

    fn should_retry(status: StatusCode) -> bool {
        status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
    }

    fn is_retryable_error(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect() || err.is_request()
    }

    fn retry_backoff(attempt: usize) -> Duration {
        let capped = attempt.min(5) as u32;
        Duration::from_millis(RETRY_BASE_MS * (1 << capped))
    }
}

#[async_trait]
impl EmbeddingProvider for CopilotClient {
    async fn embed(
        &self,
        auth: &RequestAuth,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let expected = inputs.len();
        let request = EmbeddingsRequest {
            model: self.embeddings_model.clone(),
            input: inputs,
        };

        let mut attempt = 0usize;
        loop {
            let response = self
                .post("embeddings", auth, &auth.integration_id)?
                .json(&request)
                .send()
                .await;
            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let parsed: EmbeddingsResponse = resp.json().await?;
                        let vectors = parsed.into_ordered_vectors();
                        if vectors.len() != expected {
                            return Err(ProviderError::InvalidResponse(format!(
                                "{} embeddings for {expected} inputs",
                                vectors.len()
                            )));
                        }
                        debug!("embedded {expected} inputs");
                        return Ok(vectors);
                    }

                    let body = resp
                        .text()
                        .await
                        .unwrap_or_else(|_| "<body unavailable>".to_string());
                    if Self::should_retry(status) && attempt < self.max_retries {
                        attempt += 1;
                        warn!("embeddings request failed ({status}), retry {attempt}");
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(ProviderError::Status {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(err) => {
                    if Self::is_retryable_error(&err) && attempt < self.max_retries {
                        attempt += 1;
                        warn!("embeddings request error ({err}), retry {attempt}");
                        tokio::time::sleep(Self::retry_backoff(attempt)).await;
                        continue;
                    }
                    return Err(err.into());
                }
            }
        }
    }
}

#[async_trait]
impl CompletionProvider for CopilotClient {
    async fn stream_completion(
        &self,
        auth: &RequestAuth,
        request: &ChatCompletionsRequest,
    ) -> Result<CompletionStream, ProviderError> {
        let integration_id = self
            .completion_integration_id
            .as_deref()
            .unwrap_or(&auth.integration_id);
        let resp = self
            .post("chat/completions", auth, integration_id)?
            .header(ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let body = resp.bytes_stream().map_err(io::Error::other);
        Ok(Box::pin(StreamReader::new(body)))
    }
}
