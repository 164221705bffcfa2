//! Completion orchestrator.
//!
//! A request moves through verification, corpus readiness, query embedding,
//! selection, and context injection before the downstream call is opened. Only
//! then does the caller commit to a response; the relay runs afterwards.

pub mod prompt;
pub mod relay;

use bytes::Bytes;
use log::{debug, info, warn};
use rag_gateway_config::GatewayConfig;
use rag_gateway_protocol::{ChatCompletionsRequest, ChatRequest, Model};
use std::fmt;
use std::sync::Arc;
use tokio::io::AsyncWrite;
use uuid::Uuid;

use crate::corpus::CorpusEmbedder;
use crate::documents::{DocumentId, DocumentStore};
use crate::error::GatewayError;
use crate::providers::{
    CompletionProvider, CompletionStream, EmbeddingProvider, ProviderError, RequestAuth,
};
use crate::selector::select_above;
use crate::verifier::{PayloadVerifier, SignatureError};
use relay::{RelaySummary, relay_lines};

/// Stages a request passes through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStage {
    Received,
    Verified,
    CorpusReady,
    Embedded,
    Selected,
    ContextInjected,
    Forwarded,
    Streaming,
    Done,
}

impl fmt::Display for RequestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStage::Received => "received",
            RequestStage::Verified => "verified",
            RequestStage::CorpusReady => "corpus_ready",
            RequestStage::Embedded => "embedded",
            RequestStage::Selected => "selected",
            RequestStage::ContextInjected => "context_injected",
            RequestStage::Forwarded => "forwarded",
            RequestStage::Streaming => "streaming",
            RequestStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Raw inbound request as seen by the orchestrator.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    /// Exact body bytes; the signature covers these.
    pub body: Bytes,
    /// Base64 DER signature, `None` when the header was absent.
    pub signature: Option<String>,
    pub auth: RequestAuth,
}

/// Retrieval knobs taken from config.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    pub completion_model: Model,
    pub preamble: String,
    pub min_similarity: Option<f32>,
    pub batch_size: usize,
}

impl RetrievalSettings {
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self {
            completion_model: Model::new(config.copilot.completion_model.clone()),
            preamble: config.retrieval.preamble.clone(),
            min_similarity: config.retrieval.min_similarity,
            batch_size: config.corpus.batch_size,
        }
    }
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self::from_config(&GatewayConfig::default())
    }
}

/// The collaborators a gateway talks to.
#[derive(Clone)]
pub struct GatewayServices {
    pub documents: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub completions: Arc<dyn CompletionProvider>,
}

/// Document chosen for a request.
#[derive(Debug, Clone, PartialEq)]
pub struct InjectedContext {
    pub document: DocumentId,
    pub score: f64,
}

/// A request that has been accepted downstream and is ready to stream.
pub struct PreparedCompletion {
    pub request_id: Uuid,
    /// The request exactly as it was sent downstream.
    pub request: ChatCompletionsRequest,
    pub context: Option<InjectedContext>,
    stream: CompletionStream,
}

impl fmt::Debug for PreparedCompletion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedCompletion")
            .field("request_id", &self.request_id)
            .field("request", &self.request)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// Runs the retrieval-augmented completion pipeline.
///
/// Built once at startup and shared between requests; the only cross-request
/// state is the corpus index.
pub struct CompletionOrchestrator {
    settings: RetrievalSettings,
    verifier: PayloadVerifier,
    corpus: CorpusEmbedder,
    services: GatewayServices,
}

impl CompletionOrchestrator {
    pub fn new(
        settings: RetrievalSettings,
        verifier: PayloadVerifier,
        services: GatewayServices,
    ) -> Self {
        let corpus = CorpusEmbedder::new(
            Arc::clone(&services.documents),
            Arc::clone(&services.embedder),
            settings.batch_size,
        );
        Self {
            settings,
            verifier,
            corpus,
            services,
        }
    }

    pub fn from_config(
        config: &GatewayConfig,
        verifier: PayloadVerifier,
        services: GatewayServices,
    ) -> Self {
        Self::new(RetrievalSettings::from_config(config), verifier, services)
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn corpus(&self) -> &CorpusEmbedder {
        &self.corpus
    }

    /// Handle a request end to end, streaming the response into `writer`.
    pub async fn handle<W>(
        &self,
        inbound: InboundRequest,
        writer: &mut W,
    ) -> Result<RelaySummary, GatewayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let prepared = self.prepare(inbound).await?;
        self.relay(prepared, writer).await
    }

    /// Run every step up to and including opening the downstream stream.
    ///
    /// Nothing has been written to the client when this returns, so every
    /// error here can still become a status code.
    pub async fn prepare(
        &self,
        inbound: InboundRequest,
    ) -> Result<PreparedCompletion, GatewayError> {
        let request_id = Uuid::new_v4();
        let InboundRequest {
            body,
            signature,
            auth,
        } = inbound;
        stage(request_id, RequestStage::Received);

        let signature = match signature {
            Some(signature) => signature,
            None => {
                warn!("rejected payload without signature (request_id={request_id})");
                return Err(SignatureError::Missing.into());
            }
        };
        match self.verifier.verify(&body, &signature) {
            Ok(true) => {}
            Ok(false) => {
                warn!("rejected payload with mismatched signature (request_id={request_id})");
                return Err(GatewayError::InvalidSignature);
            }
            Err(err) => {
                warn!("rejected payload with malformed signature (request_id={request_id}): {err}");
                return Err(err.into());
            }
        }
        stage(request_id, RequestStage::Verified);

        let chat: ChatRequest = serde_json::from_slice(&body).map_err(GatewayError::ClientInput)?;

        let corpus = self.corpus.ensure(&auth).await?;
        stage(request_id, RequestStage::CorpusReady);

        let mut context = None;
        let mut context_message = None;
        if let Some(query) = prompt::latest_user_query(&chat.messages) {
            let query_embedding = self
                .services
                .embedder
                .embed(&auth, vec![query.content.clone()])
                .await
                .map_err(GatewayError::QueryEmbedding)?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    GatewayError::QueryEmbedding(ProviderError::InvalidResponse(
                        "no embedding returned for query".to_string(),
                    ))
                })?;
            stage(request_id, RequestStage::Embedded);

            let selected = select_above(
                corpus.datasets(),
                &query_embedding,
                self.settings.min_similarity,
            )?;
            stage(request_id, RequestStage::Selected);

            if let Some(best) = selected {
                let id = best.item.id.clone();
                let document = self
                    .services
                    .documents
                    .load(&id)
                    .await
                    .map_err(|source| GatewayError::Document {
                        id: id.clone(),
                        source,
                    })?;
                info!(
                    "injecting context (request_id={request_id}, document={id}, score={:.4})",
                    best.score
                );
                context_message = Some(prompt::context_message(&self.settings.preamble, &document));
                context = Some(InjectedContext {
                    document: id,
                    score: best.score,
                });
                stage(request_id, RequestStage::ContextInjected);
            } else {
                debug!("no document selected (request_id={request_id})");
            }
        } else {
            debug!("no user query, forwarding without context (request_id={request_id})");
        }

        let request = ChatCompletionsRequest {
            messages: prompt::with_context(chat.messages, context_message),
            model: self.settings.completion_model.clone(),
            stream: true,
        };
        let stream = self
            .services
            .completions
            .stream_completion(&auth, &request)
            .await
            .map_err(GatewayError::Downstream)?;
        stage(request_id, RequestStage::Forwarded);

        Ok(PreparedCompletion {
            request_id,
            request,
            context,
            stream,
        })
    }

    /// Relay a prepared completion into `writer`.
    pub async fn relay<W>(
        &self,
        prepared: PreparedCompletion,
        writer: &mut W,
    ) -> Result<RelaySummary, GatewayError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let PreparedCompletion {
            request_id,
            mut stream,
            ..
        } = prepared;
        stage(request_id, RequestStage::Streaming);
        match relay_lines(&mut stream, writer).await {
            Ok(summary) => {
                stage(request_id, RequestStage::Done);
                info!(
                    "completion relayed (request_id={request_id}, lines={}, bytes={})",
                    summary.units, summary.bytes
                );
                Ok(summary)
            }
            Err(err) => {
                warn!("relay stopped (request_id={request_id}): {err}");
                Err(err.into())
            }
        }
    }
}

fn stage(request_id: Uuid, stage: RequestStage) {
    debug!("request stage (request_id={request_id}, stage={stage})");
}
