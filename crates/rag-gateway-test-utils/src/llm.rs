use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use parking_lot::Mutex;
use rag_gateway_core::{
    CompletionProvider, CompletionStream, EmbeddingProvider, ProviderError, RequestAuth,
};
use rag_gateway_protocol::ChatCompletionsRequest;
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::io::StreamReader;

/// Embedder with a fixed text -> vector table.
#[derive(Debug)]
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    fallback: Vec<f32>,
    delay: Option<Duration>,
    drop_last: bool,
    calls: AtomicUsize,
    batches: Mutex<Vec<Vec<String>>>,
    auths: Mutex<Vec<RequestAuth>>,
}

impl StaticEmbedder {
    /// Unknown texts embed to `fallback`.
    pub fn new(fallback: Vec<f32>) -> Self {
        Self {
            vectors: HashMap::new(),
            fallback,
            delay: None,
            drop_last: false,
            calls: AtomicUsize::new(0),
            batches: Mutex::new(Vec::new()),
            auths: Mutex::new(Vec::new()),
        }
    }

    pub fn with_vector(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    /// Sleep before answering, to widen race windows.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return one vector fewer than requested.
    pub fn dropping_last(mut self) -> Self {
        self.drop_last = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Inputs of every call, in call order.
    pub fn batches(&self) -> Vec<Vec<String>> {
        self.batches.lock().clone()
    }

    pub fn auths(&self) -> Vec<RequestAuth> {
        self.auths.lock().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed(
        &self,
        auth: &RequestAuth,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batches.lock().push(inputs.clone());
        self.auths.lock().push(auth.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let mut vectors = inputs
            .iter()
            .map(|text| {
                self.vectors
                    .get(text)
                    .cloned()
                    .unwrap_or_else(|| self.fallback.clone())
            })
            .collect::<Vec<_>>();
        if self.drop_last {
            vectors.pop();
        }
        Ok(vectors)
    }
}

/// Embedder that always fails, optionally only after some successful calls.
#[derive(Debug)]
pub struct FailingEmbedder {
    succeed_first: usize,
    vector: Vec<f32>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl FailingEmbedder {
    pub fn new() -> Self {
        Self::after(0, Vec::new())
    }

    /// Answer the first `calls` requests with `vector`, then fail.
    pub fn after(calls: usize, vector: Vec<f32>) -> Self {
        Self {
            succeed_first: calls,
            vector,
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering or failing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for FailingEmbedder {
    async fn embed(
        &self,
        _auth: &RequestAuth,
        inputs: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if call < self.succeed_first {
            return Ok(vec![self.vector.clone(); inputs.len()]);
        }
        Err(ProviderError::Other("embedding service unavailable".to_string()))
    }
}

/// Completion service that replays a fixed body and records requests.
#[derive(Debug)]
pub struct ScriptedCompletion {
    body: Vec<u8>,
    broken: bool,
    calls: AtomicUsize,
    requests: Mutex<Vec<ChatCompletionsRequest>>,
    auths: Mutex<Vec<RequestAuth>>,
}

impl ScriptedCompletion {
    pub fn new(body: impl Into<Vec<u8>>) -> Self {
        Self {
            body: body.into(),
            broken: false,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            auths: Mutex::new(Vec::new()),
        }
    }

    /// Body made of SSE `data:` lines followed by blank separators.
    pub fn sse(events: &[&str]) -> Self {
        let body = events
            .iter()
            .map(|event| format!("data: {event}\n\n"))
            .collect::<String>();
        Self::new(body)
    }

    /// Fail with a read error after the body has been delivered.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatCompletionsRequest> {
        self.requests.lock().last().cloned()
    }

    pub fn auths(&self) -> Vec<RequestAuth> {
        self.auths.lock().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedCompletion {
    async fn stream_completion(
        &self,
        auth: &RequestAuth,
        request: &ChatCompletionsRequest,
    ) -> Result<CompletionStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        self.auths.lock().push(auth.clone());
        if self.broken {
            let body = String::from_utf8_lossy(&self.body);
            return Ok(broken_stream(&[body.as_ref()]));
        }
        Ok(Box::pin(Cursor::new(self.body.clone())))
    }
}

/// Completion service that rejects every request.
#[derive(Debug, Default)]
pub struct FailingCompletion {
    calls: AtomicUsize,
}

impl FailingCompletion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionProvider for FailingCompletion {
    async fn stream_completion(
        &self,
        _auth: &RequestAuth,
        _request: &ChatCompletionsRequest,
    ) -> Result<CompletionStream, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ProviderError::Status {
            status: 502,
            body: "upstream unavailable".to_string(),
        })
    }
}

/// Stream that yields `chunks` and then fails with a read error.
pub fn broken_stream(chunks: &[&str]) -> CompletionStream {
    let mut items = chunks
        .iter()
        .map(|chunk| Ok(Bytes::from(chunk.to_string())))
        .collect::<Vec<io::Result<Bytes>>>();
    items.push(Err(io::Error::new(
        io::ErrorKind::ConnectionReset,
        "connection reset",
    )));
    Box::pin(StreamReader::new(stream::iter(items)))
}
