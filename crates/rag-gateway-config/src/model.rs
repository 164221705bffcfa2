//! Configuration schema for the gateway.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root config for the gateway.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct GatewayConfig {
    #[serde(default, rename = "$schema")]
    pub schema: Option<String>,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub copilot: CopilotConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

impl GatewayConfig {
    /// Start building a config programmatically with defaults applied.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::new()
    }
}

/// Builder for assembling a `GatewayConfig` in code.
#[derive(Debug, Default, Clone)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    /// Create a new builder seeded with default config values.
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
        }
    }

    /// Replace the HTTP server configuration.
    pub fn server(mut self, server: ServerConfig) -> Self {
        self.config.server = server;
        self
    }

    /// Replace the signature verification configuration.
    pub fn auth(mut self, auth: AuthConfig) -> Self {
        self.config.auth = auth;
        self
    }

    /// Replace the upstream Copilot API configuration.
    pub fn copilot(mut self, copilot: CopilotConfig) -> Self {
        self.config.copilot = copilot;
        self
    }

    /// Replace the document corpus configuration.
    pub fn corpus(mut self, corpus: CorpusConfig) -> Self {
        self.config.corpus = corpus;
        self
    }

    /// Replace the retrieval configuration.
    pub fn retrieval(mut self, retrieval: RetrievalConfig) -> Self {
        self.config.retrieval = retrieval;
        self
    }

    /// Finalize and return the built `GatewayConfig`.
    pub fn build(self) -> GatewayConfig {
        self.config
    }
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Route that receives signed chat requests.
    #[serde(default = "default_route")]
    pub route: String,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            route: default_route(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_route() -> String {
    "/".to_string()
}

/// Default inbound body limit (2 MiB).
fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

/// Source of the trusted key used to verify payload signatures.
///
/// Exactly one of the three sources is used, in order: inline PEM, PEM file,
/// then the published key document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuthConfig {
    #[serde(default)]
    pub public_key_pem: Option<String>,
    #[serde(default)]
    pub public_key_path: Option<PathBuf>,
    #[serde(default = "default_public_keys_url")]
    pub public_keys_url: Option<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            public_key_pem: None,
            public_key_path: None,
            public_keys_url: default_public_keys_url(),
        }
    }
}

fn default_public_keys_url() -> Option<String> {
    Some("https://api.github.com/meta/public_keys/copilot_api".to_string())
}

/// Upstream Copilot API configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CopilotConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_embeddings_model")]
    pub embeddings_model: String,
    #[serde(default = "default_completion_model")]
    pub completion_model: String,
    /// Integration id sent with completion calls; the caller's id is used when unset.
    #[serde(default = "default_completion_integration_id")]
    pub completion_integration_id: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
}

impl Default for CopilotConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embeddings_model: default_embeddings_model(),
            completion_model: default_completion_model(),
            completion_integration_id: default_completion_integration_id(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.githubcopilot.com".to_string()
}

fn default_embeddings_model() -> String {
    "text-embedding-ada-002".to_string()
}

fn default_completion_model() -> String {
    "gpt-4o".to_string()
}

fn default_completion_integration_id() -> Option<String> {
    Some("copilot-chat".to_string())
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_retries() -> usize {
    3
}

/// Document corpus configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorpusConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Maximum documents per embeddings request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_batch_size() -> usize {
    16
}

/// Retrieval and context injection configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalConfig {
    /// Instructional text placed before the retrieved document.
    #[serde(default = "default_preamble")]
    pub preamble: String,
    /// Minimum cosine similarity a document must reach to be injected.
    #[serde(default)]
    pub min_similarity: Option<f32>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            preamble: default_preamble(),
            min_similarity: None,
        }
    }
}

fn default_preamble() -> String {
    "You are a helpful assistant that answers questions using the reference material \
     provided below. Prefer the reference material over prior knowledge, say so when \
     it does not cover the question, and answer in a structured format using headings, \
     bullet points, and code blocks where applicable.\n\
     Use the following context when responding to a message.\n"
        .to_string()
}
