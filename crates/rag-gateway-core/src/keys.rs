//! Trusted key discovery.
//!
//! GitHub publishes the keys it signs agent payloads with as a JSON document;
//! the entry flagged `is_current` is the one to trust.

use log::{debug, info};
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::verifier::PayloadVerifier;
use rag_gateway_config::AuthConfig;

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("invalid public key PEM: {0}")]
    Pem(String),
    #[error("failed to read public key file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to fetch published keys: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("published key document has no current key")]
    NoCurrentKey,
    #[error("no trusted key configured")]
    Unconfigured,
}

/// Document served by the published keys endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKeys {
    pub public_keys: Vec<PublishedKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKey {
    pub key_identifier: String,
    pub key: String,
    #[serde(default)]
    pub is_current: bool,
}

impl PublishedKeys {
    pub fn current(&self) -> Option<&PublishedKey> {
        self.public_keys.iter().find(|key| key.is_current)
    }

    /// Build a verifier for the current key.
    pub fn current_verifier(&self) -> Result<PayloadVerifier, KeyError> {
        let key = self.current().ok_or(KeyError::NoCurrentKey)?;
        debug!("using published key {}", key.key_identifier);
        PayloadVerifier::from_public_key_pem(&key.key)
    }
}

/// Read a PEM encoded public key from disk.
pub async fn read_public_key(path: impl Into<PathBuf>) -> Result<PayloadVerifier, KeyError> {
    let path = path.into();
    let pem = tokio::fs::read_to_string(&path)
        .await
        .map_err(|source| KeyError::Read {
            path: path.clone(),
            source,
        })?;
    info!("loaded trusted key from {}", path.display());
    PayloadVerifier::from_public_key_pem(&pem)
}

/// Fetch the published key document and trust its current key.
pub async fn fetch_published_key(
    client: &reqwest::Client,
    url: &str,
) -> Result<PayloadVerifier, KeyError> {
    info!("fetching trusted key from {url}");
    let keys: PublishedKeys = client
        .get(url)
        .header(USER_AGENT, concat!("rag-gateway/", env!("CARGO_PKG_VERSION")))
        .header(ACCEPT, "application/json")
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    keys.current_verifier()
}

/// Resolve the trusted key from config.
///
/// An inline PEM wins over a key file, which wins over the published keys URL.
pub async fn resolve_verifier(
    auth: &AuthConfig,
    client: &reqwest::Client,
) -> Result<PayloadVerifier, KeyError> {
    if let Some(pem) = auth.public_key_pem.as_deref() {
        info!("using inline trusted key");
        return PayloadVerifier::from_public_key_pem(pem);
    }
    if let Some(path) = auth.public_key_path.as_ref() {
        return read_public_key(path).await;
    }
    if let Some(url) = auth.public_keys_url.as_deref() {
        return fetch_published_key(client, url).await;
    }
    Err(KeyError::Unconfigured)
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use p256::pkcs8::{EncodePublicKey, LineEnding};

    fn pem(seed: u8) -> String {
        SigningKey::from_slice(&[seed; 32])
            .expect("key")
            .verifying_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("pem")
    }

    #[test]
    fn picks_current_key() {
        let doc = PublishedKeys {
            public_keys: vec![
                PublishedKey {
                    key_identifier: "old".to_string(),
                    key: pem(1),
                    is_current: false,
                },
                PublishedKey {
                    key_identifier: "new".to_string(),
                    key: pem(2),
                    is_current: true,
                },
            ],
        };
        assert_eq!(doc.current().map(|key| key.key_identifier.as_str()), Some("new"));
        let verifier = doc.current_verifier().expect("verifier");
        let expected = SigningKey::from_slice(&[2; 32]).expect("key");
        assert_eq!(verifier.verifying_key(), expected.verifying_key());
    }

    #[test]
    fn missing_current_key_is_an_error() {
        let doc: PublishedKeys = serde_json::from_str(
            r#"{"public_keys":[{"key_identifier":"a","key":"x","is_current":false}]}"#,
        )
        .expect("doc");
        assert!(matches!(
            doc.current_verifier(),
            Err(KeyError::NoCurrentKey)
        ));
    }

    #[tokio::test]
    async fn reads_key_file() {
        let dir = tempfile::tempdir().expect("tmp");
        let path = dir.path().join("key.pem");
        std::fs::write(&path, pem(3)).expect("write");
        read_public_key(&path).await.expect("verifier");

        let err = read_public_key(dir.path().join("absent.pem"))
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Read { .. }));
    }

    #[tokio::test]
    async fn inline_pem_wins_over_other_sources() {
        let auth = AuthConfig {
            public_key_pem: Some(pem(4)),
            public_key_path: Some(PathBuf::from("/nonexistent/key.pem")),
            public_keys_url: Some("http://127.0.0.1:9/unreachable".to_string()),
        };
        let verifier = resolve_verifier(&auth, &reqwest::Client::new())
            .await
            .expect("verifier");
        let expected = SigningKey::from_slice(&[4; 32]).expect("key");
        assert_eq!(verifier.verifying_key(), expected.verifying_key());
    }

    #[tokio::test]
    async fn nothing_configured_is_an_error() {
        let auth = AuthConfig {
            public_key_pem: None,
            public_key_path: None,
            public_keys_url: None,
        };
        let err = resolve_verifier(&auth, &reqwest::Client::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyError::Unconfigured));
    }
}
