//! Error types for the gateway request pipeline.

use crate::corpus::CorpusError;
use crate::documents::{DocumentError, DocumentId};
use crate::orchestrator::relay::RelayError;
use crate::providers::ProviderError;
use crate::selector::SelectionError;
use crate::verifier::SignatureError;
use thiserror::Error;

/// Errors returned while handling a single completion request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The signature was well formed but does not match the payload.
    #[error("invalid payload signature")]
    InvalidSignature,
    /// The signature header could not be decoded.
    #[error("malformed payload signature: {0}")]
    MalformedSignature(#[from] SignatureError),
    /// The verified body is not a chat request.
    #[error("malformed request body: {0}")]
    ClientInput(#[source] serde_json::Error),
    /// The corpus index could not be built.
    #[error("corpus unavailable: {0}")]
    Corpus(#[from] CorpusError),
    /// The query could not be embedded.
    #[error("query embedding failed: {0}")]
    QueryEmbedding(#[source] ProviderError),
    /// Similarity selection failed.
    #[error("selection failed: {0}")]
    Selection(#[from] SelectionError),
    /// The selected document could not be read back.
    #[error("failed to load document {id}: {source}")]
    Document {
        id: DocumentId,
        #[source]
        source: DocumentError,
    },
    /// The downstream completion call failed before streaming started.
    #[error("completion request failed: {0}")]
    Downstream(#[source] ProviderError),
    /// Streaming the downstream response back to the client failed.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Coarse failure category used by the HTTP surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthorized,
    BadRequest,
    Internal,
}

impl GatewayError {
    pub fn kind(&self) -> FailureKind {
        match self {
            GatewayError::InvalidSignature | GatewayError::MalformedSignature(_) => {
                FailureKind::Unauthorized
            }
            GatewayError::ClientInput(_) => FailureKind::BadRequest,
            GatewayError::Corpus(_)
            | GatewayError::QueryEmbedding(_)
            | GatewayError::Selection(_)
            | GatewayError::Document { .. }
            | GatewayError::Downstream(_)
            | GatewayError::Relay(_) => FailureKind::Internal,
        }
    }

    /// Message that is safe to return to the caller.
    ///
    /// Internal failures never expose upstream details.
    pub fn public_message(&self) -> &'static str {
        match self.kind() {
            FailureKind::Unauthorized => "invalid payload signature",
            FailureKind::BadRequest => "malformed request body",
            FailureKind::Internal => "internal server error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn signature_failures_are_unauthorized() {
        assert_eq!(
            GatewayError::InvalidSignature.kind(),
            FailureKind::Unauthorized
        );
        let err = GatewayError::MalformedSignature(SignatureError::Missing);
        assert_eq!(err.kind(), FailureKind::Unauthorized);
        assert_eq!(err.public_message(), "invalid payload signature");
    }

    #[test]
    fn internal_failures_hide_details() {
        let err = GatewayError::Downstream(ProviderError::Status {
            status: 502,
            body: "secret upstream detail".to_string(),
        });
        assert_eq!(err.kind(), FailureKind::Internal);
        assert_eq!(err.public_message(), "internal server error");
    }

    #[test]
    fn bad_json_is_client_input() {
        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = GatewayError::ClientInput(parse);
        assert_eq!(err.kind(), FailureKind::BadRequest);
    }
}
