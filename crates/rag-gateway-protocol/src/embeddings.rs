//! Embeddings API request/response types.

use crate::Model;
use serde::{Deserialize, Serialize};

/// Embeddings request body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsRequest {
    pub model: Model,
    pub input: Vec<String>,
}

/// Embeddings response body.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingsResponse {
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub usage: Option<EmbeddingUsage>,
}

impl EmbeddingsResponse {
    /// Return the vectors ordered by their `index` field.
    pub fn into_ordered_vectors(mut self) -> Vec<Vec<f32>> {
        self.data.sort_by_key(|entry| entry.index);
        self.data.into_iter().map(|entry| entry.embedding).collect()
    }
}

/// One embedding in a response, tagged with its input position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

/// Token accounting reported by the embeddings API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbeddingUsage {
    pub prompt_tokens: u64,
    pub total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::EmbeddingsResponse;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn vectors_are_reordered_by_index() {
        let response: EmbeddingsResponse = serde_json::from_value(json!({
            "data": [
                { "embedding": [0.0, 1.0], "index": 1 },
                { "embedding": [1.0, 0.0], "index": 0 }
            ],
            "usage": { "prompt_tokens": 4, "total_tokens": 4 }
        }))
        .expect("decode");
        assert_eq!(
            response.into_ordered_vectors(),
            vec![vec![1.0, 0.0], vec![0.0, 1.0]]
        );
    }
}
