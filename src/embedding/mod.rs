//! Embedding client abstraction and the Ollama-backed implementation.
//!
//! The model runtime is constructed once at startup and injected into the
//! document service, so tests substitute a stub without touching process-wide
//! state.

use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use thiserror::Error;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("Failed to generate embeddings: {0}")]
    GenerationFailed(String),
    /// Provider returned a different number of vectors than texts supplied.
    ///
    /// Chunk text is re-paired with its vector by position, so a count
    /// mismatch would silently attach text to the wrong embedding.
    #[error("Embedding count mismatch: sent {sent} texts, received {received} vectors")]
    CountMismatch {
        /// Number of texts in the request.
        sent: usize,
        /// Number of vectors in the response.
        received: usize,
    },
    /// Provider returned a vector of the wrong dimensionality.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index collection was created with.
        expected: usize,
        /// Dimension actually returned.
        actual: usize,
    },
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one embedding vector per supplied text, in input order.
    ///
    /// An empty input yields an empty output without invoking the runtime.
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;
}

/// Embedding client backed by an Ollama runtime.
pub struct OllamaEmbedder {
    runtime: Ollama,
    model: String,
    dimension: usize,
}

impl OllamaEmbedder {
    /// Connect to the runtime at `url` using the given model.
    pub fn new(url: &str, model: &str, dimension: usize) -> Result<Self, EmbeddingClientError> {
        let runtime = Ollama::try_new(url)
            .map_err(|err| EmbeddingClientError::GenerationFailed(err.to_string()))?;
        Ok(Self {
            runtime,
            model: model.to_string(),
            dimension,
        })
    }

    fn verify(&self, sent: usize, embeddings: &[Vec<f32>]) -> Result<(), EmbeddingClientError> {
        if embeddings.len() != sent {
            return Err(EmbeddingClientError::CountMismatch {
                sent,
                received: embeddings.len(),
            });
        }
        for vector in embeddings {
            if vector.len() != self.dimension {
                return Err(EmbeddingClientError::DimensionMismatch {
                    expected: self.dimension,
                    actual: vector.len(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbedder {
    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let sent = texts.len();
        tracing::debug!(model = %self.model, batch = sent, "Generating embeddings");

        let request =
            GenerateEmbeddingsRequest::new(self.model.clone(), EmbeddingsInput::Multiple(texts));
        let response = self
            .runtime
            .generate_embeddings(request)
            .await
            .map_err(|err| EmbeddingClientError::GenerationFailed(err.to_string()))?;

        self.verify(sent, &response.embeddings)?;
        Ok(response.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedDimensionEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl EmbeddingClient for FixedDimensionEmbedder {
        async fn embed_batch(
            &self,
            texts: Vec<String>,
        ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
            Ok(texts
                .into_iter()
                .map(|text| {
                    let mut vector = vec![0.0_f32; self.dimension];
                    vector[0] = text.len() as f32;
                    vector
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn empty_batch_yields_empty_output() {
        let embedder = FixedDimensionEmbedder { dimension: 4 };
        let embeddings = embedder.embed_batch(Vec::new()).await.expect("embed");
        assert!(embeddings.is_empty());
    }

    #[tokio::test]
    async fn output_order_matches_input_order() {
        let embedder = FixedDimensionEmbedder { dimension: 4 };
        let embeddings = embedder
            .embed_batch(vec!["a".into(), "bbb".into()])
            .await
            .expect("embed");
        assert_eq!(embeddings[0][0], 1.0);
        assert_eq!(embeddings[1][0], 3.0);
    }

    #[test]
    fn verify_rejects_count_mismatch() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:11434", "test-model", 3)
            .expect("valid runtime url");
        let err = embedder.verify(2, &[vec![0.0; 3]]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingClientError::CountMismatch {
                sent: 2,
                received: 1
            }
        ));
    }

    #[test]
    fn verify_rejects_dimension_mismatch() {
        let embedder = OllamaEmbedder::new("http://127.0.0.1:11434", "test-model", 3)
            .expect("valid runtime url");
        let err = embedder.verify(1, &[vec![0.0; 5]]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingClientError::DimensionMismatch {
                expected: 3,
                actual: 5
            }
        ));
    }
}
