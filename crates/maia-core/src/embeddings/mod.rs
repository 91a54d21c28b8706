//! Embedding Provider Interface
//!
//! Embedding generation is an external collaborator; the core consumes it
//! through the [`EmbeddingProvider`] trait and only requires unit-normalized
//! vectors back. This module also hosts the vector math shared by the
//! indices and a deterministic [`MockEmbedder`] for tests and demos.

use thiserror::Error;
use tokio_util::sync::CancellationToken;

// ============================================================================
// VECTOR MATH
// ============================================================================

/// Dot product of two vectors. Panics are avoided by zipping; extra
/// components of a longer vector are ignored.
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity in [-1, 1]. Returns 0.0 when either vector has zero norm.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a = dot_product(a, a).sqrt();
    let norm_b = dot_product(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Euclidean (L2) distance between two vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum::<f32>()
        .sqrt()
}

/// Normalize a vector to unit length in place. Zero vectors are left as-is.
pub fn normalize(v: &mut [f32]) {
    let norm = dot_product(v, v).sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Embedding error types
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Embedding requested for empty text
    #[error("cannot embed empty text")]
    EmptyText,
    /// Batch embedding requested for an empty batch
    #[error("cannot embed empty batch")]
    EmptyBatch,
    /// Provider-side failure (model, network, ...)
    #[error("embedding provider error: {0}")]
    Provider(String),
    /// Cooperative cancellation detected
    #[error("operation cancelled")]
    Cancelled,
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

/// An embedding generator consumed by the retriever and index writers.
///
/// Implementations must return unit-normalized vectors of a fixed dimension.
/// Generation may be remote, so every call accepts a cancellation token.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text into a unit-normalized vector.
    fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed a batch of texts. The default implementation loops over
    /// [`EmbeddingProvider::embed`], checking cancellation between items.
    fn embed_batch(
        &self,
        texts: &[String],
        cancel: &CancellationToken,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Err(EmbeddingError::EmptyBatch);
        }
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            if cancel.is_cancelled() {
                return Err(EmbeddingError::Cancelled);
            }
            out.push(self.embed(text, cancel)?);
        }
        Ok(out)
    }

    /// Dimension of the produced vectors.
    fn dimension(&self) -> usize;

    /// Release provider resources. Idempotent; default is a no-op.
    fn close(&self) {}
}

// ============================================================================
// MOCK EMBEDDER
// ============================================================================

/// Deterministic embedder for tests and self-contained deployments.
///
/// Each lowercase token is hashed into a bucket with a sign, accumulated,
/// and the result is unit-normalized. Identical text always maps to the
/// identical vector, and texts sharing tokens correlate - enough structure
/// for retrieval pipelines to behave meaningfully without a model.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    /// Create a mock embedder producing vectors of the given dimension.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(128)
    }
}

impl EmbeddingProvider for MockEmbedder {
    fn embed(&self, text: &str, cancel: &CancellationToken) -> Result<Vec<f32>, EmbeddingError> {
        if cancel.is_cancelled() {
            return Err(EmbeddingError::Cancelled);
        }
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        use std::hash::{Hash, Hasher};

        let mut v = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '\'')
            .filter(|t| !t.is_empty())
        {
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimension as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            v[bucket] += sign;
        }
        normalize(&mut v);
        Ok(v)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identity() {
        let v = vec![0.6, 0.8, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_vector() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_euclidean_distance() {
        let a = vec![0.0, 0.0];
        let b = vec![3.0, 4.0];
        assert!((euclidean_distance(&a, &b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        let norm = dot_product(&v, &v).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::new(64);
        let cancel = CancellationToken::new();
        let a = embedder.embed("machine learning rocks", &cancel).unwrap();
        let b = embedder.embed("machine learning rocks", &cancel).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_mock_embedder_unit_norm() {
        let embedder = MockEmbedder::new(64);
        let cancel = CancellationToken::new();
        let v = embedder.embed("some memory text", &cancel).unwrap();
        let norm = dot_product(&v, &v).sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_mock_embedder_token_overlap_correlates() {
        let embedder = MockEmbedder::new(128);
        let cancel = CancellationToken::new();
        let q = embedder.embed("machine learning", &cancel).unwrap();
        let close = embedder
            .embed("machine learning is a field of AI", &cancel)
            .unwrap();
        let far = embedder.embed("cooking pasta al dente", &cancel).unwrap();
        assert!(cosine_similarity(&q, &close) > cosine_similarity(&q, &far));
    }

    #[test]
    fn test_mock_embedder_empty_text() {
        let embedder = MockEmbedder::new(16);
        let cancel = CancellationToken::new();
        assert!(matches!(
            embedder.embed("   ", &cancel),
            Err(EmbeddingError::EmptyText)
        ));
    }

    #[test]
    fn test_embed_batch_empty() {
        let embedder = MockEmbedder::new(16);
        let cancel = CancellationToken::new();
        assert!(matches!(
            embedder.embed_batch(&[], &cancel),
            Err(EmbeddingError::EmptyBatch)
        ));
    }

    #[test]
    fn test_cancelled_embed() {
        let embedder = MockEmbedder::new(16);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            embedder.embed("text", &cancel),
            Err(EmbeddingError::Cancelled)
        ));
    }
}
