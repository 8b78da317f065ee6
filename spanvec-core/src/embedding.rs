//! Embedding vector operations

use crate::{SpanvecError, SpanvecResult, VectorError};
use serde::{Deserialize, Serialize};

/// Embedding vector with dynamic dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingVector {
    /// The embedding data as a vector of f32 values.
    pub data: Vec<f32>,
    /// Identifier of the model that produced this embedding.
    pub model_id: String,
    /// Number of dimensions (must match data.len()).
    pub dimensions: i32,
}

impl EmbeddingVector {
    /// Create a new embedding vector.
    pub fn new(data: Vec<f32>, model_id: impl Into<String>) -> Self {
        let dimensions = data.len() as i32;
        Self {
            data,
            model_id: model_id.into(),
            dimensions,
        }
    }

    /// Compute cosine similarity between two embedding vectors.
    ///
    /// Zero-norm inputs score 0.0 rather than erroring.
    pub fn cosine_similarity(&self, other: &EmbeddingVector) -> SpanvecResult<f32> {
        if self.dimensions != other.dimensions {
            return Err(SpanvecError::Vector(VectorError::DimensionMismatch {
                expected: self.dimensions,
                got: other.dimensions,
            }));
        }

        let (dot, norm_a, norm_b) = self.data.iter().zip(other.data.iter()).fold(
            (0.0f32, 0.0f32, 0.0f32),
            |(dot, na, nb), (a, b)| (dot + a * b, na + a * a, nb + b * b),
        );

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom == 0.0 {
            return Ok(0.0);
        }

        Ok(dot / denom)
    }

    /// Check if this vector has valid dimensions.
    pub fn is_valid(&self) -> bool {
        self.dimensions > 0 && self.data.len() == self.dimensions as usize
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_dimensions() {
        let vec = EmbeddingVector::new(vec![0.0, 1.0, 0.5], "model");
        assert_eq!(vec.dimensions, 3);
        assert_eq!(vec.model_id, "model");
        assert!(vec.is_valid());
    }

    #[test]
    fn test_empty_vector_is_invalid() {
        let vec = EmbeddingVector::new(vec![], "model");
        assert!(!vec.is_valid());
    }

    #[test]
    fn test_cosine_similarity_identical_vectors() {
        let a = EmbeddingVector::new(vec![1.0, 0.0, 0.0], "m");
        let sim = a.cosine_similarity(&a.clone()).unwrap();
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_known_angle() {
        // (1,0) vs (0.96,0.28): 0.28 is chosen so the second vector has unit norm.
        let a = EmbeddingVector::new(vec![1.0, 0.0], "m");
        let b = EmbeddingVector::new(vec![0.96, 0.28], "m");
        let sim = a.cosine_similarity(&b).unwrap();
        assert!((sim - 0.96).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_zero_vector_returns_zero() {
        let a = EmbeddingVector::new(vec![0.0, 0.0], "m");
        let b = EmbeddingVector::new(vec![1.0, 0.0], "m");
        assert_eq!(a.cosine_similarity(&b).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_similarity_dimension_mismatch() {
        let a = EmbeddingVector::new(vec![1.0, 0.0], "m");
        let b = EmbeddingVector::new(vec![1.0, 0.0, 0.0], "m");
        let err = a.cosine_similarity(&b).unwrap_err();
        assert!(matches!(
            err,
            SpanvecError::Vector(VectorError::DimensionMismatch { expected: 2, got: 3 })
        ));
    }

    #[test]
    fn test_cosine_similarity_is_symmetric() {
        let a = EmbeddingVector::new(vec![1.0, 2.0], "m");
        let b = EmbeddingVector::new(vec![3.0, 4.0], "m");
        let ab = a.cosine_similarity(&b).unwrap();
        let ba = b.cosine_similarity(&a).unwrap();
        assert!((ab - ba).abs() < 1e-6);
    }
}
