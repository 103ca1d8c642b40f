//! Local feature-hashing embedder.
//!
//! Lower-cased word unigrams and bigrams are hashed with blake3 into a fixed
//! number of buckets, signed by one hash bit, and the result is L2-normalized.
//! Identical text always yields the identical vector, and texts sharing most
//! of their words land close together, which is all trajectory scoring needs.

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::ports::TrajectoryEmbedder;

#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn add_feature(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&bytes[..8]);
        let bucket = u64::from_le_bytes(index_bytes) % self.dimension as u64;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        #[allow(clippy::cast_possible_truncation)]
        let bucket = bucket as usize;
        vector[bucket] += sign * weight;
    }

    /// Embed one text synchronously.
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];
        let tokens: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect();

        for token in &tokens {
            self.add_feature(&mut vector, token, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut vector, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        let magnitude = vector
            .iter()
            .map(|x| f64::from(*x) * f64::from(*x))
            .sum::<f64>()
            .sqrt();
        if magnitude > 1e-10 {
            #[allow(clippy::cast_possible_truncation)]
            let magnitude = magnitude as f32;
            for value in &mut vector {
                *value /= magnitude;
            }
        }
        vector
    }
}

#[async_trait]
impl TrajectoryEmbedder for HashingEmbedder {
    fn name(&self) -> &'static str {
        "hashing"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::cosine_similarity;
    use proptest::prelude::*;

    #[test]
    fn test_identical_text_is_identical_vector() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder.embed_text("retrying cargo build after editing lexer.rs");
        let b = embedder.embed_text("retrying cargo build after editing lexer.rs");
        assert_eq!(a, b);
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unrelated_text_is_far_apart() {
        let embedder = HashingEmbedder::new(256);
        let a = embedder.embed_text("reading the parser module to understand tokens");
        let b = embedder.embed_text("writing migration for user accounts table");
        assert!(cosine_similarity(&a, &b) < 0.5);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        assert!(embedder.embed_text("").iter().all(|v| *v == 0.0));
    }

    #[tokio::test]
    async fn test_batch_preserves_order() {
        let embedder = HashingEmbedder::new(32);
        let texts = vec!["alpha beta".to_string(), "gamma delta".to_string()];
        let batch = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batch[0], embedder.embed_text("alpha beta"));
        assert_eq!(batch[1], embedder.embed_text("gamma delta"));
    }

    proptest! {
        #[test]
        fn proptest_non_empty_text_is_unit_length(text in "[a-z]{1,12}( [a-z]{1,12}){0,20}") {
            let embedder = HashingEmbedder::new(64);
            let vector = embedder.embed_text(&text);
            prop_assert_eq!(vector.len(), 64);
            let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
            prop_assert!(norm == 0.0 || (norm - 1.0).abs() < 1e-4, "norm was {}", norm);
        }
    }
}
