//! Embedding port used to compare trajectory snapshots semantically.

use async_trait::async_trait;

use crate::domain::errors::PortResult;

/// Converts snapshot text into dense vectors.
#[async_trait]
pub trait TrajectoryEmbedder: Send + Sync {
    /// Provider name (e.g., "hashing", "openai").
    fn name(&self) -> &'static str;

    /// Embedding dimension for this provider/model.
    fn dimension(&self) -> usize;

    /// Embed every text, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> PortResult<Vec<Vec<f32>>>;
}
