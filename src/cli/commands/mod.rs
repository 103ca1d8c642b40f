//! CLI command implementations.

pub mod config;
pub mod run;
pub mod score;

use std::sync::Arc;

use anyhow::Result;

use crate::adapters::embedding::{HashingEmbedder, OpenAiEmbedder};
use crate::domain::models::{EmbeddingConfig, EmbeddingProviderKind};
use crate::domain::ports::TrajectoryEmbedder;

/// Build the trajectory embedder selected in configuration.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn TrajectoryEmbedder>> {
    let embedder: Arc<dyn TrajectoryEmbedder> = match config.provider {
        EmbeddingProviderKind::Hashing => Arc::new(HashingEmbedder::new(config.dimension)),
        EmbeddingProviderKind::OpenAi => Arc::new(OpenAiEmbedder::new(config)?),
    };
    Ok(embedder)
}
