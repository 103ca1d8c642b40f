//! Semantic health scoring for worker trajectories.
//!
//! A worker that is "tunneling" keeps restating the same action with minor
//! variations. The scorer embeds the trailing window of snapshots and measures
//! how similar each step is to the one before it.
//!
//! ## Scoring
//!
//! For each consecutive pair in the window, cosine similarity `s` contributes
//! `s` when the pair is a near-duplicate (`s > similarity_threshold`) and `s / 2`
//! otherwise. The score is `10 × mean(contribution)`, so a run of restatements
//! scores near 10 while a trajectory of distinct steps stays low. A window only
//! counts as tunneling once it is full and the score exceeds the threshold.
//!
//! Snapshots are also greedily clustered by similarity; the cluster distribution
//! is reported alongside the score as a diagnostic.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{LoopPolicyConfig, SemanticHealthMetric, TrajectorySnapshot};
use crate::domain::ports::TrajectoryEmbedder;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthScorerConfig {
    pub window_size: usize,
    pub similarity_threshold: f64,
    pub tunneling_threshold: f64,
}

impl Default for HealthScorerConfig {
    fn default() -> Self {
        Self::from(&LoopPolicyConfig::default())
    }
}

impl From<&LoopPolicyConfig> for HealthScorerConfig {
    fn from(policy: &LoopPolicyConfig) -> Self {
        Self {
            window_size: policy.window_size,
            similarity_threshold: policy.similarity_threshold,
            tunneling_threshold: policy.tunneling_threshold,
        }
    }
}

// ---------------------------------------------------------------------------
// SemanticHealthScorer
// ---------------------------------------------------------------------------

pub struct SemanticHealthScorer {
    embedder: Arc<dyn TrajectoryEmbedder>,
    config: HealthScorerConfig,
}

impl SemanticHealthScorer {
    pub fn new(embedder: Arc<dyn TrajectoryEmbedder>, config: HealthScorerConfig) -> Self {
        Self { embedder, config }
    }

    pub const fn config(&self) -> &HealthScorerConfig {
        &self.config
    }

    /// Score the trailing window of a trajectory.
    pub async fn score(&self, trajectory: &[TrajectorySnapshot]) -> PortResult<SemanticHealthMetric> {
        let start = trajectory.len().saturating_sub(self.config.window_size);
        let window = &trajectory[start..];

        if window.len() < 2 {
            return Ok(SemanticHealthMetric::insufficient(
                window.len(),
                self.config.window_size,
                self.config.tunneling_threshold,
            ));
        }

        let texts: Vec<String> = window.iter().map(|s| s.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;
        if embeddings.len() != texts.len() {
            return Err(PortError::invalid_response(
                self.embedder.name(),
                format!(
                    "expected {} embeddings, received {}",
                    texts.len(),
                    embeddings.len()
                ),
            ));
        }

        let metric = score_embeddings(&embeddings, &self.config);
        tracing::debug!(
            embedder = self.embedder.name(),
            score = metric.score,
            window_len = metric.window_len,
            near_duplicates = metric.near_duplicate_pairs,
            is_tunneling = metric.is_tunneling,
            "Scored trajectory window"
        );
        Ok(metric)
    }
}

/// Score an already-embedded window, oldest first.
pub fn score_embeddings(embeddings: &[Vec<f32>], config: &HealthScorerConfig) -> SemanticHealthMetric {
    if embeddings.len() < 2 {
        return SemanticHealthMetric::insufficient(
            embeddings.len(),
            config.window_size,
            config.tunneling_threshold,
        );
    }

    let pairwise_similarity: Vec<f64> = embeddings
        .windows(2)
        .map(|pair| cosine_similarity(&pair[0], &pair[1]).max(0.0))
        .collect();

    let near_duplicate_pairs = pairwise_similarity
        .iter()
        .filter(|&&s| s > config.similarity_threshold)
        .count();

    let contribution_sum: f64 = pairwise_similarity
        .iter()
        .map(|&s| pair_contribution(s, config.similarity_threshold))
        .sum();
    #[allow(clippy::cast_precision_loss)]
    let mean = contribution_sum / pairwise_similarity.len() as f64;
    let score = (mean * 10.0).clamp(0.0, 10.0);

    let window_len = embeddings.len();
    let is_tunneling = window_len >= config.window_size && score > config.tunneling_threshold;

    SemanticHealthMetric {
        score,
        threshold: config.tunneling_threshold,
        window_len,
        window_size: config.window_size,
        pairwise_similarity,
        near_duplicate_pairs,
        cluster_distribution: cluster_distribution(embeddings, config.similarity_threshold),
        is_tunneling,
        computed_at: Utc::now(),
    }
}

fn pair_contribution(similarity: f64, threshold: f64) -> f64 {
    if similarity > threshold {
        similarity
    } else {
        similarity * 0.5
    }
}

/// Greedy clustering: each embedding joins the first cluster whose
/// representative it is a near-duplicate of, or starts a new one.
fn cluster_distribution(embeddings: &[Vec<f32>], threshold: f64) -> Vec<f64> {
    let mut representatives: Vec<&[f32]> = Vec::new();
    let mut counts: Vec<usize> = Vec::new();

    for embedding in embeddings {
        let existing = representatives
            .iter()
            .position(|rep| cosine_similarity(rep, embedding) > threshold);
        match existing {
            Some(idx) => counts[idx] += 1,
            None => {
                representatives.push(embedding);
                counts.push(1);
            }
        }
    }

    counts.sort_unstable_by(|a, b| b.cmp(a));
    #[allow(clippy::cast_precision_loss)]
    let total = embeddings.len() as f64;
    #[allow(clippy::cast_precision_loss)]
    counts.into_iter().map(|c| c as f64 / total).collect()
}

/// Calculate cosine similarity between two embedding vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum();
    let norm_a: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
