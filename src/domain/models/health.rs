use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repetitiveness of a worker's recent trajectory.
///
/// `score` runs from 0.0 (every step novel) to 10.0 (every step a restatement
/// of the previous one). A metric is computed fresh on every scoring pass and
/// never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHealthMetric {
    pub score: f64,
    pub threshold: f64,
    /// Number of snapshots that were actually scored
    pub window_len: usize,
    /// Configured window size
    pub window_size: usize,
    /// Cosine similarity of each consecutive pair in the window
    pub pairwise_similarity: Vec<f64>,
    pub near_duplicate_pairs: usize,
    /// Share of the window held by each similarity cluster, largest first
    pub cluster_distribution: Vec<f64>,
    pub is_tunneling: bool,
    pub computed_at: DateTime<Utc>,
}

impl SemanticHealthMetric {
    /// Metric for a window too short to say anything.
    pub fn insufficient(window_len: usize, window_size: usize, threshold: f64) -> Self {
        Self {
            score: 0.0,
            threshold,
            window_len,
            window_size,
            pairwise_similarity: Vec::new(),
            near_duplicate_pairs: 0,
            cluster_distribution: if window_len == 0 {
                Vec::new()
            } else {
                vec![1.0]
            },
            is_tunneling: false,
            computed_at: Utc::now(),
        }
    }

    pub fn window_is_full(&self) -> bool {
        self.window_len >= self.window_size
    }

    pub fn summary(&self) -> String {
        format!(
            "entropy score {:.2} (threshold {:.2}) over {} snapshot(s), {} near-duplicate pair(s)",
            self.score, self.threshold, self.window_len, self.near_duplicate_pairs
        )
    }
}
