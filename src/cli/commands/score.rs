//! `microloop score`: entropy diagnostics for a recorded trajectory.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use super::build_embedder;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{Config, SemanticHealthMetric, TrajectorySnapshot};
use crate::services::{HealthScorerConfig, SemanticHealthScorer};

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Snapshot text files, oldest first
    #[arg(required = true)]
    pub snapshots: Vec<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct ScoreOutput {
    pub embedder: String,
    pub metric: SemanticHealthMetric,
}

impl CommandOutput for ScoreOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![self.metric.summary()];
        for (index, similarity) in self.metric.pairwise_similarity.iter().enumerate() {
            lines.push(format!("  pair {:>2}: similarity {similarity:.3}", index + 1));
        }
        lines.push(if self.metric.is_tunneling {
            "TUNNELING: the worker is repeating itself".to_string()
        } else if self.metric.window_is_full() {
            "healthy".to_string()
        } else {
            format!(
                "healthy (window {}/{} not full, tunneling is never reported)",
                self.metric.window_len, self.metric.window_size
            )
        });
        lines.push(format!("embedder: {}", self.embedder));
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ScoreArgs, config: Config, json_mode: bool) -> Result<ExitCode> {
    let mut trajectory = Vec::with_capacity(args.snapshots.len());
    for (sequence, path) in (1u64..).zip(&args.snapshots) {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
        trajectory.push(TrajectorySnapshot::new(sequence, content));
    }

    let embedder = build_embedder(&config.embedding)?;
    let name = embedder.name().to_string();
    let scorer = SemanticHealthScorer::new(embedder, HealthScorerConfig::from(&config.loop_policy));
    let metric = scorer.score(&trajectory).await?;

    output(
        &ScoreOutput {
            embedder: name,
            metric,
        },
        json_mode,
    );
    Ok(ExitCode::SUCCESS)
}
