//! Scripted reviewer for tests and dry runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::PortResult;
use crate::domain::models::{ReviewVerdict, RuleSet, Ticket};
use crate::domain::ports::Reviewer;

/// Replays a fixed sequence of verdicts; the last one repeats.
pub struct ScriptedReviewer {
    verdicts: Vec<PortResult<ReviewVerdict>>,
    reviewed: Arc<RwLock<Vec<BTreeMap<String, String>>>>,
}

impl ScriptedReviewer {
    pub fn new(verdicts: Vec<PortResult<ReviewVerdict>>) -> Self {
        Self {
            verdicts,
            reviewed: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Full sources passed to each review, in order.
    pub async fn reviewed_sources(&self) -> Vec<BTreeMap<String, String>> {
        self.reviewed.read().await.clone()
    }

    pub async fn review_count(&self) -> usize {
        self.reviewed.read().await.len()
    }
}

#[async_trait]
impl Reviewer for ScriptedReviewer {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn review(
        &self,
        full_source: &BTreeMap<String, String>,
        _rules: &RuleSet,
        _ticket: &Ticket,
    ) -> PortResult<ReviewVerdict> {
        let mut reviewed = self.reviewed.write().await;
        let index = reviewed.len();
        reviewed.push(full_source.clone());

        self.verdicts
            .get(index)
            .or_else(|| self.verdicts.last())
            .cloned()
            .unwrap_or_else(|| Ok(ReviewVerdict::approved()))
    }
}
