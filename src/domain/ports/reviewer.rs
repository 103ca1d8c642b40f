use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::domain::errors::PortResult;
use crate::domain::models::{ReviewVerdict, RuleSet, Ticket};

/// Architectural review of a candidate's full resulting source.
///
/// `full_source` maps each touched path to its complete content after the
/// patch, so rules that need surrounding code can see it.
#[async_trait]
pub trait Reviewer: Send + Sync {
    fn name(&self) -> &'static str;

    async fn review(
        &self,
        full_source: &BTreeMap<String, String>,
        rules: &RuleSet,
        ticket: &Ticket,
    ) -> PortResult<ReviewVerdict>;
}
