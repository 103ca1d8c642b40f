//! `microloop run`: drive tickets through the micro-loop.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use futures::future::join_all;
use tracing::{info, warn};

use super::build_embedder;
use crate::adapters::{
    CommandTestRunner, FsContextProvider, HttpWorker, InMemoryBacklog, RuleSetReviewer,
    TracingInterrupt,
};
use crate::application::{LoopCollaborators, TaskRunner};
use crate::cli::output::{output, truncate, CommandOutput};
use crate::domain::models::{Config, TaskOutcome, Ticket, TicketId, TicketStatus};
use crate::infrastructure::config::load_rule_set;
use crate::infrastructure::logging::TransitionJournal;
use crate::services::cancellation_pair;

/// Exit code when every ticket finished but at least one escalated.
const EXIT_FAILED: u8 = 2;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Ticket YAML files; several tickets run concurrently
    #[arg(required = true)]
    pub tickets: Vec<PathBuf>,

    /// Workspace the test runner copies and the context provider reads
    #[arg(short, long)]
    pub workspace: Option<PathBuf>,

    /// YAML map of ticket id to status, used to check dependencies
    #[arg(short, long)]
    pub backlog: Option<PathBuf>,
}

#[derive(Debug, serde::Serialize)]
pub struct TicketRunOutput {
    pub ticket_id: String,
    pub status: String,
    pub dispatch_count: u32,
    pub retries_used: u32,
    pub escalation: Option<String>,
    pub tech_debt: Option<String>,
    pub patched_files: Vec<String>,
    pub error: Option<String>,
}

impl From<&TaskOutcome> for TicketRunOutput {
    fn from(outcome: &TaskOutcome) -> Self {
        Self {
            ticket_id: outcome.ticket_id.to_string(),
            status: outcome.status.as_str().to_string(),
            dispatch_count: outcome.dispatch_count,
            retries_used: outcome.retries_used,
            escalation: outcome.escalation.map(|e| e.as_str().to_string()),
            tech_debt: outcome.tech_debt_tag.as_ref().map(|t| t.note.clone()),
            patched_files: outcome
                .final_patch
                .as_ref()
                .map(|p| p.files.keys().cloned().collect())
                .unwrap_or_default(),
            error: None,
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct RunOutput {
    pub tickets: Vec<TicketRunOutput>,
    pub done: usize,
    pub failed: usize,
    pub errored: usize,
}

impl RunOutput {
    const fn exit_status(&self) -> u8 {
        if self.errored > 0 {
            1
        } else if self.failed > 0 {
            EXIT_FAILED
        } else {
            0
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "{} ticket(s): {} done, {} failed, {} errored\n",
            self.tickets.len(),
            self.done,
            self.failed,
            self.errored
        )];
        lines.push(format!(
            "{:<14} {:<8} {:<9} {:<7} {}",
            "TICKET", "STATUS", "DISPATCH", "RETRY", "DETAIL"
        ));
        lines.push("-".repeat(76));

        for ticket in &self.tickets {
            let detail = ticket
                .error
                .as_deref()
                .or(ticket.tech_debt.as_deref())
                .or(ticket.escalation.as_deref())
                .map_or_else(
                    || format!("{} file(s) patched", ticket.patched_files.len()),
                    |d| truncate(d, 40),
                );
            lines.push(format!(
                "{:<14} {:<8} {:<9} {:<7} {}",
                truncate(&ticket.ticket_id, 14),
                ticket.status,
                ticket.dispatch_count,
                ticket.retries_used,
                detail
            ));
        }

        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

fn read_ticket(path: &Path) -> Result<Ticket> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read ticket {}", path.display()))?;
    serde_yaml::from_str(&raw).with_context(|| format!("Failed to parse ticket {}", path.display()))
}

fn read_backlog(path: &Path) -> Result<InMemoryBacklog> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read backlog {}", path.display()))?;
    let statuses: HashMap<TicketId, TicketStatus> = serde_yaml::from_str(&raw)
        .with_context(|| format!("Failed to parse backlog {}", path.display()))?;
    Ok(InMemoryBacklog::with_statuses(statuses))
}

async fn build_runner(config: &Config, backlog: InMemoryBacklog) -> Result<TaskRunner> {
    let workspace = config.test_runner.workspace_root.clone();
    let rules = load_rule_set(&config.reviewer.rules_path)?;

    let collaborators = LoopCollaborators {
        worker: Arc::new(HttpWorker::new(&config.worker)?),
        test_runner: Arc::new(CommandTestRunner::new(&config.test_runner)),
        reviewer: Arc::new(RuleSetReviewer::new(&config.reviewer)),
        embedder: build_embedder(&config.embedding)?,
        backlog: Arc::new(backlog),
        context: Arc::new(FsContextProvider::new(workspace, &config.context)),
        interrupt: Some(Arc::new(TracingInterrupt::new())),
        rules: Arc::new(rules),
    };

    let mut runner = TaskRunner::new(collaborators, config)?;
    if let Some(path) = &config.journal.path {
        runner = runner.with_journal(TransitionJournal::open(path).await?);
    }
    Ok(runner)
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<ExitCode> {
    if let Some(workspace) = args.workspace {
        config.test_runner.workspace_root = workspace;
    }

    let tickets = args
        .tickets
        .iter()
        .map(|path| read_ticket(path))
        .collect::<Result<Vec<_>>>()?;
    let backlog = match &args.backlog {
        Some(path) => read_backlog(path)?,
        None => InMemoryBacklog::new(),
    };

    let runner = build_runner(&config, backlog).await?;
    let (handle, signal) = cancellation_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling running tickets");
            handle.cancel();
        }
    });

    info!(tickets = tickets.len(), "Starting micro-loop run");
    let ids: Vec<String> = tickets.iter().map(|t| t.id.to_string()).collect();
    let results = join_all(
        tickets
            .into_iter()
            .map(|ticket| runner.run_task(ticket, signal.clone())),
    )
    .await;

    let mut report = RunOutput {
        tickets: Vec::with_capacity(results.len()),
        done: 0,
        failed: 0,
        errored: 0,
    };
    for (id, result) in ids.into_iter().zip(results) {
        match result {
            Ok(outcome) => {
                if outcome.is_done() {
                    report.done += 1;
                } else {
                    report.failed += 1;
                }
                report.tickets.push(TicketRunOutput::from(&outcome));
            }
            Err(err) => {
                report.errored += 1;
                report.tickets.push(TicketRunOutput {
                    ticket_id: id,
                    status: "ERROR".to_string(),
                    dispatch_count: 0,
                    retries_used: 0,
                    escalation: None,
                    tech_debt: None,
                    patched_files: Vec::new(),
                    error: Some(err.to_string()),
                });
            }
        }
    }

    output(&report, json_mode);
    Ok(ExitCode::from(report.exit_status()))
}
