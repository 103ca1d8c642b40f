//! Context providers: what the worker sees alongside a ticket.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use crate::adapters::test_runner::command::sandbox_relative_path;
use crate::adapters::test_runner::output_parser::tail_excerpt;
use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{ContextConfig, ContextSlice, FileExcerpt, Ticket};
use crate::domain::ports::ContextProvider;

const SERVICE: &str = "context_provider";

/// Reads a ticket's context files from the workspace plus an optional log tail.
#[derive(Debug, Clone)]
pub struct FsContextProvider {
    workspace_root: PathBuf,
    max_file_chars: usize,
    log_path: Option<PathBuf>,
    log_tail_chars: usize,
}

impl FsContextProvider {
    pub fn new(workspace_root: impl Into<PathBuf>, config: &ContextConfig) -> Self {
        Self {
            workspace_root: workspace_root.into(),
            max_file_chars: config.max_file_chars,
            log_path: config.log_path.clone(),
            log_tail_chars: config.log_tail_chars,
        }
    }

    /// `Ok(None)` when the file does not exist.
    async fn read_optional(path: &Path) -> PortResult<Option<String>> {
        match tokio::fs::read(path).await {
            Ok(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PortError::io(SERVICE, format!("{}: {e}", path.display()))),
        }
    }

    fn excerpt(&self, path: &str, content: String) -> FileExcerpt {
        if content.chars().count() <= self.max_file_chars {
            return FileExcerpt {
                path: path.to_string(),
                content,
                truncated: false,
            };
        }
        FileExcerpt {
            path: path.to_string(),
            content: content.chars().take(self.max_file_chars).collect(),
            truncated: true,
        }
    }
}

#[async_trait]
impl ContextProvider for FsContextProvider {
    async fn slice_for(&self, ticket: &Ticket) -> PortResult<ContextSlice> {
        let mut slice = ContextSlice::default();

        for path in &ticket.context_files {
            let relative = match sandbox_relative_path(path) {
                Ok(relative) => relative,
                Err(reason) => {
                    warn!(ticket_id = %ticket.id, reason = %reason, "skipping context file");
                    continue;
                }
            };
            match Self::read_optional(&self.workspace_root.join(relative)).await? {
                Some(content) => slice.files.push(self.excerpt(path, content)),
                None => warn!(ticket_id = %ticket.id, path = %path, "context file not found"),
            }
        }

        if let Some(log_path) = &self.log_path {
            slice.log_excerpt = Self::read_optional(log_path)
                .await?
                .map(|log| tail_excerpt(&log, self.log_tail_chars));
        }

        Ok(slice)
    }
}

/// Returns the same slice for every ticket.
#[derive(Debug, Clone, Default)]
pub struct StaticContextProvider {
    slice: ContextSlice,
}

impl StaticContextProvider {
    pub const fn new(slice: ContextSlice) -> Self {
        Self { slice }
    }
}

#[async_trait]
impl ContextProvider for StaticContextProvider {
    async fn slice_for(&self, _ticket: &Ticket) -> PortResult<ContextSlice> {
        Ok(self.slice.clone())
    }
}
