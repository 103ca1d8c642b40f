//! Test runner that executes a command inside a throwaway copy of the workspace.
//!
//! The live workspace is never written to: every run copies it into a fresh
//! temporary directory, overlays the candidate's files, and runs the
//! configured command there.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

use super::output_parser::{parse_output, tail_excerpt};
use crate::domain::errors::{PortError, PortResult};
use crate::domain::models::{CandidatePatch, TestEvidence, TestOutcome, TestRunnerConfig};
use crate::domain::ports::TestRunner;

const SERVICE: &str = "test_runner";

/// Runs `program args...` against a sandboxed workspace copy.
#[derive(Debug, Clone)]
pub struct CommandTestRunner {
    config: TestRunnerConfig,
}

impl CommandTestRunner {
    pub fn new(config: &TestRunnerConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn unusable(&self, digest: &str, reason: String) -> TestOutcome {
        warn!(reason = %reason, "test run produced no usable result");
        TestOutcome::failing(
            digest,
            TestEvidence {
                output_excerpt: tail_excerpt(&reason, self.config.output_excerpt_chars),
                ..Default::default()
            },
        )
    }
}

/// Validate a patch path: relative, non-empty, and never escaping the root.
pub fn sandbox_relative_path(path: &str) -> Result<PathBuf, String> {
    let candidate = Path::new(path);
    if path.trim().is_empty() {
        return Err("patch contains an empty file path".to_string());
    }
    let mut clean = PathBuf::new();
    for component in candidate.components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(format!("patch path escapes the workspace: {path}"));
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(format!("patch path names no file: {path}"));
    }
    Ok(clean)
}

fn is_excluded(entry: &DirEntry, excluded: &[String]) -> bool {
    entry.depth() > 0
        && entry.file_type().is_dir()
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| excluded.iter().any(|e| e == name))
}

/// Copy `root` (minus excluded directories) into a new temp dir and overlay `files`.
fn stage_workspace(
    root: &Path,
    excluded: &[String],
    files: &BTreeMap<PathBuf, String>,
) -> io::Result<TempDir> {
    let sandbox = tempfile::Builder::new().prefix("microloop-qa-").tempdir()?;

    for entry in WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| !is_excluded(e, excluded))
    {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = sandbox.path().join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else if entry.file_type().is_file() {
            fs::copy(entry.path(), &target)?;
        }
    }

    for (relative, content) in files {
        let target = sandbox.path().join(relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(target, content)?;
    }

    Ok(sandbox)
}

#[async_trait]
impl TestRunner for CommandTestRunner {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn run_suite(&self, patch: &CandidatePatch) -> PortResult<TestOutcome> {
        let digest = patch.digest();

        let mut files = BTreeMap::new();
        for (path, content) in &patch.files {
            match sandbox_relative_path(path) {
                Ok(clean) => {
                    files.insert(clean, content.clone());
                }
                Err(reason) => return Ok(self.unusable(&digest, reason)),
            }
        }

        let root = self.config.workspace_root.clone();
        let excluded = self.config.excluded_dirs.clone();
        let sandbox = tokio::task::spawn_blocking(move || stage_workspace(&root, &excluded, &files))
            .await
            .map_err(|e| PortError::io(SERVICE, format!("staging task failed: {e}")))?
            .map_err(|e| PortError::io(SERVICE, format!("failed to stage workspace: {e}")))?;

        info!(
            program = %self.config.program,
            sandbox = %sandbox.path().display(),
            patch_digest = %digest,
            "Running test suite"
        );

        let child = Command::new(&self.config.program)
            .args(&self.config.args)
            .current_dir(sandbox.path())
            .kill_on_drop(true)
            .output();

        let output = match tokio::time::timeout(self.timeout(), child).await {
            Ok(result) => result.map_err(|e| {
                PortError::unreachable(SERVICE, format!("failed to spawn {}: {e}", self.config.program))
            })?,
            Err(_) => {
                return Ok(self
                    .unusable(
                        &digest,
                        format!("test suite timed out after {}s", self.config.timeout_secs),
                    )
                    .with_timeout());
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let parsed = parse_output(&stdout, &stderr);
        let passed = output.status.success() && parsed.failed == 0;

        let excerpt = tail_excerpt(
            &format!("{stdout}\n{stderr}"),
            self.config.output_excerpt_chars,
        );
        debug!(exit_code = ?output.status.code(), "test command finished");
        info!(
            passed,
            passed_count = parsed.passed,
            failed_count = parsed.failed,
            "Test suite complete"
        );

        let evidence = parsed.into_evidence(excerpt, output.status.code());
        Ok(if passed {
            TestOutcome::passing(digest, evidence)
        } else {
            TestOutcome::failing(digest, evidence)
        })
    }
}
