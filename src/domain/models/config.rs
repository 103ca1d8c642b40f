use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::verification::Severity;

/// Main configuration structure for the micro-loop
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Retry, tunneling, and instruction policy
    #[serde(default)]
    pub loop_policy: LoopPolicyConfig,

    /// Worker polling schedule
    #[serde(default)]
    pub polling: PollingConfig,

    /// Remote worker endpoint
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Isolated test runner
    #[serde(default)]
    pub test_runner: TestRunnerConfig,

    /// Architect review
    #[serde(default)]
    pub reviewer: ReviewerConfig,

    /// Trajectory embedding backend
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Human escalation channel
    #[serde(default)]
    pub escalation: EscalationConfig,

    /// Context slice assembly
    #[serde(default)]
    pub context: ContextConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Transition journal
    #[serde(default)]
    pub journal: JournalConfig,
}

/// Retry ceiling, tunneling detection, and instruction policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoopPolicyConfig {
    /// Entropy score above which a full window counts as tunneling (0-10)
    #[serde(default = "default_tunneling_threshold")]
    pub tunneling_threshold: f64,

    /// Number of trailing snapshots scored
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Cosine similarity above which two snapshots are near-duplicates
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Maximum retry cost a ticket may consume before escalation
    #[serde(default = "default_retry_ceiling")]
    pub retry_ceiling: u32,

    /// Retry cost charged for a tunneling failure
    #[serde(default = "default_tunneling_retry_cost")]
    pub tunneling_retry_cost: u32,

    /// Score the trajectory on every poll that brings a new snapshot
    #[serde(default = "default_true")]
    pub interrupt_on_poll: bool,

    /// Characters of failure evidence quoted back to the worker
    #[serde(default = "default_evidence_excerpt_chars")]
    pub evidence_excerpt_chars: usize,

    /// Constraints sent with every first attempt
    #[serde(default = "default_base_constraints")]
    pub base_constraints: Vec<String>,

    /// Constraints sent with every retry
    #[serde(default = "default_retry_constraints")]
    pub retry_constraints: Vec<String>,
}

const fn default_tunneling_threshold() -> f64 {
    7.0
}

const fn default_window_size() -> usize {
    3
}

const fn default_similarity_threshold() -> f64 {
    0.9
}

const fn default_retry_ceiling() -> u32 {
    3
}

const fn default_tunneling_retry_cost() -> u32 {
    2
}

const fn default_true() -> bool {
    true
}

const fn default_evidence_excerpt_chars() -> usize {
    1000
}

fn default_base_constraints() -> Vec<String> {
    vec![
        "Follow TDD: write a failing test (red) first, then make it pass (green).".to_string(),
        "Only touch files inside the workspace.".to_string(),
    ]
}

fn default_retry_constraints() -> Vec<String> {
    vec!["Analyze the evidence from the previous attempt before changing any code.".to_string()]
}

impl Default for LoopPolicyConfig {
    fn default() -> Self {
        Self {
            tunneling_threshold: default_tunneling_threshold(),
            window_size: default_window_size(),
            similarity_threshold: default_similarity_threshold(),
            retry_ceiling: default_retry_ceiling(),
            tunneling_retry_cost: default_tunneling_retry_cost(),
            interrupt_on_poll: default_true(),
            evidence_excerpt_chars: default_evidence_excerpt_chars(),
            base_constraints: default_base_constraints(),
            retry_constraints: default_retry_constraints(),
        }
    }
}

/// Exponential poll backoff and per-attempt wall-clock ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PollingConfig {
    #[serde(default = "default_initial_interval_ms")]
    pub initial_interval_ms: u64,

    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,

    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Wall-clock ceiling for one attempt
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    /// Consecutive failed polls tolerated before the worker counts as unreachable
    #[serde(default = "default_max_consecutive_poll_errors")]
    pub max_consecutive_poll_errors: u32,
}

const fn default_initial_interval_ms() -> u64 {
    2_000
}

const fn default_max_interval_ms() -> u64 {
    30_000
}

const fn default_multiplier() -> f64 {
    1.5
}

const fn default_attempt_timeout_ms() -> u64 {
    30 * 60 * 1000
}

const fn default_max_consecutive_poll_errors() -> u32 {
    3
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: default_initial_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            multiplier: default_multiplier(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            max_consecutive_poll_errors: default_max_consecutive_poll_errors(),
        }
    }
}

/// Remote worker HTTP endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct WorkerConfig {
    #[serde(default = "default_worker_url")]
    pub base_url: String,

    /// Falls back to `MICROLOOP_WORKER_TOKEN` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_worker_url() -> String {
    "http://127.0.0.1:8700".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            base_url: default_worker_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Test command run inside an isolated copy of the workspace
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TestRunnerConfig {
    #[serde(default = "default_test_program")]
    pub program: String,

    #[serde(default = "default_test_args")]
    pub args: Vec<String>,

    #[serde(default = "default_workspace_root")]
    pub workspace_root: PathBuf,

    /// Directory names skipped when copying the workspace
    #[serde(default = "default_excluded_dirs")]
    pub excluded_dirs: Vec<String>,

    #[serde(default = "default_test_timeout_secs")]
    pub timeout_secs: u64,

    /// Characters of test output kept as evidence
    #[serde(default = "default_output_excerpt_chars")]
    pub output_excerpt_chars: usize,
}

fn default_test_program() -> String {
    "cargo".to_string()
}

fn default_test_args() -> Vec<String> {
    vec!["test".to_string()]
}

fn default_workspace_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_excluded_dirs() -> Vec<String> {
    vec![
        ".git".to_string(),
        "target".to_string(),
        "node_modules".to_string(),
        ".microloop".to_string(),
    ]
}

const fn default_test_timeout_secs() -> u64 {
    600
}

const fn default_output_excerpt_chars() -> usize {
    4000
}

impl Default for TestRunnerConfig {
    fn default() -> Self {
        Self {
            program: default_test_program(),
            args: default_test_args(),
            workspace_root: default_workspace_root(),
            excluded_dirs: default_excluded_dirs(),
            timeout_secs: default_test_timeout_secs(),
            output_excerpt_chars: default_output_excerpt_chars(),
        }
    }
}

/// Governance rule set and approval policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ReviewerConfig {
    #[serde(default = "default_rules_path")]
    pub rules_path: PathBuf,

    /// Violations at or above this severity always reject
    #[serde(default = "default_blocking_severity")]
    pub blocking_severity: Severity,

    /// Minimum quality score for approving with tech debt
    #[serde(default = "default_min_quality_score")]
    pub min_quality_score: f64,
}

fn default_rules_path() -> PathBuf {
    PathBuf::from(".microloop/rules.yaml")
}

const fn default_blocking_severity() -> Severity {
    Severity::Critical
}

const fn default_min_quality_score() -> f64 {
    8.0
}

impl Default for ReviewerConfig {
    fn default() -> Self {
        Self {
            rules_path: default_rules_path(),
            blocking_severity: default_blocking_severity(),
            min_quality_score: default_min_quality_score(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    /// Local feature-hashing embedder
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    #[serde(rename = "openai")]
    OpenAi,
}

/// Trajectory embedding backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    #[serde(default = "default_embedding_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Falls back to `OPENAI_API_KEY` when unset
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_request_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_embedding_dimension() -> usize {
    256
}

fn default_embedding_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            dimension: default_embedding_dimension(),
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            api_key: None,
            timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Human escalation when the worker reports it is blocked
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct EscalationConfig {
    /// When false, a blocked worker is treated as a failed attempt
    #[serde(default)]
    pub human_interrupt: bool,
}

/// Context slice assembly
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ContextConfig {
    #[serde(default = "default_max_file_chars")]
    pub max_file_chars: usize,

    /// Log file whose tail is attached to every dispatch
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default = "default_evidence_excerpt_chars")]
    pub log_tail_chars: usize,
}

const fn default_max_file_chars() -> usize {
    8000
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_file_chars: default_max_file_chars(),
            log_path: None,
            log_tail_chars: default_evidence_excerpt_chars(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    /// Rotation: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// JSON-lines journal of loop transitions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct JournalConfig {
    #[serde(default)]
    pub path: Option<PathBuf>,
}
