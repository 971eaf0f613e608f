//! Run reporting: per (task, host) outcomes collected for one run.
//!
//! The report is the single shared resource of a run. All step workers
//! append to it through a mutex held by the runner, so entries arrive in a
//! consistent order even when hosts complete concurrently. Results exist
//! for the run's reporting phase and are discarded afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::task::TaskStatus;
use crate::transport::CommandOutput;

/// Unique identifier for one deployment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Create a new unique run identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Outcome of one command on one host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum Outcome {
    /// Command exited zero.
    Success {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// Command exited non-zero.
    Failed {
        exit_code: i32,
        stdout: String,
        stderr: String,
    },
    /// Host exceeded the step deadline.
    TimedOut {
        /// The deadline that was exceeded, in milliseconds.
        timeout_ms: u64,
    },
    /// No command was sent (guard false, precondition false, cancelled,
    /// or an earlier fail-fast failure).
    Skipped {
        /// Why the command was not sent.
        reason: String,
    },
}

impl Outcome {
    /// Whether this outcome counts against the run.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed { .. } | Outcome::TimedOut { .. })
    }
}

/// Per (task, host) result of one executed (or skipped) command.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// The task the step belongs to.
    pub task: String,
    /// The host the command targeted.
    pub host: String,
    /// The rendered shell line.
    pub command: String,
    /// What happened.
    pub outcome: Outcome,
    /// When the outcome was recorded.
    pub finished_at: DateTime<Utc>,
}

impl ExecutionResult {
    fn new(task: &str, host: &str, command: &str, outcome: Outcome) -> Self {
        Self {
            task: task.to_string(),
            host: host.to_string(),
            command: command.to_string(),
            outcome,
            finished_at: Utc::now(),
        }
    }

    /// Result from a completed command, success or failure per exit code.
    pub fn from_output(task: &str, host: &str, command: &str, output: &CommandOutput) -> Self {
        let outcome = if output.success {
            Outcome::Success {
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            }
        } else {
            Outcome::Failed {
                exit_code: output.exit_code,
                stdout: output.stdout.clone(),
                stderr: output.stderr.clone(),
            }
        };
        Self::new(task, host, command, outcome)
    }

    /// Result for a host that exceeded the step deadline.
    pub fn timed_out(task: &str, host: &str, command: &str, timeout: std::time::Duration) -> Self {
        Self::new(
            task,
            host,
            command,
            Outcome::TimedOut {
                timeout_ms: timeout.as_millis() as u64,
            },
        )
    }

    /// Result for a command that was never sent.
    pub fn skipped(task: &str, host: &str, command: &str, reason: &str) -> Self {
        Self::new(
            task,
            host,
            command,
            Outcome::Skipped {
                reason: reason.to_string(),
            },
        )
    }
}

/// Aggregate counts over a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub succeeded: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub skipped: usize,
}

/// All outcomes of one deployment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    /// Unique identifier for this run.
    pub run_id: RunId,
    /// The task that was requested.
    pub requested_task: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// Final status per task, in execution order.
    pub task_statuses: Vec<(String, TaskStatus)>,
    /// Per (task, host) results, in completion order.
    pub results: Vec<ExecutionResult>,
}

impl RunReport {
    /// Create an empty report for a requested task.
    pub fn new(requested_task: &str) -> Self {
        Self {
            run_id: RunId::new(),
            requested_task: requested_task.to_string(),
            started_at: Utc::now(),
            task_statuses: Vec::new(),
            results: Vec::new(),
        }
    }

    /// Append a result. Single writer at a time; callers serialize access.
    pub fn record(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    /// Record or update a task's final status.
    pub fn set_task_status(&mut self, task: &str, status: TaskStatus) {
        if let Some(entry) = self.task_statuses.iter_mut().find(|(name, _)| name == task) {
            entry.1 = status;
        } else {
            self.task_statuses.push((task.to_string(), status));
        }
    }

    /// Status of a task, if recorded.
    pub fn task_status(&self, task: &str) -> Option<&TaskStatus> {
        self.task_statuses
            .iter()
            .find(|(name, _)| name == task)
            .map(|(_, status)| status)
    }

    /// Results for one task, in completion order.
    pub fn results_for_task(&self, task: &str) -> Vec<&ExecutionResult> {
        self.results.iter().filter(|r| r.task == task).collect()
    }

    /// Aggregate counts over all results.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for result in &self.results {
            match result.outcome {
                Outcome::Success { .. } => summary.succeeded += 1,
                Outcome::Failed { .. } => summary.failed += 1,
                Outcome::TimedOut { .. } => summary.timed_out += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    /// Whether every required step succeeded.
    pub fn overall_success(&self) -> bool {
        !self.results.iter().any(|r| r.outcome.is_failure())
            && !self
                .task_statuses
                .iter()
                .any(|(_, status)| matches!(status, TaskStatus::Failed { .. }))
    }

    /// Process exit code for this run: 0 on full success, otherwise the
    /// code of the first failure kind encountered.
    pub fn exit_code(&self) -> i32 {
        if self.overall_success() {
            return 0;
        }
        for result in &self.results {
            match result.outcome {
                Outcome::Failed { .. } => return 5,
                Outcome::TimedOut { .. } => return 6,
                _ => {}
            }
        }
        1
    }
}
