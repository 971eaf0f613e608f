//! Step executor: dispatches one rendered command across a host set.
//!
//! Each step gets one worker per target host. In parallel mode every host
//! runs at once; in sequential mode hosts run one after another. Steps
//! within a task are driven sequentially by the runner so dependent shell
//! state (a symlink created before a restart) is ordered correctly.
//!
//! Failures are isolated per host: a timeout or non-zero exit on one host
//! never interrupts commands already in flight on others. Whether the
//! owning task aborts afterwards is the fail-fast policy decided per step.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::core::task::ExecutionMode;
use crate::inventory::Host;
use crate::report::{ExecutionResult, RunReport};
use crate::transport::{CommandSpec, Transport};
use crate::{clog_debug, clog_warn, Error, Result};

/// A step after planning: rendered command, resolved hosts, policies.
#[derive(Debug, Clone)]
pub struct PlannedStep {
    /// Owning task name, recorded on every result.
    pub task: String,
    /// The rendered command with its working directory.
    pub spec: CommandSpec,
    /// Optional rendered per-host test; false skips that host.
    pub precondition: Option<CommandSpec>,
    /// Resolved target hosts, in inventory order.
    pub hosts: Vec<Host>,
    /// Dispatch mode across hosts.
    pub mode: ExecutionMode,
    /// Per-host deadline.
    pub timeout: Option<Duration>,
    /// When true, host failures are recorded but do not abort the task.
    pub continue_on_error: bool,
}

/// Runs planned steps against hosts through a shared transport.
///
/// The executor owns no state of its own beyond the shared handles: the
/// transport, the run-level cancellation token, and the report log all
/// workers append to.
pub struct StepExecutor {
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    report: Arc<Mutex<RunReport>>,
}

impl StepExecutor {
    /// Create an executor sharing the given transport, token, and report.
    pub fn new(
        transport: Arc<dyn Transport>,
        cancel: CancellationToken,
        report: Arc<Mutex<RunReport>>,
    ) -> Self {
        Self {
            transport,
            cancel,
            report,
        }
    }

    /// Execute a planned step on all of its hosts.
    ///
    /// Returns `Ok(true)` when the step failed in a way that must abort
    /// the owning task (a host failure with fail-fast policy), `Ok(false)`
    /// otherwise. Results for every host, including partial results on
    /// abort, are appended to the report as hosts finish.
    pub async fn run_step(&self, step: &PlannedStep) -> Result<bool> {
        clog_debug!(
            "step [{}] on {} host(s) ({:?}): {}",
            step.task,
            step.hosts.len(),
            step.mode,
            step.spec
        );

        let any_failed = match step.mode {
            ExecutionMode::Parallel => self.run_parallel(step).await?,
            ExecutionMode::Sequential => self.run_sequential(step).await?,
        };

        if any_failed && !step.continue_on_error {
            clog_warn!("step [{}] failed, aborting task", step.task);
            return Ok(true);
        }
        Ok(false)
    }

    /// One worker per host, all issued concurrently.
    async fn run_parallel(&self, step: &PlannedStep) -> Result<bool> {
        if self.cancel.is_cancelled() {
            self.record_all_skipped(step, "run cancelled").await;
            return Ok(false);
        }

        let mut workers: JoinSet<bool> = JoinSet::new();
        for host in &step.hosts {
            let transport = Arc::clone(&self.transport);
            let report = Arc::clone(&self.report);
            let host = host.clone();
            let task = step.task.clone();
            let spec = step.spec.clone();
            let precondition = step.precondition.clone();
            let deadline = step.timeout;

            workers.spawn(async move {
                let result =
                    run_host(&*transport, &task, &host, &spec, &precondition, deadline).await;
                let failed = result.outcome.is_failure();
                report.lock().await.record(result);
                failed
            });
        }

        let mut any_failed = false;
        while let Some(joined) = workers.join_next().await {
            let failed = joined.map_err(|e| Error::TaskJoin(e.to_string()))?;
            any_failed |= failed;
        }
        Ok(any_failed)
    }

    /// Hosts one after another. A fail-fast failure or cancellation stops
    /// scheduling; remaining hosts are recorded as skipped.
    async fn run_sequential(&self, step: &PlannedStep) -> Result<bool> {
        let mut any_failed = false;

        for (pos, host) in step.hosts.iter().enumerate() {
            if self.cancel.is_cancelled() {
                self.record_skipped_from(step, pos, "run cancelled").await;
                break;
            }
            if any_failed && !step.continue_on_error {
                self.record_skipped_from(step, pos, "earlier host failed")
                    .await;
                break;
            }

            let result = run_host(
                &*self.transport,
                &step.task,
                host,
                &step.spec,
                &step.precondition,
                step.timeout,
            )
            .await;
            any_failed |= result.outcome.is_failure();
            self.report.lock().await.record(result);
        }

        Ok(any_failed)
    }

    async fn record_all_skipped(&self, step: &PlannedStep, reason: &str) {
        self.record_skipped_from(step, 0, reason).await;
    }

    async fn record_skipped_from(&self, step: &PlannedStep, from: usize, reason: &str) {
        let mut report = self.report.lock().await;
        for host in &step.hosts[from..] {
            report.record(ExecutionResult::skipped(
                &step.task,
                &host.address,
                &step.spec.shell_line(),
                reason,
            ));
        }
    }
}

/// Run one host: precondition test, then the command under its deadline.
///
/// Transport-level errors (the ssh process itself failing to run) are
/// folded into a failed outcome so one broken host never takes down the
/// rest of the step.
async fn run_host(
    transport: &dyn Transport,
    task: &str,
    host: &Host,
    spec: &CommandSpec,
    precondition: &Option<CommandSpec>,
    deadline: Option<Duration>,
) -> ExecutionResult {
    if let Some(predicate) = precondition {
        match transport.test(host, predicate).await {
            Ok(true) => {}
            Ok(false) => {
                return ExecutionResult::skipped(
                    task,
                    &host.address,
                    &spec.shell_line(),
                    &format!("precondition false: {}", predicate),
                );
            }
            Err(e) => {
                return failed_result(task, host, spec, &e.to_string());
            }
        }
    }

    let execution = transport.execute(host, spec);
    let output = match deadline {
        Some(deadline) => match timeout(deadline, execution).await {
            Ok(output) => output,
            Err(_) => {
                return ExecutionResult::timed_out(
                    task,
                    &host.address,
                    &spec.shell_line(),
                    deadline,
                );
            }
        },
        None => execution.await,
    };

    match output {
        Ok(output) => ExecutionResult::from_output(task, &host.address, &spec.shell_line(), &output),
        Err(e) => failed_result(task, host, spec, &e.to_string()),
    }
}

fn failed_result(task: &str, host: &Host, spec: &CommandSpec, error: &str) -> ExecutionResult {
    ExecutionResult::from_output(
        task,
        &host.address,
        &spec.shell_line(),
        &crate::transport::CommandOutput {
            stdout: String::new(),
            stderr: error.to_string(),
            success: false,
            exit_code: -1,
        },
    )
}
