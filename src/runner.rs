//! Task graph runner: plans and drives a deployment run.
//!
//! A run has two phases. The *plan* phase orders the requested task with
//! its hook closure, evaluates guards, renders every reachable command,
//! resolves hosts, and expands nested invocations. All configuration
//! errors (missing keys, empty roles, hook or invoke cycles) surface here,
//! with nothing executed. The *execute* phase then drives the planned
//! steps through the [`StepExecutor`], sequentially per task, recording
//! every outcome in the [`RunReport`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::core::graph::TaskGraph;
use crate::core::task::{Action, Registry, Step, TaskStatus};
use crate::executor::{PlannedStep, StepExecutor};
use crate::inventory::{Host, Inventory};
use crate::report::{ExecutionResult, RunReport};
use crate::template::render;
use crate::transport::{CommandSpec, Transport};
use crate::{clog, clog_debug, Error, Result};

/// One unit of the execution plan, in run order.
#[derive(Debug, Clone)]
enum PlanUnit {
    /// A task (or invoked sub-task) starts here.
    Begin { task: String },
    /// A rendered step ready for the executor.
    Step(PlannedStep),
    /// A step or invocation that will not run; recorded, never sent.
    Skip {
        task: String,
        command: String,
        reason: String,
    },
    /// The task that began last ends here.
    End { task: String },
}

/// Per-task tallies used to derive the final status.
#[derive(Debug, Default)]
struct TaskTally {
    executed: usize,
    skipped: usize,
}

/// Orders, plans, and executes deployment tasks.
pub struct Runner {
    registry: Registry,
    config: Config,
    inventory: Inventory,
    transport: Arc<dyn Transport>,
    cancel: CancellationToken,
    dry_run: bool,
    role_filter: Option<String>,
}

impl Runner {
    /// Create a runner over a registry, config snapshot, and inventory.
    pub fn new(
        registry: Registry,
        config: Config,
        inventory: Inventory,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            registry,
            config,
            inventory,
            transport,
            cancel: CancellationToken::new(),
            dry_run: false,
            role_filter: None,
        }
    }

    /// Plan only: record every step as skipped instead of executing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Narrow execution to hosts belonging to the given role.
    pub fn role_filter(mut self, role: Option<String>) -> Self {
        self.role_filter = role;
        self
    }

    /// Token cancelling this run. Checked between steps and between hosts
    /// of a sequential step; in-flight commands finish best-effort.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the requested task together with its hook closure.
    ///
    /// # Errors
    ///
    /// Plan-phase errors ([`Error::Cycle`], [`Error::Render`],
    /// [`Error::UnknownRole`], [`Error::UnknownTask`]) are returned with
    /// nothing executed. Execution failures are reported through the
    /// returned [`RunReport`], not as an `Err`.
    pub async fn run(&self, task_name: &str) -> Result<RunReport> {
        let graph = TaskGraph::build(&self.registry)?;
        graph.validate()?;
        let order = graph.execution_order(task_name)?;
        clog!("run {}: order {:?}", task_name, order);

        let mut units = Vec::new();
        let mut stack = Vec::new();
        for name in &order {
            self.plan_task(name, &mut stack, &mut units)?;
        }

        let mut report = RunReport::new(task_name);
        for name in &order {
            report.set_task_status(name, TaskStatus::Pending);
        }

        if self.dry_run {
            self.record_dry_run(&units, &mut report);
            return Ok(report);
        }

        self.execute(&units, report).await
    }

    /// Expand one task into plan units, recursing through invocations.
    fn plan_task(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        units: &mut Vec<PlanUnit>,
    ) -> Result<()> {
        if stack.iter().any(|s| s == name) {
            let mut cycle: Vec<&str> = stack.iter().map(String::as_str).collect();
            cycle.push(name);
            return Err(Error::Cycle(cycle.join(" -> ")));
        }

        let task = self
            .registry
            .get(name)
            .ok_or_else(|| Error::UnknownTask(name.to_string()))?;

        stack.push(name.to_string());
        units.push(PlanUnit::Begin {
            task: name.to_string(),
        });

        for action in &task.actions {
            match action {
                Action::Run(step) => {
                    if let Some(guard) = &step.guard {
                        if !guard.eval(&self.config) {
                            units.push(PlanUnit::Skip {
                                task: name.to_string(),
                                command: step.template.clone(),
                                reason: format!("guard false: {}", guard.describe()),
                            });
                            continue;
                        }
                    }
                    units.push(PlanUnit::Step(self.plan_step(name, step)?));
                }
                Action::Invoke { task: target, guard } => {
                    if let Some(guard) = guard {
                        if !guard.eval(&self.config) {
                            units.push(PlanUnit::Skip {
                                task: name.to_string(),
                                command: format!("invoke {}", target),
                                reason: format!("guard false: {}", guard.describe()),
                            });
                            continue;
                        }
                    }
                    self.plan_task(target, stack, units)?;
                }
            }
        }

        units.push(PlanUnit::End {
            task: name.to_string(),
        });
        stack.pop();
        Ok(())
    }

    /// Render one step and resolve its hosts.
    fn plan_step(&self, task: &str, step: &Step) -> Result<PlannedStep> {
        let command = render(&step.template, &self.config)?;
        let mut spec = CommandSpec::new(&command);
        if let Some(cwd) = &step.cwd {
            spec = spec.within(&render(cwd, &self.config)?);
        }

        let precondition = match &step.precondition {
            Some(predicate) => Some(CommandSpec::new(&render(predicate, &self.config)?)),
            None => None,
        };

        let hosts = self.resolve_hosts(&step.role)?;
        clog_debug!(
            "planned [{}] on {} host(s): {}",
            task,
            hosts.len(),
            spec
        );

        Ok(PlannedStep {
            task: task.to_string(),
            spec,
            precondition,
            hosts,
            mode: step.mode,
            timeout: step.timeout,
            continue_on_error: step.continue_on_error,
        })
    }

    /// Resolve a role to hosts, applying the run's role filter.
    ///
    /// An empty role is a configuration error; an empty intersection with
    /// an explicit `--role` filter is a deliberate narrowing and yields an
    /// empty host set instead.
    fn resolve_hosts(&self, role: &str) -> Result<Vec<Host>> {
        let mut hosts = self.inventory.require_role(role)?;
        if let Some(filter) = &self.role_filter {
            hosts.retain(|h| h.has_role(filter));
        }
        Ok(hosts)
    }

    /// Record the whole plan as skipped results without touching the
    /// transport.
    fn record_dry_run(&self, units: &[PlanUnit], report: &mut RunReport) {
        for unit in units {
            match unit {
                PlanUnit::Begin { task } => {
                    report.set_task_status(task, TaskStatus::Skipped);
                }
                PlanUnit::Step(step) => {
                    if step.hosts.is_empty() {
                        report.record(ExecutionResult::skipped(
                            &step.task,
                            "*",
                            &step.spec.shell_line(),
                            "dry run (no hosts match role filter)",
                        ));
                    }
                    for host in &step.hosts {
                        report.record(ExecutionResult::skipped(
                            &step.task,
                            &host.address,
                            &step.spec.shell_line(),
                            "dry run",
                        ));
                    }
                }
                PlanUnit::Skip {
                    task,
                    command,
                    reason,
                } => {
                    report.record(ExecutionResult::skipped(task, "*", command, reason));
                }
                PlanUnit::End { .. } => {}
            }
        }
    }

    /// Drive the planned units through the step executor.
    async fn execute(&self, units: &[PlanUnit], report: RunReport) -> Result<RunReport> {
        let report = Arc::new(Mutex::new(report));
        let executor = StepExecutor::new(
            Arc::clone(&self.transport),
            self.cancel.clone(),
            Arc::clone(&report),
        );

        let mut tallies: HashMap<String, TaskTally> = HashMap::new();
        let mut open: Vec<String> = Vec::new();
        let mut halt: Option<String> = None;

        for unit in units {
            if halt.is_some() {
                break;
            }
            match unit {
                PlanUnit::Begin { task } => {
                    report
                        .lock()
                        .await
                        .set_task_status(task, TaskStatus::Running);
                    tallies.entry(task.clone()).or_default();
                    open.push(task.clone());
                }
                PlanUnit::Step(step) => {
                    if self.cancel.is_cancelled() {
                        halt = Some("run cancelled".to_string());
                        break;
                    }
                    let aborted = executor.run_step(step).await?;
                    tallies.entry(step.task.clone()).or_default().executed += 1;
                    if aborted {
                        halt = Some(format!("step failed in {}", step.task));
                    }
                }
                PlanUnit::Skip {
                    task,
                    command,
                    reason,
                } => {
                    report
                        .lock()
                        .await
                        .record(ExecutionResult::skipped(task, "*", command, reason));
                    tallies.entry(task.clone()).or_default().skipped += 1;
                }
                PlanUnit::End { task } => {
                    open.pop();
                    let tally = tallies.entry(task.clone()).or_default();
                    let status = if tally.executed > 0 || tally.skipped == 0 {
                        TaskStatus::Succeeded
                    } else {
                        TaskStatus::Skipped
                    };
                    report.lock().await.set_task_status(task, status);
                }
            }
        }

        // A failure or cancellation leaves the tasks still open at that
        // point failed; everything after them stays Pending (halted).
        if let Some(reason) = halt {
            clog!("run halted: {}", reason);
            let mut report = report.lock().await;
            for task in open.iter().rev() {
                report.set_task_status(
                    task,
                    TaskStatus::Failed {
                        error: reason.clone(),
                    },
                );
            }
        }

        // The executor holds the only other handle to the report.
        drop(executor);
        let report = Arc::try_unwrap(report)
            .map_err(|_| Error::Validation("report still shared after run".to_string()))?
            .into_inner();
        Ok(report)
    }
}
