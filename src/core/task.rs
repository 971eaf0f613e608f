//! Task data model for deployment runs.
//!
//! A [`Task`] is a named, orderable unit of deployment work composed of
//! [`Action`]s. Actions are explicit tagged variants evaluated by a single
//! interpreter (the runner), so the full set of reachable execution paths
//! is enumerable and testable instead of hidden in ad hoc branching.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::Config;

/// A boolean condition gating whether a step or invocation runs.
///
/// Guards are predicates over the frozen configuration snapshot and have
/// no side effects. Absent keys evaluate to false.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Guard {
    /// True when the named option is set and truthy.
    Flag { key: String },
    /// Negation of the inner guard.
    Not { inner: Box<Guard> },
    /// True when every inner guard is true. Empty is true.
    All { inner: Vec<Guard> },
}

impl Guard {
    /// Guard on a configuration flag being set.
    pub fn flag(key: &str) -> Self {
        Guard::Flag {
            key: key.to_string(),
        }
    }

    /// Guard on a configuration flag being unset or falsy.
    pub fn not_flag(key: &str) -> Self {
        Guard::Not {
            inner: Box::new(Guard::flag(key)),
        }
    }

    /// Conjunction of guards.
    pub fn all(guards: Vec<Guard>) -> Self {
        Guard::All { inner: guards }
    }

    /// Evaluate this guard against a configuration snapshot.
    pub fn eval(&self, config: &Config) -> bool {
        match self {
            Guard::Flag { key } => config.flag(key),
            Guard::Not { inner } => !inner.eval(config),
            Guard::All { inner } => inner.iter().all(|g| g.eval(config)),
        }
    }

    /// Human-readable form for skip reasons and dry-run output.
    pub fn describe(&self) -> String {
        match self {
            Guard::Flag { key } => key.clone(),
            Guard::Not { inner } => format!("!{}", inner.describe()),
            Guard::All { inner } => inner
                .iter()
                .map(Guard::describe)
                .collect::<Vec<_>>()
                .join(" && "),
        }
    }
}

/// How a step's command is dispatched across its resolved hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// One worker per host, all hosts at once.
    #[default]
    Parallel,
    /// Hosts one after another, stopping early on fail-fast failures.
    Sequential,
}

/// A single command template executed against a role's hosts.
///
/// Immutable once defined. The template and optional `cwd`/`precondition`
/// are rendered against the config snapshot before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Command template with `{key}` placeholders.
    pub template: String,
    /// Role whose hosts this step targets.
    pub role: String,
    /// Optional guard; false means the step is skipped entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guard: Option<Guard>,
    /// Optional per-host test command; false skips just that host.
    /// Supports checks like `[ -e {releases_path}/gunicorn.pid ]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precondition: Option<String>,
    /// Optional working directory template scoped around the command.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Dispatch mode across hosts.
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Per-host deadline. None means no deadline.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,
    /// When true, a host failure does not abort the owning task.
    /// Fail-fast is the default: ordering-sensitive steps (restarts,
    /// symlinks) must not let dependents run against broken state.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Step {
    /// Create a step running `template` on the hosts of `role`.
    pub fn run(template: &str, role: &str) -> Self {
        Self {
            template: template.to_string(),
            role: role.to_string(),
            guard: None,
            precondition: None,
            cwd: None,
            mode: ExecutionMode::default(),
            timeout: None,
            continue_on_error: false,
        }
    }

    /// Gate this step on a guard.
    pub fn when(mut self, guard: Guard) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Require a per-host test command to pass before running.
    pub fn only_if(mut self, predicate: &str) -> Self {
        self.precondition = Some(predicate.to_string());
        self
    }

    /// Scope a working directory around the command.
    pub fn within(mut self, cwd: &str) -> Self {
        self.cwd = Some(cwd.to_string());
        self
    }

    /// Run hosts one after another instead of in parallel.
    pub fn sequential(mut self) -> Self {
        self.mode = ExecutionMode::Sequential;
        self
    }

    /// Apply a per-host deadline.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Record host failures without aborting the owning task.
    pub fn continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// One unit of work inside a task, evaluated in order by the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum Action {
    /// Run a command step against a role's hosts.
    Run(Step),
    /// Invoke another task by name as an immediate synchronous sub-run
    /// sharing the same config snapshot and result log.
    Invoke {
        task: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        guard: Option<Guard>,
    },
}

impl Action {
    /// Invoke another task unconditionally.
    pub fn invoke(task: &str) -> Self {
        Action::Invoke {
            task: task.to_string(),
            guard: None,
        }
    }

    /// Invoke another task when the guard holds.
    pub fn invoke_when(task: &str, guard: Guard) -> Self {
        Action::Invoke {
            task: task.to_string(),
            guard: Some(guard),
        }
    }
}

/// Task status in its lifecycle.
///
/// `Pending -> Running -> {Succeeded, Failed, Skipped}`. `Skipped` means
/// every guarded action evaluated false; `Failed` is terminal and halts
/// unexecuted dependents.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskStatus {
    /// Task ordered but not yet started.
    #[default]
    Pending,
    /// Task steps are executing.
    Running,
    /// All executed steps succeeded.
    Succeeded,
    /// A step failed; dependents are halted.
    Failed {
        /// Error message describing the failure.
        error: String,
    },
    /// No action ran because guards evaluated false.
    Skipped,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed { error } => write!(f, "failed: {}", error),
            TaskStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl TaskStatus {
    /// Whether this is a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed { .. } | TaskStatus::Skipped
        )
    }

    /// Whether dependents may proceed after this state.
    pub fn allows_dependents(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Skipped)
    }
}

/// A named, orderable unit of deployment work.
///
/// Hook relationships (`after`/`before`) reference other tasks by name and
/// are resolved into an explicit dependency graph at startup rather than
/// dynamically at invocation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task name, namespaced like `django:migrate`.
    pub name: String,
    /// One-line description shown by `convoy tasks`.
    pub description: String,
    /// Ordered actions evaluated by the runner.
    pub actions: Vec<Action>,
    /// Tasks this one must run after (anchors precede this task).
    #[serde(default)]
    pub after: Vec<String>,
    /// Tasks this one must run before (this task precedes anchors).
    #[serde(default)]
    pub before: Vec<String>,
}

impl Task {
    /// Create a task with no actions or hooks.
    pub fn new(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            actions: Vec::new(),
            after: Vec::new(),
            before: Vec::new(),
        }
    }

    /// Append an action.
    pub fn action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Append a run step.
    pub fn step(self, step: Step) -> Self {
        self.action(Action::Run(step))
    }

    /// Declare that this task runs after `anchor`.
    pub fn runs_after(mut self, anchor: &str) -> Self {
        self.after.push(anchor.to_string());
        self
    }

    /// Declare that this task runs before `anchor`.
    pub fn runs_before(mut self, anchor: &str) -> Self {
        self.before.push(anchor.to_string());
        self
    }
}

/// The task registry: all tasks defined for a run, in declaration order.
///
/// Declaration order is the determinism tiebreak for independent tasks in
/// the hook graph, so the registry preserves it.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    tasks: Vec<Task>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task. Names must be unique; a duplicate replaces nothing and
    /// panics in debug builds via the assert, surfacing a registry bug.
    pub fn add(&mut self, task: Task) {
        debug_assert!(
            self.get(&task.name).is_none(),
            "duplicate task name: {}",
            task.name
        );
        self.tasks.push(task);
    }

    /// Look up a task by name.
    pub fn get(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Declaration index of a task, used for deterministic tiebreaks.
    pub fn declaration_index(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }

    /// All tasks in declaration order.
    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// Number of registered tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
