//! Per-host deadlines across full runs.

use std::time::Duration;

use convoy::core::task::{Registry, Step, Task, TaskStatus};
use convoy::report::Outcome;

use crate::fixtures::{config, runner, runner_with, ScriptedTransport};

fn single(task: Task) -> Registry {
    let mut registry = Registry::new();
    registry.add(task);
    registry
}

#[tokio::test]
async fn deadline_exceeded_marks_host_timed_out() {
    let registry = single(
        Task::new("migrate", "").step(
            Step::run("slow migrate", "jobs").timeout(Duration::from_millis(100)),
        ),
    );
    let (runner, _) = runner(registry, config(&[]));

    let report = runner.run("migrate").await.unwrap();

    assert_eq!(report.results.len(), 1);
    assert!(matches!(
        report.results[0].outcome,
        Outcome::TimedOut { timeout_ms: 100 }
    ));
    assert!(matches!(
        report.task_status("migrate"),
        Some(TaskStatus::Failed { .. })
    ));
    assert_eq!(report.exit_code(), 6);
}

#[tokio::test]
async fn slow_host_times_out_while_others_complete() {
    let registry = single(
        Task::new("fanout", "")
            .step(Step::run("echo hi", "web").timeout(Duration::from_millis(100))),
    );
    let (runner, _) = runner_with(
        registry,
        config(&[]),
        ScriptedTransport::new().slow_host("h2"),
    );

    let report = runner.run("fanout").await.unwrap();

    assert_eq!(report.results.len(), 2);
    let h1 = report.results.iter().find(|r| r.host == "h1").unwrap();
    let h2 = report.results.iter().find(|r| r.host == "h2").unwrap();
    assert!(matches!(h1.outcome, Outcome::Success { .. }));
    assert!(matches!(h2.outcome, Outcome::TimedOut { timeout_ms: 100 }));
    assert!(!report.overall_success());
    assert_eq!(report.exit_code(), 6);
}

#[tokio::test]
async fn generous_deadline_does_not_fire() {
    let registry = single(
        Task::new("quick", "")
            .step(Step::run("echo hi", "jobs").timeout(Duration::from_secs(30))),
    );
    let (runner, _) = runner_with(
        registry,
        config(&[]),
        ScriptedTransport::new().with_delay(Duration::from_millis(10)),
    );

    let report = runner.run("quick").await.unwrap();

    assert!(report.overall_success());
    assert!(matches!(report.results[0].outcome, Outcome::Success { .. }));
}

#[tokio::test]
async fn timed_out_step_halts_later_steps() {
    let registry = single(
        Task::new("two_phase", "")
            .step(Step::run("slow start", "jobs").timeout(Duration::from_millis(100)))
            .step(Step::run("echo after", "jobs")),
    );
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("two_phase").await.unwrap();

    assert!(!transport.commands().contains(&"echo after".to_string()));
    assert!(matches!(
        report.task_status("two_phase"),
        Some(TaskStatus::Failed { .. })
    ));
}

#[tokio::test]
async fn timeout_summary_counts() {
    let registry = single(
        Task::new("fanout", "")
            .step(Step::run("echo hi", "all").timeout(Duration::from_millis(100))),
    );
    let (runner, _) = runner_with(
        registry,
        config(&[]),
        ScriptedTransport::new().slow_host("j1"),
    );

    let report = runner.run("fanout").await.unwrap();

    let summary = report.summary();
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.failed, 0);
}
