//! Hook ordering and cycle detection across full runs.

use convoy::core::task::{Registry, Step, Task, TaskStatus};
use convoy::Error;

use crate::fixtures::{config, runner};

fn registry(tasks: Vec<Task>) -> Registry {
    let mut registry = Registry::new();
    for task in tasks {
        registry.add(task);
    }
    registry
}

#[tokio::test]
async fn requesting_a_task_runs_its_after_anchor_first() {
    // Task A declared after task B: requesting A triggers B then A.
    let registry = registry(vec![
        Task::new("a", "").step(Step::run("echo a", "web").sequential()).runs_after("b"),
        Task::new("b", "").step(Step::run("echo b", "web").sequential()),
    ]);
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("a").await.unwrap();

    let commands = transport.commands();
    assert_eq!(commands, vec!["echo b", "echo b", "echo a", "echo a"]);
    assert_eq!(report.task_status("a"), Some(&TaskStatus::Succeeded));
    assert_eq!(report.task_status("b"), Some(&TaskStatus::Succeeded));
}

#[tokio::test]
async fn hook_chain_executes_in_constraint_order() {
    let registry = registry(vec![
        Task::new("last", "").step(Step::run("echo last", "jobs")).runs_after("middle"),
        Task::new("middle", "").step(Step::run("echo middle", "jobs")).runs_after("first"),
        Task::new("first", "").step(Step::run("echo first", "jobs")),
    ]);
    let (runner, transport) = runner(registry, config(&[]));

    runner.run("last").await.unwrap();

    assert_eq!(
        transport.commands(),
        vec!["echo first", "echo middle", "echo last"]
    );
}

#[tokio::test]
async fn independent_hooked_tasks_run_in_declaration_order() {
    let registry = registry(vec![
        Task::new("second_declared_first", "")
            .step(Step::run("echo one", "jobs"))
            .runs_before("main"),
        Task::new("third_declared_second", "")
            .step(Step::run("echo two", "jobs"))
            .runs_before("main"),
        Task::new("main", "").step(Step::run("echo main", "jobs")),
    ]);
    let (runner, transport) = runner(registry, config(&[]));

    runner.run("main").await.unwrap();

    assert_eq!(
        transport.commands(),
        vec!["echo one", "echo two", "echo main"]
    );
}

#[tokio::test]
async fn cyclic_hooks_fail_before_any_command() {
    let registry = registry(vec![
        Task::new("a", "").step(Step::run("echo a", "web")).runs_after("b"),
        Task::new("b", "").step(Step::run("echo b", "web")).runs_after("a"),
    ]);
    let (runner, transport) = runner(registry, config(&[]));

    let err = runner.run("a").await.unwrap_err();

    assert!(matches!(err, Error::Cycle(_)));
    assert_eq!(err.exit_code(), 4);
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn failure_in_anchor_halts_dependent_task() {
    let registry = registry(vec![
        Task::new("dependent", "")
            .step(Step::run("echo never", "web"))
            .runs_after("anchor"),
        Task::new("anchor", "").step(Step::run("fail here", "web").sequential()),
    ]);
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("dependent").await.unwrap();

    assert!(!report.overall_success());
    assert!(matches!(
        report.task_status("anchor"),
        Some(TaskStatus::Failed { .. })
    ));
    assert_eq!(report.task_status("dependent"), Some(&TaskStatus::Pending));
    assert!(!transport.commands().iter().any(|c| c.contains("echo never")));
}
