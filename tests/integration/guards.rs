//! Guard and precondition behavior over full runs.

use convoy::config::Value;
use convoy::core::task::{Action, Guard, Registry, Step, Task, TaskStatus};
use convoy::report::Outcome;

use crate::fixtures::{config, runner, runner_with, ScriptedTransport};

fn single(task: Task) -> Registry {
    let mut registry = Registry::new();
    registry.add(task);
    registry
}

#[tokio::test]
async fn guarded_step_runs_when_flag_set() {
    let registry = single(
        Task::new("compress", "")
            .step(Step::run("compress assets", "web").when(Guard::flag("compressor"))),
    );
    let (runner, transport) = runner(registry, config(&[("compressor", Value::Bool(true))]));

    let report = runner.run("compress").await.unwrap();

    assert_eq!(transport.calls().len(), 2);
    assert_eq!(report.task_status("compress"), Some(&TaskStatus::Succeeded));
}

#[tokio::test]
async fn guarded_step_skipped_when_flag_absent() {
    let registry = single(
        Task::new("compress", "")
            .step(Step::run("compress assets", "web").when(Guard::flag("compressor"))),
    );
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("compress").await.unwrap();

    assert!(transport.calls().is_empty());
    assert_eq!(report.task_status("compress"), Some(&TaskStatus::Skipped));
    assert!(matches!(
        &report.results[0].outcome,
        Outcome::Skipped { reason } if reason.contains("compressor")
    ));
}

#[tokio::test]
async fn guarded_step_skipped_when_flag_false() {
    // An explicit false is as good as absent.
    let registry = single(
        Task::new("compress", "")
            .step(Step::run("compress assets", "web").when(Guard::flag("compressor"))),
    );
    let (runner, transport) = runner(registry, config(&[("compressor", Value::Bool(false))]));

    let report = runner.run("compress").await.unwrap();

    assert!(transport.calls().is_empty());
    assert_eq!(report.task_status("compress"), Some(&TaskStatus::Skipped));
}

#[tokio::test]
async fn negated_guard_selects_the_other_branch() {
    let registry = single(
        Task::new("restart", "")
            .step(Step::run("restart nginx", "web").when(Guard::flag("nginx")))
            .step(Step::run("restart apache", "web").when(Guard::not_flag("nginx"))),
    );
    let (runner, transport) = runner(registry, config(&[]));

    runner.run("restart").await.unwrap();

    let commands = transport.commands();
    assert!(commands.iter().all(|c| c == "restart apache"));
    assert_eq!(commands.len(), 2);
}

#[tokio::test]
async fn guarded_invoke_skips_whole_subtask() {
    let mut registry = Registry::new();
    registry.add(
        Task::new("outer", "")
            .step(Step::run("echo outer", "jobs"))
            .action(Action::invoke_when("inner", Guard::flag("feature"))),
    );
    registry.add(Task::new("inner", "").step(Step::run("echo inner", "jobs")));
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("outer").await.unwrap();

    assert_eq!(transport.commands(), vec!["echo outer"]);
    // The invoked task never entered the plan, so it carries no status.
    assert_eq!(report.task_status("inner"), None);
    assert!(report
        .results
        .iter()
        .any(|r| matches!(&r.outcome, Outcome::Skipped { reason } if reason.contains("feature"))));
}

#[tokio::test]
async fn string_value_counts_as_truthy_flag() {
    let registry = single(
        Task::new("celery", "")
            .step(Step::run("sudo service celeryd-{celery_name} restart", "jobs")
                .when(Guard::flag("celery_name"))),
    );
    let (runner, transport) = runner(
        registry,
        config(&[("celery_name", Value::Str("myapp".to_string()))]),
    );

    runner.run("celery").await.unwrap();

    assert_eq!(
        transport.calls(),
        vec![(
            "j1".to_string(),
            "sudo service celeryd-myapp restart".to_string()
        )]
    );
}

#[tokio::test]
async fn precondition_false_skips_only_that_host() {
    // h2's transport fails every command, so the per-host test fails there
    // and the real command is only sent to h1.
    let registry = single(
        Task::new("kill", "").step(
            Step::run("kill `cat /srv/app/gunicorn.pid`", "web")
                .only_if("[ -e /srv/app/gunicorn.pid ]"),
        ),
    );
    let (runner, transport) = runner_with(
        registry,
        config(&[]),
        ScriptedTransport::new().failing_host("h2"),
    );

    let report = runner.run("kill").await.unwrap();

    assert!(report.overall_success());
    let h2_results: Vec<_> = report.results.iter().filter(|r| r.host == "h2").collect();
    assert_eq!(h2_results.len(), 1);
    assert!(matches!(
        &h2_results[0].outcome,
        Outcome::Skipped { reason } if reason.contains("precondition")
    ));
    assert!(!transport
        .calls()
        .iter()
        .any(|(host, cmd)| host == "h2" && cmd.contains("kill ")));
}

#[tokio::test]
async fn continue_on_error_keeps_later_steps_running() {
    let registry = single(
        Task::new("best_effort", "")
            .step(Step::run("fail first", "jobs").continue_on_error())
            .step(Step::run("echo second", "jobs")),
    );
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("best_effort").await.unwrap();

    assert_eq!(transport.commands(), vec!["fail first", "echo second"]);
    // The host failure still counts against the run.
    assert!(!report.overall_success());
    assert_eq!(report.exit_code(), 5);
}

#[tokio::test]
async fn all_steps_skipped_marks_task_skipped() {
    let registry = single(
        Task::new("maybe", "")
            .step(Step::run("echo a", "web").when(Guard::flag("x")))
            .step(Step::run("echo b", "web").when(Guard::all(vec![
                Guard::flag("x"),
                Guard::flag("y"),
            ]))),
    );
    let (runner, transport) = runner(registry, config(&[]));

    let report = runner.run("maybe").await.unwrap();

    assert!(transport.calls().is_empty());
    assert_eq!(report.task_status("maybe"), Some(&TaskStatus::Skipped));
    assert!(report.overall_success());
    assert_eq!(report.exit_code(), 0);
}
