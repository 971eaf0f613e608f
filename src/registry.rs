//! Built-in deployment tasks for Python web applications.
//!
//! The registry provisions a Django or Flask application on a release
//! already present on the hosts: virtualenv creation, pip install,
//! framework management commands, process-manager restarts, and
//! configuration symlinks. Symlinks use `ln -sfn` so re-running a task
//! against hosts already in the target state succeeds.
//!
//! Configuration options consumed here:
//! `release_path`, `releases_path`, `shared_path`, `project_path`,
//! `pip_requirements`, `shared_virtualenv`, `nginx`, `wsgi_file`,
//! `wsgi_path`, `flask`, `settings_file`, `django_settings`,
//! `django_settings_dir`, `django_project_dir`, `multidb`,
//! `compilemessages`, `django_compressor`, `celery_name`, `npm_tasks`,
//! `npm_path`, `npm_install_production`.

use crate::config::Config;
use crate::core::task::{Action, Guard, Registry, Step, Task};
use crate::inventory::roles;

/// Template for a `manage.py` invocation through the release virtualenv.
fn manage(args: &str, flags: &str) -> String {
    let mut command = format!(
        "{{release_path}}/virtualenv/bin/python \
         {{release_path}}/{{django_project_dir|.}}/manage.py \
         {{django_settings}} {}",
        args
    );
    if !flags.is_empty() {
        command.push(' ');
        command.push_str(flags);
    }
    command
}

/// Build the registry of built-in deployment tasks.
///
/// The config snapshot is needed at build time because the `npm_tasks`
/// list expands into one step per configured npm task; everything else is
/// static. Tasks and steps are immutable once this returns.
pub fn builtin(config: &Config) -> Registry {
    let mut registry = Registry::new();

    // Anchor for the release upload, owned by external release tooling.
    // Exists so hooks can order work after it.
    registry.add(Task::new(
        "deploy:updating",
        "Anchor: the new release has been uploaded",
    ));

    registry.add(
        Task::new("deploy:restart", "Restart application")
            .action(Action::invoke_when(
                "deploy:nginx_restart",
                Guard::flag("nginx"),
            ))
            .step(
                Step::run("sudo apache2ctl graceful", roles::WEB)
                    .when(Guard::not_flag("nginx")),
            ),
    );

    registry.add(
        Task::new("deploy:nginx_restart", "Restart gunicorn behind nginx")
            .step(
                Step::run("kill `cat {releases_path}/gunicorn.pid`", roles::WEB)
                    .only_if("[ -e {releases_path}/gunicorn.pid ]")
                    .within("{project_path}"),
            )
            .step(
                Step::run(
                    "virtualenv/bin/gunicorn {wsgi_file}:application \
                     -c=gunicorn_config.py --pid={releases_path}/gunicorn.pid",
                    roles::WEB,
                )
                .within("{project_path}"),
            ),
    );

    let mut create_virtualenv = Task::new(
        "python:create_virtualenv",
        "Create a python virtualenv",
    )
    .runs_after("deploy:updating")
    // Shared virtualenv lives under shared_path and is linked into the
    // release; the per-release variant lives inside the release itself.
    .step(
        Step::run("virtualenv {shared_path}/virtualenv", roles::ALL)
            .when(Guard::flag("shared_virtualenv")),
    )
    .step(
        Step::run(
            "{shared_path}/virtualenv/bin/pip install -r {release_path}/{pip_requirements}",
            roles::ALL,
        )
        .when(Guard::flag("shared_virtualenv")),
    )
    .step(
        Step::run(
            "ln -sfn {shared_path}/virtualenv {release_path}/virtualenv",
            roles::ALL,
        )
        .when(Guard::flag("shared_virtualenv")),
    )
    .step(
        Step::run("virtualenv {release_path}/virtualenv", roles::ALL)
            .when(Guard::not_flag("shared_virtualenv")),
    )
    .step(
        Step::run(
            "{release_path}/virtualenv/bin/pip install -r {release_path}/{pip_requirements}",
            roles::ALL,
        )
        .when(Guard::not_flag("shared_virtualenv")),
    );
    create_virtualenv = create_virtualenv
        .action(Action::invoke_when("nodejs:npm", Guard::flag("npm_tasks")))
        .action(Action::invoke_when("flask:setup", Guard::flag("flask")))
        .action(Action::invoke_when(
            "django:setup",
            Guard::not_flag("flask"),
        ));
    registry.add(create_virtualenv);

    registry.add(
        Task::new("flask:setup", "Symlink Flask settings and wsgi script")
            .step(Step::run(
                "ln -sfn {release_path}/settings/{settings_file}.py \
                 {release_path}/settings/deployed.py",
                roles::WEB,
            ))
            .step(Step::run(
                "ln -sfn {release_path}/wsgi/wsgi.py {release_path}/wsgi/live.wsgi",
                roles::WEB,
            )),
    );

    registry.add(
        Task::new("django:setup", "Setup Django environment")
            .action(Action::invoke_when(
                "django:compress",
                Guard::flag("django_compressor"),
            ))
            .action(Action::invoke("django:compilemessages"))
            .action(Action::invoke("django:collectstatic"))
            .action(Action::invoke("django:symlink_settings"))
            .action(Action::invoke_when(
                "django:symlink_wsgi",
                Guard::not_flag("nginx"),
            ))
            .action(Action::invoke("django:migrate")),
    );

    registry.add(
        Task::new("django:compilemessages", "Compile messages").step(
            Step::run(&manage("compilemessages", ""), roles::ALL)
                .when(Guard::flag("compilemessages")),
        ),
    );

    registry.add(
        Task::new("django:compress", "Run django-compressor")
            .step(Step::run(&manage("compress", ""), roles::ALL)),
    );

    registry.add(
        Task::new("django:collectstatic", "Run django's collectstatic").step(Step::run(
            &manage(
                "collectstatic",
                "-i *.coffee -i *.less -i node_modules/* -i bower_components/* --noinput",
            ),
            roles::ALL,
        )),
    );

    registry.add(
        Task::new(
            "django:symlink_settings",
            "Symlink django settings to deployed.py",
        )
        .step(Step::run(
            "ln -sfn {release_path}/{django_settings_dir}/{django_settings}.py \
             {release_path}/{django_settings_dir}/deployed.py",
            roles::ALL,
        )),
    );

    registry.add(
        Task::new("django:symlink_wsgi", "Symlink wsgi script to live.wsgi").step(Step::run(
            "ln -sfn {release_path}/{wsgi_path|wsgi}/main.wsgi \
             {release_path}/{wsgi_path|wsgi}/live.wsgi",
            roles::WEB,
        )),
    );

    registry.add(
        Task::new("django:migrate", "Run django migrations")
            .step(
                Step::run(&manage("sync_all", "--noinput"), roles::WEB)
                    .when(Guard::flag("multidb")),
            )
            .step(
                Step::run(&manage("migrate", "--noinput"), roles::WEB)
                    .when(Guard::not_flag("multidb")),
            ),
    );

    registry.add(
        Task::new("django:restart_celery", "Restart Celery")
            .runs_after("deploy:restart")
            .action(Action::invoke_when(
                "django:restart_celeryd",
                Guard::flag("celery_name"),
            ))
            .action(Action::invoke_when(
                "django:restart_celerybeat",
                Guard::flag("celery_name"),
            )),
    );

    registry.add(
        Task::new("django:restart_celeryd", "Restart Celeryd").step(Step::run(
            "sudo service celeryd-{celery_name} restart",
            roles::JOBS,
        )),
    );

    registry.add(
        Task::new("django:restart_celerybeat", "Restart Celerybeat").step(Step::run(
            "sudo service celerybeat-{celery_name} restart",
            roles::JOBS,
        )),
    );

    registry.add(
        Task::new("nodejs:npm_install", "Install node modules").step(
            Step::run("npm install {npm_install_production|--production}", roles::WEB)
                .within("{release_path}/{npm_path|.}"),
        ),
    );

    let mut npm = Task::new("nodejs:npm", "Run npm tasks").action(Action::invoke("nodejs:npm_install"));
    for entry in config.list("npm_tasks") {
        npm = npm.step(
            Step::run(
                &format!("./node_modules/.bin/{}", entry),
                roles::WEB,
            )
            .within("{release_path}/{npm_path|.}"),
        );
    }
    registry.add(npm);

    registry
}
