use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use convoy::config::DeployFile;
use convoy::registry;
use convoy::report::{Outcome, RunReport};
use convoy::transport::{LocalTransport, SshTransport, Transport};
use convoy::{clog, Result, Runner};

/// Convoy - multi-host deployment orchestrator for Python web applications
#[derive(Parser, Debug)]
#[command(name = "convoy")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    CONVOY_DEBUG=1     Enable debug logging (alternative to --debug)")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.convoy/convoy.log)
    #[arg(short = 'd', long)]
    pub debug: bool,

    /// Path to the deploy file
    #[arg(short = 'c', long, default_value = "deploy.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run a task and everything hooked around it
    Run {
        /// Task name, e.g. deploy:restart
        task: String,

        /// Only execute on hosts belonging to this role
        #[arg(long)]
        role: Option<String>,

        /// Plan and report without sending any command
        #[arg(long)]
        dry_run: bool,

        /// Emit the full run report as JSON
        #[arg(long)]
        json: bool,

        /// Execute locally through sh instead of ssh
        #[arg(long)]
        local: bool,
    },

    /// List the registered tasks
    Tasks,

    /// List inventory hosts and their roles
    Hosts {
        /// Only list hosts belonging to this role
        #[arg(long)]
        role: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    convoy::log::init(cli.debug);

    let code = match dispatch(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("convoy: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> Result<i32> {
    let deploy = DeployFile::load(&cli.config)?;
    let (config, inventory) = deploy.into_parts()?;

    match cli.command {
        Command::Run {
            task,
            role,
            dry_run,
            json,
            local,
        } => {
            clog!(
                "run {}: profile={}, dry_run={}, role={:?}",
                task,
                config.profile(),
                dry_run,
                role
            );

            let transport: Arc<dyn Transport> = if local {
                Arc::new(LocalTransport)
            } else {
                Arc::new(ssh_transport(&config))
            };

            let tasks = registry::builtin(&config);
            let runner = Runner::new(tasks, config, inventory, transport)
                .dry_run(dry_run)
                .role_filter(role);

            // Ctrl-C stops scheduling new commands; in-flight commands
            // finish best-effort.
            let cancel = runner.cancellation_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    eprintln!("convoy: cancelling run");
                    cancel.cancel();
                }
            });

            let report = runner.run(&task).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            Ok(report.exit_code())
        }

        Command::Tasks => {
            for task in registry::builtin(&config).tasks() {
                println!("{:<32} {}", task.name, task.description);
            }
            Ok(0)
        }

        Command::Hosts { role } => {
            let hosts = match role {
                Some(role) => inventory.require_role(&role)?,
                None => inventory.all_hosts().to_vec(),
            };
            for host in hosts {
                println!("{:<32} [{}]", host.address, host.roles.join(", "));
            }
            Ok(0)
        }
    }
}

/// SSH transport configured from deploy file settings.
fn ssh_transport(config: &convoy::config::Config) -> SshTransport {
    let mut transport = SshTransport::new(config.str("ssh_user").unwrap_or("deploy"));
    if let Some(port) = config.str("ssh_port").and_then(|p| p.parse().ok()) {
        transport = transport.port(port);
    }
    if let Some(identity) = config.str("ssh_identity_file") {
        transport = transport.identity_file(identity);
    }
    transport
}

fn print_report(report: &RunReport) {
    println!("run {} — {}", report.run_id.short(), report.requested_task);

    for (task, status) in &report.task_statuses {
        println!("  {:<32} {}", task, status);
        for result in report.results_for_task(task) {
            match &result.outcome {
                Outcome::Success { exit_code, .. } => {
                    println!("    {:<28} ok (exit {})", result.host, exit_code);
                }
                Outcome::Failed {
                    exit_code, stderr, ..
                } => {
                    println!("    {:<28} FAILED (exit {})", result.host, exit_code);
                    for line in stderr.lines() {
                        println!("      {}", line);
                    }
                }
                Outcome::TimedOut { timeout_ms } => {
                    println!("    {:<28} TIMED OUT ({}ms)", result.host, timeout_ms);
                }
                Outcome::Skipped { reason } => {
                    println!("    {:<28} skipped: {}", result.host, reason);
                }
            }
        }
    }

    let summary = report.summary();
    println!(
        "{} succeeded, {} failed, {} timed out, {} skipped",
        summary.succeeded, summary.failed, summary.timed_out, summary.skipped
    );
}
