//! Transport layer: how rendered commands reach hosts.
//!
//! The [`Transport`] trait is the seam between the orchestrator and the
//! outside world. Production runs use [`SshTransport`] (the system `ssh`
//! binary) or [`LocalTransport`]; the test suites substitute a recording
//! mock so no command leaves the process.

use async_trait::async_trait;
use tokio::process::Command;

use crate::inventory::Host;
use crate::{clog_trace, Result};

/// A rendered command plus its optional working directory.
///
/// The working directory scoping replaces a callback-style `within`: the
/// command is wrapped in `cd <dir> && ...` on the remote shell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// The fully rendered shell command.
    pub command: String,
    /// Optional rendered working directory.
    pub cwd: Option<String>,
}

impl CommandSpec {
    /// A command with no working directory scoping.
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            cwd: None,
        }
    }

    /// Scope the command to a working directory.
    pub fn within(mut self, cwd: &str) -> Self {
        self.cwd = Some(cwd.to_string());
        self
    }

    /// The single shell line sent to the host.
    pub fn shell_line(&self) -> String {
        match &self.cwd {
            Some(cwd) => format!("cd {} && {}", cwd, self.command),
            None => self.command.clone(),
        }
    }
}

impl std::fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.shell_line())
    }
}

/// Captured output of one command on one host.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub exit_code: i32,
}

/// Executes commands on hosts.
///
/// Implementations must be safe to share across the per-host workers of a
/// parallel step.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Run a command on a host, capturing output and exit status.
    ///
    /// A non-zero exit is reported through [`CommandOutput`], not as an
    /// `Err`; errors are reserved for the transport itself failing.
    async fn execute(&self, host: &Host, spec: &CommandSpec) -> Result<CommandOutput>;

    /// Run a predicate command on a host, true when it exits zero.
    async fn test(&self, host: &Host, spec: &CommandSpec) -> Result<bool> {
        Ok(self.execute(host, spec).await?.success)
    }
}

/// Check if a host address refers to the local machine.
pub fn is_local_host(address: &str) -> bool {
    matches!(address, "localhost" | "127.0.0.1" | "::1")
}

/// Runs commands on the local machine through `sh -c`.
///
/// Used directly for single-machine deployments and as the fallback for
/// SSH targets that resolve to localhost.
#[derive(Debug, Clone, Default)]
pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, host: &Host, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.shell_line();
        clog_trace!("local exec on {}: {}", host.address, line);

        let output = Command::new("sh").arg("-c").arg(&line).output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Runs commands on remote hosts via the system `ssh` binary.
///
/// Non-interactive: BatchMode plus connect timeout and keepalive options
/// prevent hangs on stalled connections or unexpected prompts. Hosts whose
/// address is localhost short-circuit to local execution.
#[derive(Debug, Clone)]
pub struct SshTransport {
    /// Login user for all hosts.
    pub user: String,
    /// SSH port. 22 is omitted from the argument list.
    pub port: u16,
    /// Optional identity file path.
    pub identity_file: Option<String>,
}

impl SshTransport {
    /// Create an SSH transport for the given user on the default port.
    pub fn new(user: &str) -> Self {
        Self {
            user: user.to_string(),
            port: 22,
            identity_file: None,
        }
    }

    /// Use a non-default port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Authenticate with an identity file.
    pub fn identity_file(mut self, path: &str) -> Self {
        self.identity_file = Some(path.to_string());
        self
    }

    fn build_args(&self, host: &Host, command: &str) -> Vec<String> {
        let mut args = Vec::new();

        if let Some(identity_file) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity_file.clone());
        }

        if self.port != 22 {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }

        args.extend([
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-o".to_string(),
            "ServerAliveInterval=15".to_string(),
            "-o".to_string(),
            "ServerAliveCountMax=3".to_string(),
        ]);

        args.push(format!("{}@{}", self.user, host.address));
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn execute(&self, host: &Host, spec: &CommandSpec) -> Result<CommandOutput> {
        if is_local_host(&host.address) {
            return LocalTransport.execute(host, spec).await;
        }

        let line = spec.shell_line();
        clog_trace!("ssh exec on {}: {}", host.address, line);

        let args = self.build_args(host, &line);
        let output = Command::new("ssh").args(&args).output().await?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
