//! Test fixtures for integration tests.
//!
//! Provides a recording transport with scripted behavior, plus helpers
//! for building config snapshots, inventories, and runners.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use convoy::config::{Config, Value};
use convoy::core::task::Registry;
use convoy::inventory::{Host, Inventory};
use convoy::transport::{CommandOutput, CommandSpec, Transport};
use convoy::{Result, Runner};

/// Transport that records every call and follows a small script:
/// commands containing `fail` exit non-zero, commands containing
/// `slow` sleep for the configured delay, predicates containing
/// `absent` test false. Tracks the maximum number of commands in
/// flight at once.
#[derive(Default)]
pub struct ScriptedTransport {
    pub delay: Option<Duration>,
    pub fail_hosts: HashSet<String>,
    pub slow_hosts: HashSet<String>,
    calls: std::sync::Mutex<Vec<(String, String)>>,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing_host(mut self, host: &str) -> Self {
        self.fail_hosts.insert(host.to_string());
        self
    }

    pub fn slow_host(mut self, host: &str) -> Self {
        self.slow_hosts.insert(host.to_string());
        self
    }

    /// All (host, command) pairs, in dispatch order.
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Just the commands, in dispatch order.
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|(_, c)| c).collect()
    }

    /// Maximum number of commands that were in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, host: &Host, spec: &CommandSpec) -> Result<CommandOutput> {
        let line = spec.shell_line();
        self.calls
            .lock()
            .unwrap()
            .push((host.address.clone(), line.clone()));

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if line.contains("slow") || self.slow_hosts.contains(&host.address) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        let fails = line.contains("fail")
            || line.contains("absent")
            || self.fail_hosts.contains(&host.address);
        Ok(CommandOutput {
            stdout: if fails {
                String::new()
            } else {
                format!("ran: {}\n", line)
            },
            stderr: if fails { "scripted failure".to_string() } else { String::new() },
            success: !fails,
            exit_code: if fails { 1 } else { 0 },
        })
    }
}

/// Config snapshot from string settings.
pub fn config(pairs: &[(&str, Value)]) -> Config {
    let values: BTreeMap<String, Value> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect();
    Config::from_values(values).unwrap()
}

/// Two web hosts and one jobs host.
pub fn inventory() -> Inventory {
    Inventory::new(vec![
        Host::new("h1", &["web"]),
        Host::new("h2", &["web"]),
        Host::new("j1", &["jobs"]),
    ])
}

/// Runner over a scripted transport, returning both.
pub fn runner(registry: Registry, config: Config) -> (Runner, Arc<ScriptedTransport>) {
    runner_with(registry, config, ScriptedTransport::new())
}

/// Runner over a specific scripted transport.
pub fn runner_with(
    registry: Registry,
    config: Config,
    transport: ScriptedTransport,
) -> (Runner, Arc<ScriptedTransport>) {
    let transport = Arc::new(transport);
    let runner = Runner::new(
        registry,
        config,
        inventory(),
        Arc::clone(&transport) as Arc<dyn Transport>,
    );
    (runner, transport)
}

/// Settings for a typical Django deployment behind nginx.
pub fn django_settings() -> Vec<(&'static str, Value)> {
    vec![
        ("release_path", Value::Str("/srv/app/current".to_string())),
        ("releases_path", Value::Str("/srv/app/releases".to_string())),
        ("shared_path", Value::Str("/srv/app/shared".to_string())),
        ("project_path", Value::Str("/srv/app/current".to_string())),
        (
            "pip_requirements",
            Value::Str("requirements.txt".to_string()),
        ),
        ("nginx", Value::Bool(true)),
        ("wsgi_file", Value::Str("wsgi.live".to_string())),
        (
            "django_settings",
            Value::Str("settings.production".to_string()),
        ),
        ("django_settings_dir", Value::Str("settings".to_string())),
    ]
}
