//! Deployment configuration: a snapshot of options resolved once per run.
//!
//! The configuration is loaded from a TOML deploy file, frozen before any
//! task executes, and passed by reference through every call. There is no
//! implicit global lookup: renderers and guards receive the snapshot
//! explicitly.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::inventory::{Host, Inventory};
use crate::{clog_debug, Error, Result};

/// A configuration value: string, boolean, or list of strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Str(String),
    List(Vec<String>),
}

impl Value {
    /// Whether this value counts as "set" for guard evaluation.
    ///
    /// Booleans are truthy when true, strings when non-empty, lists when
    /// non-empty. This mirrors how the deploy file flags are written:
    /// `nginx = true`, `celery_name = "myapp"`, `npm_tasks = ["grunt build"]`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Str(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
        }
    }

    /// Render this value into a command string fragment.
    pub fn render(&self) -> String {
        match self {
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::List(l) => l.join(" "),
        }
    }
}

/// The deployment profile, resolved once at config load.
///
/// The `flask` and `multidb` flags are mutually exclusive choices of one
/// enumerated profile; combining them is rejected instead of guessed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "framework")]
pub enum Profile {
    /// Django deployment; `multidb` selects the sync_all migration strategy.
    Django { multidb: bool },
    /// Flask deployment.
    Flask,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Django { multidb: false } => write!(f, "django"),
            Profile::Django { multidb: true } => write!(f, "django (multidb)"),
            Profile::Flask => write!(f, "flask"),
        }
    }
}

/// Frozen configuration snapshot for one deployment run.
///
/// Read-only during execution. Keys are option names (`release_path`,
/// `nginx`, `pip_requirements`, ...), values are [`Value`]s.
#[derive(Debug, Clone)]
pub struct Config {
    values: BTreeMap<String, Value>,
    profile: Profile,
}

impl Config {
    /// Build a snapshot from raw values, resolving the deployment profile.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Profile`] when `flask` and `multidb` are both set,
    /// since multidb migrations only exist for Django.
    pub fn from_values(values: BTreeMap<String, Value>) -> Result<Self> {
        let flask = values.get("flask").map(Value::is_truthy).unwrap_or(false);
        let multidb = values.get("multidb").map(Value::is_truthy).unwrap_or(false);

        let profile = match (flask, multidb) {
            (true, true) => {
                return Err(Error::Profile(
                    "'flask' and 'multidb' are mutually exclusive; \
                     multidb migrations only apply to Django"
                        .to_string(),
                ))
            }
            (true, false) => Profile::Flask,
            (false, multidb) => Profile::Django { multidb },
        };

        Ok(Self { values, profile })
    }

    /// Fetch a value by option name.
    pub fn fetch(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Fetch a value, falling back to a default when absent.
    pub fn fetch_or<'a>(&'a self, key: &str, default: &'a Value) -> &'a Value {
        self.values.get(key).unwrap_or(default)
    }

    /// Fetch a string value by option name.
    pub fn str(&self, key: &str) -> Option<&str> {
        match self.values.get(key) {
            Some(Value::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Evaluate a boolean flag. Absent keys are false.
    pub fn flag(&self, key: &str) -> bool {
        self.values.get(key).map(Value::is_truthy).unwrap_or(false)
    }

    /// Fetch a list value. Absent or non-list keys yield an empty slice.
    pub fn list(&self, key: &str) -> &[String] {
        match self.values.get(key) {
            Some(Value::List(l)) => l,
            _ => &[],
        }
    }

    /// The resolved deployment profile.
    pub fn profile(&self) -> Profile {
        self.profile
    }

    /// Iterate over all option names in sorted order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

/// On-disk shape of the deploy file: settings plus the host inventory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployFile {
    /// Option name to value mapping, frozen into the [`Config`].
    #[serde(default)]
    pub settings: BTreeMap<String, Value>,
    /// Hosts with their role memberships, in declaration order.
    #[serde(default)]
    pub hosts: Vec<Host>,
}

impl DeployFile {
    /// Load and parse a deploy file from disk.
    pub fn load(path: &Path) -> Result<Self> {
        clog_debug!("DeployFile::load path={}", path.display());
        let file: Self = toml::from_str(&fs::read_to_string(path)?)?;
        clog_debug!(
            "Deploy file loaded: {} settings, {} hosts",
            file.settings.len(),
            file.hosts.len()
        );
        Ok(file)
    }

    /// Split the file into a frozen config snapshot and a host inventory.
    pub fn into_parts(self) -> Result<(Config, Inventory)> {
        let config = Config::from_values(self.settings)?;
        let inventory = Inventory::new(self.hosts);
        Ok((config, inventory))
    }
}
