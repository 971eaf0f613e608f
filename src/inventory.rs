//! Host inventory and role resolution.
//!
//! Hosts are declared in the deploy file with a set of role memberships.
//! Role resolution preserves declaration order so that runs are
//! reproducible: the same inventory always yields the same host ordering.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Well-known role names used by the built-in task registry.
pub mod roles {
    /// Hosts serving web traffic (app servers).
    pub const WEB: &str = "web";
    /// Hosts running background jobs (celery workers).
    pub const JOBS: &str = "jobs";
    /// Every host in the inventory, regardless of membership.
    pub const ALL: &str = "all";
}

/// A deployment target: an address plus its role memberships.
///
/// Hosts carry no mutable state; connection handling lives in the
/// transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Host {
    /// Hostname or IP address the transport connects to.
    pub address: String,
    /// Roles this host belongs to.
    #[serde(default)]
    pub roles: Vec<String>,
}

impl Host {
    /// Create a host with the given address and roles.
    pub fn new(address: &str, roles: &[&str]) -> Self {
        Self {
            address: address.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    /// Whether this host is a member of the given role.
    ///
    /// Every host is implicitly a member of `all`.
    pub fn has_role(&self, role: &str) -> bool {
        role == roles::ALL || self.roles.iter().any(|r| r == role)
    }
}

impl std::fmt::Display for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.address)
    }
}

/// The host inventory for a deployment run.
///
/// Resolved per role at the point a task executes; membership never
/// changes within one run.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    hosts: Vec<Host>,
}

impl Inventory {
    /// Create an inventory from hosts in declaration order.
    pub fn new(hosts: Vec<Host>) -> Self {
        Self { hosts }
    }

    /// Number of hosts in the inventory.
    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    /// Whether the inventory has no hosts.
    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    /// All hosts, in declaration order.
    pub fn all_hosts(&self) -> &[Host] {
        &self.hosts
    }

    /// Hosts belonging to a role, in declaration order. May be empty.
    pub fn hosts_for_role(&self, role: &str) -> Vec<Host> {
        self.hosts
            .iter()
            .filter(|h| h.has_role(role))
            .cloned()
            .collect()
    }

    /// Hosts belonging to a role, requiring at least one.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownRole`] when the role resolves to zero hosts.
    pub fn require_role(&self, role: &str) -> Result<Vec<Host>> {
        let hosts = self.hosts_for_role(role);
        if hosts.is_empty() {
            return Err(Error::UnknownRole(role.to_string()));
        }
        Ok(hosts)
    }
}
