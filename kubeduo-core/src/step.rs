//! Step model: what runs, where, and how failures are treated

use crate::gateway::Extractor;
use crate::node::Target;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Name of the query whose value [`Action::WriteKubeconfig`] writes.
pub const KUBECONFIG_QUERY: &str = "kubeconfig";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Failure aborts the run.
    Critical,
    /// Failure is recorded and the run continues.
    BestEffort,
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Policy::Critical => f.write_str("critical"),
            Policy::BestEffort => f.write_str("best-effort"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Launch (or start) the VM for each target node.
    Launch,
    /// Run a shell command on each target. Rendered as a template when the
    /// step declares queries.
    Shell(String),
    /// Write the value of the `kubeconfig` query to a host path, mode 0600.
    WriteKubeconfig { path: PathBuf },
    /// Remove a host path. Missing paths count as success.
    RemovePath(PathBuf),
    /// Stop and delete each target VM, then purge deleted instances once.
    DeleteNodes,
}

impl Action {
    pub fn describe(&self) -> String {
        match self {
            Action::Launch => "launch VM".to_string(),
            Action::Shell(cmd) => {
                let first = cmd
                    .lines()
                    .find(|l| !l.trim().is_empty() && !l.starts_with("set -"))
                    .unwrap_or("");
                format!("shell: {}", first.trim())
            }
            Action::WriteKubeconfig { path } => format!("write {}", path.display()),
            Action::RemovePath(path) => format!("remove {}", path.display()),
            Action::DeleteNodes => "delete + purge VMs".to_string(),
        }
    }
}

/// "Already satisfied" check used for idempotent skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// The hypervisor reports the target node as running.
    NodeRunning,
    /// The command exits 0 on the target.
    Shell(String),
}

/// A value read back at execution time and threaded into the step's
/// command template. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub name: String,
    pub source: QuerySource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuerySource {
    /// Current IPv4 address of a node, from the hypervisor.
    NodeAddress(String),
    /// Output of a command on a node, narrowed by an extractor.
    Command {
        node: String,
        command: String,
        extractor: Extractor,
    },
}

impl QuerySource {
    pub fn node(&self) -> &str {
        match self {
            QuerySource::NodeAddress(node) | QuerySource::Command { node, .. } => node,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Stable across runs; keys the run record.
    pub id: String,
    pub label: String,
    pub target: Target,
    pub action: Action,
    pub policy: Policy,
    pub skip_if: Option<Predicate>,
    pub queries: Vec<Query>,
    pub timeout: Option<Duration>,
    /// Teardown counterpart, if the step has a natural inverse.
    pub inverse: Option<Box<Step>>,
    /// Terminal teardown steps run last and are never skipped.
    pub terminal: bool,
}

impl Step {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        target: Target,
        action: Action,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            target,
            action,
            policy: Policy::Critical,
            skip_if: None,
            queries: Vec::new(),
            timeout: None,
            inverse: None,
            terminal: false,
        }
    }

    #[must_use]
    pub fn best_effort(mut self) -> Self {
        self.policy = Policy::BestEffort;
        self
    }

    #[must_use]
    pub fn skip_if(mut self, predicate: Predicate) -> Self {
        self.skip_if = Some(predicate);
        self
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, source: QuerySource) -> Self {
        self.queries.push(Query {
            name: name.into(),
            source,
        });
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn inverse(mut self, inverse: Step) -> Self {
        self.inverse = Some(Box::new(inverse));
        self
    }

    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.policy == Policy::Critical
    }

    /// Whether this step brings its target nodes into existence.
    pub fn provisions_nodes(&self) -> bool {
        self.action == Action::Launch
    }
}
