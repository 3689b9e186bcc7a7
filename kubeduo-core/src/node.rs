//! Nodes, their lifecycle state, and step targets

use crate::config::{ClusterConfig, NodeSpec};
use crate::gateway::InstanceInfo;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::Ipv4Addr;

/// Record key used for steps that run on the operator's machine.
pub const HOST: &str = "host";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    ControlPlane,
    Worker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeState {
    Absent,
    Creating,
    Running,
    Stopped,
    Deleted,
}

impl NodeState {
    /// Whether the VM exists in any form the hypervisor can act on.
    pub fn exists(self) -> bool {
        matches!(self, NodeState::Creating | NodeState::Running | NodeState::Stopped)
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeState::Absent => "absent",
            NodeState::Creating => "creating",
            NodeState::Running => "running",
            NodeState::Stopped => "stopped",
            NodeState::Deleted => "deleted",
        };
        f.pad(s)
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub spec: NodeSpec,
    pub role: NodeRole,
    pub state: NodeState,
    /// Last address the hypervisor reported. Informational only: steps that
    /// need an address resolve it again at execution time.
    pub address: Option<Ipv4Addr>,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.spec.name
    }
}

/// What a step runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    ControlPlane,
    Workers,
    Host,
    All,
    Node(String),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::ControlPlane => f.write_str("control-plane"),
            Target::Workers => f.write_str("worker"),
            Target::Host => f.write_str("host"),
            Target::All => f.write_str("all"),
            Target::Node(name) => write!(f, "node:{name}"),
        }
    }
}

/// A single concrete target after expansion.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TargetRef {
    Host,
    Node(String),
}

impl TargetRef {
    /// Key used in the run record.
    pub fn key(&self) -> &str {
        match self {
            TargetRef::Host => HOST,
            TargetRef::Node(name) => name,
        }
    }

    pub fn node(&self) -> Option<&str> {
        match self {
            TargetRef::Host => None,
            TargetRef::Node(name) => Some(name),
        }
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Declared nodes of the cluster. Mutated only by the execution engine.
#[derive(Debug, Clone)]
pub struct Inventory {
    nodes: Vec<Node>,
}

impl Inventory {
    pub fn from_config(config: &ClusterConfig) -> Self {
        let node = |spec: &NodeSpec, role| Node {
            spec: spec.clone(),
            role,
            state: NodeState::Absent,
            address: None,
        };
        let mut nodes = vec![node(&config.control_plane, NodeRole::ControlPlane)];
        nodes.extend(config.workers.iter().map(|w| node(w, NodeRole::Worker)));
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn get(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Name of the first control-plane node.
    pub fn control_plane(&self) -> Option<&str> {
        self.nodes
            .iter()
            .find(|n| n.role == NodeRole::ControlPlane)
            .map(Node::name)
    }

    /// Expand a target into concrete targets, in declaration order.
    /// Undeclared named nodes expand to nothing; the registry rejects them.
    pub fn resolve(&self, target: &Target) -> Vec<TargetRef> {
        let by_role = |role: NodeRole| {
            self.nodes
                .iter()
                .filter(|n| n.role == role)
                .map(|n| TargetRef::Node(n.name().to_string()))
                .collect()
        };
        match target {
            Target::Host => vec![TargetRef::Host],
            Target::ControlPlane => by_role(NodeRole::ControlPlane),
            Target::Workers => by_role(NodeRole::Worker),
            Target::All => self
                .nodes
                .iter()
                .map(|n| TargetRef::Node(n.name().to_string()))
                .collect(),
            Target::Node(name) if self.contains(name) => vec![TargetRef::Node(name.clone())],
            Target::Node(_) => Vec::new(),
        }
    }

    /// Refresh every node from a hypervisor listing. Nodes missing from the
    /// listing become absent. Returns the declared nodes that do not exist.
    pub fn reconcile(&mut self, instances: &[InstanceInfo]) -> Vec<String> {
        let mut missing = Vec::new();
        for node in &mut self.nodes {
            let listed = instances.iter().find(|i| i.name == node.spec.name);
            node.state = listed.map_or(NodeState::Absent, |i| i.state);
            node.address = listed.and_then(|i| i.address).filter(|_| node.state.exists());
            if !node.state.exists() {
                missing.push(node.spec.name.clone());
            }
        }
        missing
    }

    pub(crate) fn update(&mut self, name: &str, state: NodeState, address: Option<Ipv4Addr>) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.name() == name) {
            node.state = state;
            if address.is_some() || !state.exists() {
                node.address = address;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_roles() {
        let inventory = Inventory::from_config(&ClusterConfig::default());
        assert_eq!(
            inventory.resolve(&Target::All),
            vec![
                TargetRef::Node("control-plane".into()),
                TargetRef::Node("worker-1".into())
            ]
        );
        assert_eq!(
            inventory.resolve(&Target::Workers),
            vec![TargetRef::Node("worker-1".into())]
        );
        assert_eq!(inventory.resolve(&Target::Host), vec![TargetRef::Host]);
        assert!(inventory.resolve(&Target::Node("nope".into())).is_empty());
    }

    #[test]
    fn test_update_clears_address_on_delete() {
        let mut inventory = Inventory::from_config(&ClusterConfig::default());
        inventory.update("worker-1", NodeState::Running, Some(Ipv4Addr::new(10, 0, 0, 7)));
        assert_eq!(
            inventory.get("worker-1").unwrap().address,
            Some(Ipv4Addr::new(10, 0, 0, 7))
        );
        inventory.update("worker-1", NodeState::Deleted, None);
        assert_eq!(inventory.get("worker-1").unwrap().address, None);
    }

    #[test]
    fn test_reconcile_reports_missing() {
        let mut inventory = Inventory::from_config(&ClusterConfig::default());
        let listed = vec![
            InstanceInfo {
                name: "control-plane".into(),
                state: NodeState::Running,
                address: Some(Ipv4Addr::new(10, 0, 0, 5)),
            },
            InstanceInfo {
                name: "stray".into(),
                state: NodeState::Running,
                address: None,
            },
        ];
        assert_eq!(inventory.reconcile(&listed), vec!["worker-1".to_string()]);
        let cp = inventory.get("control-plane").unwrap();
        assert_eq!(cp.state, NodeState::Running);
        assert_eq!(cp.address, Some(Ipv4Addr::new(10, 0, 0, 5)));
        assert_eq!(inventory.get("worker-1").unwrap().state, NodeState::Absent);
    }
}
