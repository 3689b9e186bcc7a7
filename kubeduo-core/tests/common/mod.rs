//! In-memory hypervisor for engine tests
#![allow(dead_code)]

use async_trait::async_trait;
use kubeduo_core::{ClusterConfig, CommandOutput, GatewayError, Hypervisor, InstanceInfo, NodeSpec, NodeState};
use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

pub const TOKEN: &str = "abcdef.0123456789abcdef";

pub const KUBECONFIG: &str = "apiVersion: v1
clusters:
- cluster:
    certificate-authority-data: Zm9vYmFy
    server: https://10.0.0.1:6443
  name: kubernetes
contexts:
- context:
    cluster: kubernetes
    user: kubernetes-admin
  name: kubernetes-admin@kubernetes
current-context: kubernetes-admin@kubernetes
kind: Config
users:
- name: kubernetes-admin
  user:
    client-certificate-data: YmFy
";

/// Fragments of the idempotency checks in the kubeadm plan. Failing them
/// makes every step do its work on a fresh mock.
pub const PREDICATES: &[&str] = &["swapon --show", "is-active", "kubeadm version", "test -f"];

pub fn join_command() -> String {
    format!(
        "kubeadm join 10.0.0.1:6443 --token {TOKEN} --discovery-token-ca-cert-hash sha256:{}",
        "0f".repeat(32)
    )
}

/// Config with host paths under `dir`.
pub fn test_config(dir: &Path) -> ClusterConfig {
    ClusterConfig {
        kubeconfig_path: dir.join("kube").join("config").display().to_string(),
        state_dir: dir.join("state").display().to_string(),
        ..ClusterConfig::default()
    }
}

#[derive(Default)]
struct State {
    nodes: BTreeMap<String, (NodeState, Option<Ipv4Addr>)>,
    next_octet: u8,
    exec_log: Vec<(String, String)>,
    lifecycle_log: Vec<String>,
    fail_on: Vec<String>,
    delays: Vec<(String, Duration)>,
    responses: Vec<(String, String)>,
    broken: bool,
}

#[derive(Default)]
pub struct MockHypervisor {
    state: Mutex<State>,
}

impl MockHypervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock that answers the kubeadm queries like a healthy control plane.
    pub fn kubeadm() -> Self {
        let mock = Self::new();
        mock.respond("kubeadm token create", &join_command());
        mock.respond("cat /etc/kubernetes/admin.conf", KUBECONFIG);
        mock.respond(
            "kubeadm join",
            &format!("[preflight] Using bootstrap token {TOKEN}\nThis node has joined the cluster"),
        );
        for predicate in PREDICATES {
            mock.fail_on(predicate);
        }
        mock
    }

    pub fn with_running(self, names: &[&str]) -> Self {
        for name in names {
            self.set_state(name, NodeState::Running);
        }
        self
    }

    pub fn set_state(&self, name: &str, state: NodeState) {
        let mut s = self.state.lock().unwrap();
        s.next_octet += 1;
        let address = Some(Ipv4Addr::new(10, 0, 0, s.next_octet));
        s.nodes.insert(name.to_string(), (state, address));
    }

    pub fn remove(&self, name: &str) {
        self.state.lock().unwrap().nodes.remove(name);
    }

    /// Commands containing `fragment` exit 1.
    pub fn fail_on(&self, fragment: &str) {
        self.state.lock().unwrap().fail_on.push(fragment.to_string());
    }

    pub fn delay_on(&self, fragment: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .push((fragment.to_string(), delay));
    }

    pub fn respond(&self, fragment: &str, stdout: &str) {
        self.state
            .lock()
            .unwrap()
            .responses
            .push((fragment.to_string(), stdout.to_string()));
    }

    /// Every operation fails; inspection returns errors.
    pub fn break_everything(&self) {
        self.state.lock().unwrap().broken = true;
    }

    pub fn exec_log(&self) -> Vec<(String, String)> {
        self.state.lock().unwrap().exec_log.clone()
    }

    pub fn lifecycle_log(&self) -> Vec<String> {
        self.state.lock().unwrap().lifecycle_log.clone()
    }

    pub fn node_state(&self, name: &str) -> Option<NodeState> {
        self.state.lock().unwrap().nodes.get(name).map(|(s, _)| *s)
    }

    fn lifecycle(&self, op: &str, name: &str, state: Option<NodeState>) -> CommandOutput {
        let mut s = self.state.lock().unwrap();
        s.lifecycle_log.push(format!("{op} {name}").trim().to_string());
        if s.broken {
            return exit(1, "", "hypervisor unavailable");
        }
        if let Some(state) = state {
            if let Some(entry) = s.nodes.get_mut(name) {
                entry.0 = state;
                if state == NodeState::Deleted {
                    entry.1 = None;
                }
            }
        }
        exit(0, "", "")
    }

    fn unavailable() -> GatewayError {
        GatewayError::Lifecycle {
            program: "mock".to_string(),
            exit_code: 1,
            stderr: "hypervisor unavailable".to_string(),
        }
    }
}

fn exit(code: i32, stdout: &str, stderr: &str) -> CommandOutput {
    CommandOutput {
        exit_code: code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

#[async_trait]
impl Hypervisor for MockHypervisor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list(&self) -> Result<Vec<InstanceInfo>, GatewayError> {
        let s = self.state.lock().unwrap();
        if s.broken {
            return Err(Self::unavailable());
        }
        Ok(s.nodes
            .iter()
            .map(|(name, (state, address))| InstanceInfo {
                name: name.clone(),
                state: *state,
                address: *address,
            })
            .collect())
    }

    async fn info(&self, name: &str) -> Result<Option<InstanceInfo>, GatewayError> {
        let s = self.state.lock().unwrap();
        if s.broken {
            return Err(Self::unavailable());
        }
        Ok(s.nodes.get(name).map(|(state, address)| InstanceInfo {
            name: name.to_string(),
            state: *state,
            address: *address,
        }))
    }

    async fn launch(&self, _image: &str, node: &NodeSpec) -> Result<CommandOutput, GatewayError> {
        let broken = self.state.lock().unwrap().broken;
        if broken {
            return Ok(self.lifecycle("launch", &node.name, None));
        }
        self.set_state(&node.name, NodeState::Running);
        Ok(self.lifecycle("launch", &node.name, None))
    }

    async fn start(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        Ok(self.lifecycle("start", name, Some(NodeState::Running)))
    }

    async fn exec(&self, name: &str, command: &str) -> Result<CommandOutput, GatewayError> {
        let (delay, output) = {
            let mut s = self.state.lock().unwrap();
            s.exec_log.push((name.to_string(), command.to_string()));
            let delay = s
                .delays
                .iter()
                .find(|(f, _)| command.contains(f.as_str()))
                .map(|(_, d)| *d);
            let output = if s.broken {
                exit(1, "", "connection refused")
            } else if let Some(f) = s.fail_on.iter().find(|f| command.contains(f.as_str())) {
                exit(1, "", &format!("mock failure on `{f}`"))
            } else if let Some((_, out)) = s.responses.iter().find(|(f, _)| command.contains(f.as_str())) {
                exit(0, out, "")
            } else {
                exit(0, "", "")
            };
            (delay, output)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(output)
    }

    async fn stop(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        Ok(self.lifecycle("stop", name, Some(NodeState::Stopped)))
    }

    async fn delete(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        Ok(self.lifecycle("delete", name, Some(NodeState::Deleted)))
    }

    async fn purge(&self) -> Result<CommandOutput, GatewayError> {
        let output = self.lifecycle("purge", "", None);
        if output.exit_code == 0 {
            self.state
                .lock()
                .unwrap()
                .nodes
                .retain(|_, (state, _)| *state != NodeState::Deleted);
        }
        Ok(output)
    }
}
