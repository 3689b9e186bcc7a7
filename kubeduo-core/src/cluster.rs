//! The kubeadm two-node plan
//!
//! Each builder returns one step; [`provision_plan`] sequences them. Scripts
//! target Ubuntu cloud images and run through `bash -c` inside the VM.

use crate::config::ClusterConfig;
use crate::error::PlanError;
use crate::gateway::Extractor;
use crate::node::{Inventory, Target};
use crate::registry::{ClusterPlan, Direction, StepRegistry};
use crate::step::{Action, KUBECONFIG_QUERY, Predicate, QuerySource, Step};
use crate::teardown;
use std::time::Duration;

const ADMIN_CONF: &str = "/etc/kubernetes/admin.conf";

fn script(lines: &[&str]) -> String {
    let mut body = String::from("set -euo pipefail\n");
    body.push_str(&lines.join("\n"));
    body
}

pub fn create_nodes(config: &ClusterConfig) -> Step {
    Step::new("create_nodes", "Create virtual machines", Target::All, Action::Launch)
        .skip_if(Predicate::NodeRunning)
        .timeout(config.launch_timeout())
        .inverse(delete_nodes())
}

pub fn delete_nodes() -> Step {
    Step::new(
        "delete_nodes",
        "Delete virtual machines",
        Target::All,
        Action::DeleteNodes,
    )
    .best_effort()
    .terminal()
}

pub fn prep_nodes() -> Step {
    let body = script(&[
        "sudo swapoff -a",
        "sudo sed -i '/ swap / s/^/#/' /etc/fstab",
        "printf 'overlay\\nbr_netfilter\\n' | sudo tee /etc/modules-load.d/k8s.conf >/dev/null",
        "sudo modprobe overlay",
        "sudo modprobe br_netfilter",
        "printf 'net.bridge.bridge-nf-call-iptables = 1\\nnet.bridge.bridge-nf-call-ip6tables = 1\\nnet.ipv4.ip_forward = 1\\n' | sudo tee /etc/sysctl.d/k8s.conf >/dev/null",
        "sudo sysctl --system >/dev/null",
    ]);
    Step::new(
        "prep_nodes",
        "Prepare nodes (swap, kernel modules, sysctl)",
        Target::All,
        Action::Shell(body),
    )
    .skip_if(Predicate::Shell(
        "[ -z \"$(swapon --show)\" ] && lsmod | grep -q br_netfilter && [ \"$(sysctl -n net.ipv4.ip_forward)\" = 1 ]"
            .to_string(),
    ))
}

pub fn install_runtime() -> Step {
    let body = script(&[
        "sudo apt-get update -y",
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y containerd",
        "sudo mkdir -p /etc/containerd",
        "containerd config default | sudo tee /etc/containerd/config.toml >/dev/null",
        "sudo sed -i 's/SystemdCgroup = false/SystemdCgroup = true/' /etc/containerd/config.toml",
        "sudo systemctl restart containerd",
        "sudo systemctl enable containerd",
    ]);
    Step::new(
        "install_runtime",
        "Install containerd",
        Target::All,
        Action::Shell(body),
    )
    .skip_if(Predicate::Shell(
        "systemctl is-active --quiet containerd && grep -q 'SystemdCgroup = true' /etc/containerd/config.toml"
            .to_string(),
    ))
}

pub fn install_k8s(config: &ClusterConfig) -> Step {
    let channel = config.channel();
    let key = format!(
        "curl -fsSL https://pkgs.k8s.io/core:/stable:/{channel}/deb/Release.key | sudo gpg --dearmor --yes -o /etc/apt/keyrings/kubernetes-apt-keyring.gpg"
    );
    let repo = format!(
        "echo 'deb [signed-by=/etc/apt/keyrings/kubernetes-apt-keyring.gpg] https://pkgs.k8s.io/core:/stable:/{channel}/deb/ /' | sudo tee /etc/apt/sources.list.d/kubernetes.list >/dev/null"
    );
    let body = script(&[
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y apt-transport-https ca-certificates curl gpg",
        "sudo mkdir -p -m 755 /etc/apt/keyrings",
        &key,
        &repo,
        "sudo apt-get update -y",
        "sudo DEBIAN_FRONTEND=noninteractive apt-get install -y kubelet kubeadm kubectl",
        "sudo apt-mark hold kubelet kubeadm kubectl",
        "sudo systemctl enable --now kubelet",
    ]);
    Step::new(
        "install_k8s",
        format!("Install kubeadm, kubelet, kubectl ({channel})"),
        Target::All,
        Action::Shell(body),
    )
    .skip_if(Predicate::Shell(format!(
        "command -v kubelet >/dev/null && command -v kubectl >/dev/null && kubeadm version -o short | grep -q '^{channel}\\.'"
    )))
}

pub fn init_control_plane(config: &ClusterConfig) -> Step {
    let init = format!("sudo kubeadm init --pod-network-cidr={} ", config.pod_network_cidr)
        + "--apiserver-advertise-address={{ control_plane_address }} --node-name {{ node }}";
    let body = script(&[
        &init,
        "mkdir -p $HOME/.kube",
        "sudo cp -f /etc/kubernetes/admin.conf $HOME/.kube/config",
        "sudo chown $(id -u):$(id -g) $HOME/.kube/config",
    ]);
    Step::new(
        "init_control_plane",
        "Initialize control plane (kubeadm init)",
        Target::ControlPlane,
        Action::Shell(body),
    )
    .query(
        "control_plane_address",
        QuerySource::NodeAddress(config.control_plane.name.clone()),
    )
    .skip_if(Predicate::Shell(format!("test -f {ADMIN_CONF}")))
    .inverse(reset_node(
        "reset_control_plane",
        "Reset control plane (kubeadm reset)",
        Target::ControlPlane,
    ))
}

pub fn install_cni(config: &ClusterConfig) -> Step {
    let apply = format!(
        "sudo kubectl --kubeconfig {ADMIN_CONF} apply -f {}",
        config.cni_manifest_url
    );
    Step::new(
        "install_cni",
        "Apply pod network (CNI) manifest",
        Target::ControlPlane,
        Action::Shell(script(&[&apply])),
    )
}

pub fn fetch_kubeconfig(config: &ClusterConfig) -> Step {
    Step::new(
        "fetch_kubeconfig",
        "Install admin kubeconfig on host",
        Target::Host,
        Action::WriteKubeconfig {
            path: config.kubeconfig_path(),
        },
    )
    .query(
        KUBECONFIG_QUERY,
        QuerySource::Command {
            node: config.control_plane.name.clone(),
            command: format!("sudo cat {ADMIN_CONF}"),
            extractor: Extractor::Whole,
        },
    )
    .inverse(
        Step::new(
            "purge_kubeconfig",
            "Remove host kubeconfig",
            Target::Host,
            Action::RemovePath(config.kubeconfig_path()),
        )
        .best_effort()
        .terminal(),
    )
}

pub fn join_worker(config: &ClusterConfig) -> Step {
    let body = script(&["sudo {{ join_command }} --node-name {{ node }}"]);
    Step::new(
        "join_worker",
        "Join workers (kubeadm join)",
        Target::Workers,
        Action::Shell(body),
    )
    .query(
        "join_command",
        QuerySource::Command {
            node: config.control_plane.name.clone(),
            command: "sudo kubeadm token create --print-join-command".to_string(),
            extractor: Extractor::JoinCommand,
        },
    )
    .skip_if(Predicate::Shell(
        "test -f /etc/kubernetes/kubelet.conf".to_string(),
    ))
    .inverse(reset_node(
        "reset_worker",
        "Reset workers (kubeadm reset)",
        Target::Workers,
    ))
}

pub fn wait_ready() -> Step {
    let wait = format!(
        "sudo kubectl --kubeconfig {ADMIN_CONF} wait --for=condition=Ready nodes --all --timeout=300s"
    );
    Step::new(
        "wait_ready",
        "Wait for all nodes to be Ready",
        Target::ControlPlane,
        Action::Shell(script(&[&wait])),
    )
    .timeout(Duration::from_secs(330))
}

fn reset_node(id: &str, label: &str, target: Target) -> Step {
    let body = script(&[
        "sudo kubeadm reset -f",
        "sudo rm -rf /etc/cni/net.d $HOME/.kube",
    ]);
    Step::new(id, label, target, Action::Shell(body)).best_effort()
}

/// The full forward plan for `config`. Worker steps are left out when no
/// workers are declared.
pub fn provision_plan(config: &ClusterConfig, inventory: &Inventory) -> Result<ClusterPlan, PlanError> {
    let mut steps = vec![
        create_nodes(config),
        prep_nodes(),
        install_runtime(),
        install_k8s(config),
        init_control_plane(config),
        install_cni(config),
        fetch_kubeconfig(config),
    ];
    if !config.workers.is_empty() {
        steps.push(join_worker(config));
    }
    steps.push(wait_ready());
    StepRegistry::new(inventory).define(Direction::Provision, steps)
}

/// Teardown plan derived from the full forward plan.
pub fn teardown_plan(config: &ClusterConfig, inventory: &Inventory) -> Result<ClusterPlan, PlanError> {
    let forward = provision_plan(config, inventory)?;
    teardown::derive(&forward, inventory)
}
