//! Cluster configuration
//!
//! Loaded with confy from an explicit path or from the per-user default
//! location (`kubeduo/cluster.toml`). Every option here feeds plan
//! construction in [`crate::cluster`].

use crate::error::{
    ConfigError, DuplicateNodeSnafu, EmptyNodeNameSnafu, InvalidChannelSnafu, InvalidCidrSnafu,
    LoadSnafu, NoCpuSnafu, ReservedNodeNameSnafu, ZeroTimeoutSnafu,
};
use crate::node::HOST;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, ensure};
use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const APP_NAME: &str = "kubeduo";
pub const CONFIG_NAME: &str = "cluster";

/// Name and resources for one VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    #[serde(default = "default_cpus")]
    pub cpus: u32,
    #[serde(default = "default_memory")]
    pub memory: String,
    #[serde(default = "default_disk")]
    pub disk: String,
}

impl NodeSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cpus: default_cpus(),
            memory: default_memory(),
            disk: default_disk(),
        }
    }
}

fn default_cpus() -> u32 {
    2
}

fn default_memory() -> String {
    "2G".to_string()
}

fn default_disk() -> String {
    "10G".to_string()
}

/// Top-level cluster configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Cloud image handed to the hypervisor on launch
    pub image: String,
    pub control_plane: NodeSpec,
    pub workers: Vec<NodeSpec>,
    pub pod_network_cidr: String,
    /// pkgs.k8s.io channel, e.g. `v1.30`
    pub kubernetes_channel: String,
    pub cni_manifest_url: String,
    pub command_timeout_secs: u64,
    pub launch_timeout_secs: u64,
    pub kubeconfig_path: String,
    pub state_dir: String,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            image: "22.04".to_string(),
            control_plane: NodeSpec::named("control-plane"),
            workers: vec![NodeSpec::named("worker-1")],
            pod_network_cidr: "10.244.0.0/16".to_string(),
            kubernetes_channel: "v1.30".to_string(),
            cni_manifest_url:
                "https://github.com/flannel-io/flannel/releases/latest/download/kube-flannel.yml"
                    .to_string(),
            command_timeout_secs: 600,
            launch_timeout_secs: 900,
            kubeconfig_path: "~/.kube/config".to_string(),
            state_dir: "~/.local/state/kubeduo".to_string(),
        }
    }
}

impl ClusterConfig {
    /// Load from `path`, or from confy's default location when `None`.
    /// A missing file is created with defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config: ClusterConfig = match path {
            Some(path) => confy::load_path(path).context(LoadSnafu)?,
            None => confy::load(APP_NAME, CONFIG_NAME).context(LoadSnafu)?,
        };
        config.validate()?;
        tracing::debug!(
            "Loaded cluster config: {} control plane + {} workers",
            config.control_plane.name,
            config.workers.len()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for node in self.nodes() {
            ensure!(!node.name.trim().is_empty(), EmptyNodeNameSnafu);
            ensure!(
                node.name != HOST,
                ReservedNodeNameSnafu {
                    name: node.name.clone()
                }
            );
            ensure!(
                seen.insert(node.name.as_str()),
                DuplicateNodeSnafu {
                    name: node.name.clone()
                }
            );
            ensure!(
                node.cpus >= 1,
                NoCpuSnafu {
                    name: node.name.clone()
                }
            );
        }

        ensure!(
            is_ipv4_cidr(&self.pod_network_cidr),
            InvalidCidrSnafu {
                cidr: self.pod_network_cidr.clone()
            }
        );

        let bare = self.kubernetes_channel.trim_start_matches('v');
        semver::Version::parse(&format!("{bare}.0")).context(InvalidChannelSnafu {
            channel: self.kubernetes_channel.clone(),
        })?;

        ensure!(
            self.command_timeout_secs > 0,
            ZeroTimeoutSnafu {
                field: "command_timeout_secs"
            }
        );
        ensure!(
            self.launch_timeout_secs > 0,
            ZeroTimeoutSnafu {
                field: "launch_timeout_secs"
            }
        );
        Ok(())
    }

    /// Control plane first, then workers in declaration order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeSpec> {
        std::iter::once(&self.control_plane).chain(self.workers.iter())
    }

    /// Channel normalized to the `vMAJOR.MINOR` form used in repository URLs.
    pub fn channel(&self) -> String {
        format!("v{}", self.kubernetes_channel.trim_start_matches('v'))
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_secs(self.launch_timeout_secs)
    }

    pub fn kubeconfig_path(&self) -> PathBuf {
        expand_path(&self.kubeconfig_path)
    }

    pub fn state_dir(&self) -> PathBuf {
        expand_path(&self.state_dir)
    }

    pub fn run_record_path(&self) -> PathBuf {
        self.state_dir().join("run-record.jsonl")
    }
}

/// Expand `~` and environment variables; falls back to the raw string.
pub fn expand_path(path: &str) -> PathBuf {
    let home = || dirs::home_dir().map(|h| h.to_string_lossy().into_owned());
    let expanded =
        shellexpand::full_with_context_no_errors(path, home, |var| std::env::var(var).ok());
    PathBuf::from(expanded.into_owned())
}

fn is_ipv4_cidr(cidr: &str) -> bool {
    let Some((addr, prefix)) = cidr.split_once('/') else {
        return false;
    };
    addr.parse::<Ipv4Addr>().is_ok() && prefix.parse::<u8>().is_ok_and(|p| p <= 32)
}
