//! Multipass backend
//!
//! State and addresses come from `--format json`, the only output format
//! Multipass documents as stable.

use super::{CommandOutput, Hypervisor, InstanceInfo, run_program};
use crate::config::NodeSpec;
use crate::error::{GatewayError, LifecycleSnafu, MalformedOutputSnafu};
use crate::node::NodeState;
use async_trait::async_trait;
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::HashMap;
use std::net::Ipv4Addr;

#[derive(Debug, Clone)]
pub struct Multipass {
    program: String,
}

impl Default for Multipass {
    fn default() -> Self {
        Self::new("multipass")
    }
}

impl Multipass {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> Result<CommandOutput, GatewayError> {
        tracing::debug!("{} {}", self.program, args.join(" "));
        run_program(&self.program, args).await
    }

    /// Run and insist on exit 0; used for read-only inspection.
    async fn run_checked(&self, args: &[&str]) -> Result<CommandOutput, GatewayError> {
        let output = self.run(args).await?;
        if !output.success() {
            return LifecycleSnafu {
                program: format!("{} {}", self.program, args.join(" ")),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .fail();
        }
        Ok(output)
    }
}

#[derive(Debug, Deserialize)]
struct ListOutput {
    list: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    state: String,
    #[serde(default)]
    ipv4: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InfoOutput {
    info: HashMap<String, InfoEntry>,
}

#[derive(Debug, Deserialize)]
struct InfoEntry {
    state: String,
    #[serde(default)]
    ipv4: Vec<String>,
}

fn map_state(state: &str) -> NodeState {
    match state {
        "Running" => NodeState::Running,
        "Starting" | "Restarting" => NodeState::Creating,
        "Deleted" => NodeState::Deleted,
        _ => NodeState::Stopped,
    }
}

fn first_address(addresses: &[String]) -> Option<Ipv4Addr> {
    addresses.iter().find_map(|a| a.parse().ok())
}

fn parse_list(json: &str) -> Result<Vec<InstanceInfo>, serde_json::Error> {
    let parsed: ListOutput = serde_json::from_str(json)?;
    Ok(parsed
        .list
        .into_iter()
        .map(|entry| InstanceInfo {
            state: map_state(&entry.state),
            address: first_address(&entry.ipv4),
            name: entry.name,
        })
        .collect())
}

fn parse_info(name: &str, json: &str) -> Result<Option<InstanceInfo>, serde_json::Error> {
    let parsed: InfoOutput = serde_json::from_str(json)?;
    Ok(parsed.info.get(name).map(|entry| InstanceInfo {
        name: name.to_string(),
        state: map_state(&entry.state),
        address: first_address(&entry.ipv4),
    }))
}

#[async_trait]
impl Hypervisor for Multipass {
    fn name(&self) -> &str {
        "multipass"
    }

    async fn list(&self) -> Result<Vec<InstanceInfo>, GatewayError> {
        let output = self.run_checked(&["list", "--format", "json"]).await?;
        parse_list(&output.stdout).context(MalformedOutputSnafu {
            program: "multipass list",
        })
    }

    async fn info(&self, name: &str) -> Result<Option<InstanceInfo>, GatewayError> {
        let output = self.run(&["info", name, "--format", "json"]).await?;
        if !output.success() {
            if output.stderr.contains("does not exist") {
                return Ok(None);
            }
            return LifecycleSnafu {
                program: format!("multipass info {name}"),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            }
            .fail();
        }
        parse_info(name, &output.stdout).context(MalformedOutputSnafu {
            program: "multipass info",
        })
    }

    async fn launch(&self, image: &str, node: &NodeSpec) -> Result<CommandOutput, GatewayError> {
        let cpus = node.cpus.to_string();
        self.run(&[
            "launch",
            image,
            "--name",
            &node.name,
            "--cpus",
            &cpus,
            "--memory",
            &node.memory,
            "--disk",
            &node.disk,
        ])
        .await
    }

    async fn start(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        self.run(&["start", name]).await
    }

    async fn exec(&self, name: &str, command: &str) -> Result<CommandOutput, GatewayError> {
        run_program(&self.program, &["exec", name, "--", "bash", "-c", command]).await
    }

    async fn stop(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        self.run(&["stop", name]).await
    }

    async fn delete(&self, name: &str) -> Result<CommandOutput, GatewayError> {
        self.run(&["delete", name]).await
    }

    async fn purge(&self) -> Result<CommandOutput, GatewayError> {
        self.run(&["purge"]).await
    }
}
