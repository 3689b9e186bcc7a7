//! Remote command gateway
//!
//! The engine never talks to a hypervisor directly. It asks the gateway to
//! run a command on a target (a VM or the host), with a bound the gateway
//! enforces itself, so every backend gets the same timeout semantics.

mod extract;
mod multipass;

pub use extract::Extractor;
pub use multipass::Multipass;

use crate::config::NodeSpec;
use crate::error::{
    ExtractSnafu, GatewayError, LifecycleTimeoutSnafu, NoAddressSnafu, QueryFailedSnafu,
    QueryTimeoutSnafu, SpawnSnafu,
};
use crate::node::{NodeState, TargetRef};
use crate::step::{Query, QuerySource};
use async_trait::async_trait;
use snafu::{OptionExt, ResultExt};
use std::future::Future;
use std::net::Ipv4Addr;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Bound for `list`/`info`, which should answer quickly.
const INSPECT_TIMEOUT: Duration = Duration::from_secs(60);

/// Raw output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Exited(i32),
    TimedOut(Duration),
}

/// Outcome of a dispatched command, as seen by the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub status: CommandStatus,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl CommandResult {
    fn exited(output: CommandOutput, elapsed: Duration) -> Self {
        Self {
            status: CommandStatus::Exited(output.exit_code),
            stdout: output.stdout,
            stderr: output.stderr,
            elapsed,
        }
    }

    fn timed_out(after: Duration, elapsed: Duration) -> Self {
        Self {
            status: CommandStatus::TimedOut(after),
            stdout: String::new(),
            stderr: String::new(),
            elapsed,
        }
    }

    pub fn success(&self) -> bool {
        self.status == CommandStatus::Exited(0)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.status, CommandStatus::TimedOut(_))
    }

    /// stdout followed by stderr, trimmed.
    pub fn combined(&self) -> String {
        let mut out = self.stdout.trim_end().to_string();
        let err = self.stderr.trim_end();
        if !err.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(err);
        }
        out
    }
}

/// What the hypervisor knows about one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub name: String,
    pub state: NodeState,
    pub address: Option<Ipv4Addr>,
}

/// VM lifecycle collaborator.
///
/// Implementations shell out to a hypervisor CLI. They do not enforce
/// timeouts; [`RemoteGateway`] does, by dropping the returned future, so
/// spawned processes must be killed on drop.
#[async_trait]
pub trait Hypervisor: Send + Sync {
    fn name(&self) -> &str;

    async fn list(&self) -> Result<Vec<InstanceInfo>, GatewayError>;

    /// `None` when the instance does not exist.
    async fn info(&self, name: &str) -> Result<Option<InstanceInfo>, GatewayError>;

    async fn launch(&self, image: &str, node: &NodeSpec) -> Result<CommandOutput, GatewayError>;

    async fn start(&self, name: &str) -> Result<CommandOutput, GatewayError>;

    async fn exec(&self, name: &str, command: &str) -> Result<CommandOutput, GatewayError>;

    async fn stop(&self, name: &str) -> Result<CommandOutput, GatewayError>;

    async fn delete(&self, name: &str) -> Result<CommandOutput, GatewayError>;

    /// Permanently remove deleted instances.
    async fn purge(&self) -> Result<CommandOutput, GatewayError>;
}

pub struct RemoteGateway {
    hypervisor: Arc<dyn Hypervisor>,
    dispatched: AtomicUsize,
}

impl RemoteGateway {
    pub fn new(hypervisor: Arc<dyn Hypervisor>) -> Self {
        Self {
            hypervisor,
            dispatched: AtomicUsize::new(0),
        }
    }

    pub fn hypervisor_name(&self) -> &str {
        self.hypervisor.name()
    }

    /// Number of commands dispatched through [`RemoteGateway::execute`].
    pub fn dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Relaxed)
    }

    /// Run `command` on `target`, returning a `TimedOut` result once
    /// `limit` elapses. Spawn failures are errors; non-zero exits are not.
    pub async fn execute(
        &self,
        target: &TargetRef,
        command: &str,
        limit: Duration,
    ) -> Result<CommandResult, GatewayError> {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
        tracing::debug!("Dispatching to {target} (limit {}s)", limit.as_secs());
        match target {
            TargetRef::Node(name) => bounded(limit, self.hypervisor.exec(name, command)).await,
            TargetRef::Host => bounded(limit, run_program("sh", &["-c", command])).await,
        }
    }

    /// Read a value back for template rendering. The caller must not
    /// persist it.
    pub async fn query(&self, query: &Query, limit: Duration) -> Result<String, GatewayError> {
        match &query.source {
            QuerySource::NodeAddress(node) => {
                let info = self.info(node).await?;
                let address = info
                    .and_then(|i| i.address)
                    .context(NoAddressSnafu { node: node.clone() })?;
                Ok(address.to_string())
            }
            QuerySource::Command {
                node,
                command,
                extractor,
            } => {
                let result = self
                    .execute(&TargetRef::Node(node.clone()), command, limit)
                    .await?;
                match result.status {
                    CommandStatus::TimedOut(_) => QueryTimeoutSnafu {
                        query: query.name.clone(),
                    }
                    .fail(),
                    CommandStatus::Exited(0) => {
                        extractor.extract(&result.stdout).context(ExtractSnafu {
                            query: query.name.clone(),
                            format: extractor.format(),
                        })
                    }
                    CommandStatus::Exited(exit_code) => QueryFailedSnafu {
                        query: query.name.clone(),
                        exit_code,
                        stderr: result.stderr.trim().to_string(),
                    }
                    .fail(),
                }
            }
        }
    }

    pub async fn list(&self) -> Result<Vec<InstanceInfo>, GatewayError> {
        inspect("list", self.hypervisor.list()).await
    }

    pub async fn info(&self, name: &str) -> Result<Option<InstanceInfo>, GatewayError> {
        inspect("info", self.hypervisor.info(name)).await
    }

    pub async fn launch(
        &self,
        image: &str,
        node: &NodeSpec,
        limit: Duration,
    ) -> Result<CommandResult, GatewayError> {
        bounded(limit, self.hypervisor.launch(image, node)).await
    }

    pub async fn start(&self, name: &str, limit: Duration) -> Result<CommandResult, GatewayError> {
        bounded(limit, self.hypervisor.start(name)).await
    }

    pub async fn stop(&self, name: &str, limit: Duration) -> Result<CommandResult, GatewayError> {
        bounded(limit, self.hypervisor.stop(name)).await
    }

    pub async fn delete(&self, name: &str, limit: Duration) -> Result<CommandResult, GatewayError> {
        bounded(limit, self.hypervisor.delete(name)).await
    }

    pub async fn purge(&self, limit: Duration) -> Result<CommandResult, GatewayError> {
        bounded(limit, self.hypervisor.purge()).await
    }
}

async fn bounded<F>(limit: Duration, work: F) -> Result<CommandResult, GatewayError>
where
    F: Future<Output = Result<CommandOutput, GatewayError>>,
{
    let started = Instant::now();
    match tokio::time::timeout(limit, work).await {
        Ok(output) => Ok(CommandResult::exited(output?, started.elapsed())),
        Err(_) => {
            tracing::warn!("Command timed out after {}s", limit.as_secs());
            Ok(CommandResult::timed_out(limit, started.elapsed()))
        }
    }
}

async fn inspect<T, F>(what: &str, work: F) -> Result<T, GatewayError>
where
    F: Future<Output = Result<T, GatewayError>>,
{
    match tokio::time::timeout(INSPECT_TIMEOUT, work).await {
        Ok(result) => result,
        Err(_) => LifecycleTimeoutSnafu {
            program: what.to_string(),
            after: INSPECT_TIMEOUT,
        }
        .fail(),
    }
}

/// Spawn a local process and capture its output. The child is killed if
/// the future is dropped, and it gets its own process group so an operator
/// interrupt does not reach it.
pub(crate) async fn run_program(program: &str, args: &[&str]) -> Result<CommandOutput, GatewayError> {
    let mut command = tokio::process::Command::new(program);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let output = command.output().await.context(SpawnSnafu {
        program: program.to_string(),
    })?;
    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_host_command_captures_output() {
        let output = run_program("sh", &["-c", "echo out; echo err >&2; exit 3"])
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_bounded_times_out() {
        let result = bounded(
            Duration::from_millis(100),
            run_program("sh", &["-c", "sleep 5"]),
        )
        .await
        .unwrap();
        assert!(result.is_timeout());
        assert!(result.elapsed < Duration::from_secs(2));
    }

    #[test]
    fn test_combined_output() {
        let result = CommandResult {
            status: CommandStatus::Exited(1),
            stdout: "a\n".into(),
            stderr: "b\n".into(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(result.combined(), "a\nb");
        assert!(!result.success());
    }
}
