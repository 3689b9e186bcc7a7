//! Execution engine
//!
//! Walks a plan one step and one target at a time. Provisioning fails fast
//! on a critical step; teardown records every failure and keeps going.

use crate::config::ClusterConfig;
use crate::error::{EngineError, ReconcileSnafu};
use crate::gateway::{CommandResult, CommandStatus, Extractor, RemoteGateway};
use crate::node::{HOST, Inventory, NodeState, TargetRef};
use crate::recorder::{Outcome, RunRecord, StepStatus};
use crate::registry::{ClusterPlan, Direction};
use crate::step::{Action, KUBECONFIG_QUERY, Predicate, Step};
use snafu::ResultExt;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Lines of captured output kept per record entry.
const OUTPUT_TAIL_LINES: usize = 40;
const REDACTED: &str = "<redacted>";

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub image: String,
    pub command_timeout: Duration,
    pub launch_timeout: Duration,
}

impl From<&ClusterConfig> for EngineOptions {
    fn from(config: &ClusterConfig) -> Self {
        Self {
            image: config.image.clone(),
            command_timeout: config.command_timeout(),
            launch_timeout: config.launch_timeout(),
        }
    }
}

/// Run-level cancellation. Checked between dispatches; the command in
/// flight always finishes first.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a target failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    RemoteCommandFailure { exit_code: i32 },
    Timeout { after: Duration },
    Gateway(String),
    Query(String),
    Template(String),
    Host(String),
    Unsupported(String),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::RemoteCommandFailure { exit_code } => write!(f, "exited with {exit_code}"),
            FailureKind::Timeout { after } => write!(f, "timed out after {}s", after.as_secs()),
            FailureKind::Gateway(msg) => write!(f, "gateway error: {msg}"),
            FailureKind::Query(msg) => write!(f, "query failed: {msg}"),
            FailureKind::Template(msg) => write!(f, "template error: {msg}"),
            FailureKind::Host(msg) => write!(f, "host error: {msg}"),
            FailureKind::Unsupported(msg) => write!(f, "unsupported: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub step: String,
    pub node: String,
    pub kind: FailureKind,
    /// Captured output, redacted.
    pub output: String,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step `{}` on {} {}", self.step, self.node, self.kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOutcome {
    Completed,
    /// Run record already shows success; nothing dispatched.
    AlreadyComplete,
    /// Predicate reported the work already done.
    Satisfied,
    /// Teardown found nothing to act on.
    Absent,
    Failed(StepFailure),
}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub id: String,
    pub label: String,
    pub targets: Vec<(String, TargetOutcome)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Succeeded,
    /// Best-effort failures only.
    SucceededWithWarnings,
    /// A critical step failed.
    Aborted,
    /// Node deletion or the hypervisor purge failed.
    Failed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct RunResult {
    pub run_id: Uuid,
    pub direction: Direction,
    pub status: RunStatus,
    /// The failure that aborted the run.
    pub failure: Option<StepFailure>,
    pub warnings: Vec<StepFailure>,
    pub steps: Vec<StepReport>,
    /// Commands dispatched through the gateway during this run.
    pub remote_commands: usize,
    pub log_path: Option<PathBuf>,
}

impl RunResult {
    pub fn is_success(&self) -> bool {
        matches!(
            self.status,
            RunStatus::Succeeded | RunStatus::SucceededWithWarnings
        )
    }
}

/// Progress hooks for banners and UIs.
pub trait RunObserver: Send + Sync {
    fn step_started(&self, _index: usize, _total: usize, _step: &Step) {}
    fn target_finished(&self, _step: &Step, _target: &TargetRef, _outcome: &TargetOutcome) {}
}

pub struct SilentObserver;

impl RunObserver for SilentObserver {}

/// Result of one dispatch, before it is recorded.
struct Attempt {
    outcome: Outcome,
    output: String,
    failure: Option<FailureKind>,
}

impl Attempt {
    fn ok(output: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Success,
            output: output.into(),
            failure: None,
        }
    }

    fn failed(kind: FailureKind, output: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Failed,
            output: output.into(),
            failure: Some(kind),
        }
    }

    fn from_command(result: &CommandResult) -> Self {
        let output = result.combined();
        match result.status {
            CommandStatus::Exited(0) => Self::ok(output),
            CommandStatus::Exited(exit_code) => {
                Self::failed(FailureKind::RemoteCommandFailure { exit_code }, output)
            }
            CommandStatus::TimedOut(after) => Self {
                outcome: Outcome::TimedOut,
                output,
                failure: Some(FailureKind::Timeout { after }),
            },
        }
    }
}

pub struct Engine {
    gateway: RemoteGateway,
    inventory: Inventory,
    record: RunRecord,
    options: EngineOptions,
    observer: Arc<dyn RunObserver>,
    cancel: CancelFlag,
}

impl Engine {
    pub fn new(
        gateway: RemoteGateway,
        inventory: Inventory,
        record: RunRecord,
        options: EngineOptions,
    ) -> Self {
        Self {
            gateway,
            inventory,
            record,
            options,
            observer: Arc::new(SilentObserver),
            cancel: CancelFlag::default(),
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observer = observer;
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    pub fn inventory(&self) -> &Inventory {
        &self.inventory
    }

    pub async fn run(&mut self, plan: &ClusterPlan) -> Result<RunResult, EngineError> {
        let run_id = Uuid::new_v4();
        let direction = plan.direction();
        let dispatched_before = self.gateway.dispatched();
        info!(%run_id, "Starting {direction} run with {} steps", plan.len());

        self.reconcile(run_id, plan).await?;

        let mut failure = None;
        let mut warnings = Vec::new();
        let mut reports = Vec::new();
        let mut cancelled = false;
        let mut deletion_failed = false;
        // Node deletion and host cleanup still run after an interrupt.
        let runs_after_cancel = |step: &Step| direction == Direction::Teardown && step.terminal;

        'steps: for (index, step) in plan.steps().iter().enumerate() {
            if self.cancel.is_cancelled() && !runs_after_cancel(step) {
                cancelled = true;
                if direction == Direction::Provision {
                    warn!("Run cancelled before `{}`", step.id);
                    break;
                }
                warn!("Run cancelled; skipping `{}`", step.id);
                continue;
            }
            self.observer.step_started(index, plan.len(), step);
            info!(step = %step.id, "{}", step.label);

            let mut report = StepReport {
                id: step.id.clone(),
                label: step.label.clone(),
                targets: Vec::new(),
            };

            for target in self.inventory.resolve(&step.target) {
                if self.cancel.is_cancelled() && !runs_after_cancel(step) {
                    warn!("Run cancelled before `{}` on {target}", step.id);
                    cancelled = true;
                    break;
                }

                let outcome = self.run_target(run_id, direction, step, &target).await?;
                self.observer.target_finished(step, &target, &outcome);
                report.targets.push((target.key().to_string(), outcome.clone()));

                if let TargetOutcome::Failed(step_failure) = outcome {
                    if step.is_critical() {
                        error!("Critical {step_failure}; halting");
                        failure = Some(step_failure);
                        reports.push(report);
                        break 'steps;
                    }
                    warn!("Best-effort {step_failure}; continuing");
                    deletion_failed |= step.action == Action::DeleteNodes;
                    warnings.push(step_failure);
                }
            }

            if step.action == Action::DeleteNodes {
                if let Some(purge_failure) = self.purge(run_id, direction, step).await? {
                    deletion_failed = true;
                    warnings.push(purge_failure);
                }
            }
            reports.push(report);
        }

        let status = if failure.is_some() {
            RunStatus::Aborted
        } else if cancelled {
            RunStatus::Cancelled
        } else if deletion_failed {
            RunStatus::Failed
        } else if warnings.is_empty() {
            RunStatus::Succeeded
        } else {
            RunStatus::SucceededWithWarnings
        };

        let result = RunResult {
            run_id,
            direction,
            status,
            failure,
            warnings,
            steps: reports,
            remote_commands: self.gateway.dispatched() - dispatched_before,
            log_path: self.record.path().map(Path::to_path_buf),
        };
        info!(
            %run_id,
            "Finished {direction} run: {:?} ({} remote commands, {} warnings)",
            result.status,
            result.remote_commands,
            result.warnings.len()
        );
        Ok(result)
    }

    /// Refresh node states. In the provision direction a missing node
    /// invalidates every recorded success, and a node that exists but is not
    /// running invalidates its launch so the run starts it again.
    async fn reconcile(&mut self, run_id: Uuid, plan: &ClusterPlan) -> Result<(), EngineError> {
        let direction = plan.direction();
        let instances = match self.gateway.list().await {
            Ok(instances) => instances,
            Err(err) if direction == Direction::Teardown => {
                warn!("Could not list instances ({err}); teardown continues blind");
                return Ok(());
            }
            Err(err) => return Err(err).context(ReconcileSnafu),
        };

        let missing = self.inventory.reconcile(&instances);
        if direction == Direction::Teardown {
            return Ok(());
        }

        if !missing.is_empty() {
            let reason = format!("nodes absent: {}", missing.join(", "));
            let dropped = self.record.invalidate_all(run_id, &reason)?;
            if dropped > 0 {
                warn!("{reason}; invalidated {dropped} recorded successes");
            }
            return Ok(());
        }

        let idle: Vec<(String, NodeState)> = self
            .inventory
            .nodes()
            .iter()
            .filter(|n| n.state != NodeState::Running)
            .map(|n| (n.name().to_string(), n.state))
            .collect();
        for step in plan.steps().iter().filter(|s| s.action == Action::Launch) {
            for (node, state) in &idle {
                let reason = format!("{node} is {state}");
                if self.record.invalidate(run_id, &step.id, node, &reason)? {
                    warn!("{reason}; `{}` will run again", step.id);
                }
            }
        }
        Ok(())
    }

    /// Append to the run record. Teardown carries on when the record cannot
    /// be written.
    fn note(
        &mut self,
        run_id: Uuid,
        direction: Direction,
        step: &str,
        node: &str,
        outcome: Outcome,
        output: impl Into<String>,
    ) -> Result<(), EngineError> {
        match self.record.record(run_id, step, node, outcome, output) {
            Ok(()) => Ok(()),
            Err(err) if direction == Direction::Teardown => {
                warn!("Could not record `{step}` on {node}: {err}");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn run_target(
        &mut self,
        run_id: Uuid,
        direction: Direction,
        step: &Step,
        target: &TargetRef,
    ) -> Result<TargetOutcome, EngineError> {
        let key = target.key().to_string();

        if direction == Direction::Provision {
            if self.record.status(&step.id, &key) == StepStatus::Success {
                info!("`{}` already complete on {key}", step.id);
                return Ok(TargetOutcome::AlreadyComplete);
            }
            if let Some(predicate) = &step.skip_if {
                if self.satisfied(step, predicate, target).await {
                    info!("`{}` already satisfied on {key}", step.id);
                    self.note(run_id, direction, &step.id, &key, Outcome::Success, "already satisfied")?;
                    return Ok(TargetOutcome::Satisfied);
                }
            }
        } else if let Some(node) = target.node() {
            if !self.node_exists(node).await {
                info!("{node} is absent; skipping `{}`", step.id);
                self.note(run_id, direction, &step.id, &key, Outcome::Skipped, "absent")?;
                return Ok(TargetOutcome::Absent);
            }
        }

        let attempt = self.dispatch(step, target).await;
        let output = tail(&attempt.output, OUTPUT_TAIL_LINES);
        self.note(run_id, direction, &step.id, &key, attempt.outcome, output.clone())?;

        Ok(match attempt.failure {
            None => TargetOutcome::Completed,
            Some(kind) => TargetOutcome::Failed(StepFailure {
                step: step.id.clone(),
                node: key,
                kind,
                output,
            }),
        })
    }

    /// Teardown-side existence check. If the hypervisor cannot answer, the
    /// node is assumed present and the action itself decides.
    async fn node_exists(&mut self, node: &str) -> bool {
        match self.gateway.info(node).await {
            Ok(Some(info)) => {
                self.inventory.update(node, info.state, info.address);
                info.state.exists()
            }
            Ok(None) => {
                self.inventory.update(node, NodeState::Absent, None);
                false
            }
            Err(err) => {
                warn!("Could not inspect {node}: {err}");
                true
            }
        }
    }

    async fn satisfied(&self, step: &Step, predicate: &Predicate, target: &TargetRef) -> bool {
        match (predicate, target) {
            (Predicate::NodeRunning, TargetRef::Node(node)) => {
                matches!(self.gateway.info(node).await, Ok(Some(info)) if info.state == NodeState::Running)
            }
            (Predicate::NodeRunning, TargetRef::Host) => false,
            (Predicate::Shell(check), _) => self
                .gateway
                .execute(target, check, self.timeout_for(step))
                .await
                .is_ok_and(|r| r.success()),
        }
    }

    fn timeout_for(&self, step: &Step) -> Duration {
        step.timeout.unwrap_or(match step.action {
            Action::Launch => self.options.launch_timeout,
            _ => self.options.command_timeout,
        })
    }

    async fn dispatch(&mut self, step: &Step, target: &TargetRef) -> Attempt {
        let limit = self.timeout_for(step);
        match (&step.action, target) {
            (Action::Launch, TargetRef::Node(node)) => self.launch(node, limit).await,
            (Action::DeleteNodes, TargetRef::Node(node)) => self.delete(node, limit).await,
            (Action::Shell(template), _) => self.shell(step, template, target, limit).await,
            (Action::WriteKubeconfig { path }, TargetRef::Host) => {
                self.write_kubeconfig(step, path, limit).await
            }
            (Action::RemovePath(path), TargetRef::Host) => remove_path(path),
            (action, target) => Attempt::failed(
                FailureKind::Unsupported(format!("{} on {target}", action.describe())),
                "",
            ),
        }
    }

    /// Resolve the step's queries. Values are only held for this dispatch.
    async fn resolve_queries(
        &self,
        step: &Step,
        limit: Duration,
    ) -> Result<HashMap<String, String>, Attempt> {
        let mut values = HashMap::new();
        for query in &step.queries {
            match self.gateway.query(query, limit).await {
                Ok(value) => {
                    tracing::debug!("Resolved query `{}`", query.name);
                    values.insert(query.name.clone(), value);
                }
                Err(err) => {
                    return Err(Attempt::failed(FailureKind::Query(err.to_string()), ""));
                }
            }
        }
        Ok(values)
    }

    async fn shell(
        &self,
        step: &Step,
        template: &str,
        target: &TargetRef,
        limit: Duration,
    ) -> Attempt {
        let values = match self.resolve_queries(step, limit).await {
            Ok(values) => values,
            Err(attempt) => return attempt,
        };

        let command = if step.queries.is_empty() {
            template.to_string()
        } else {
            match render(template, target, &values) {
                Ok(command) => command,
                Err(msg) => return Attempt::failed(FailureKind::Template(msg), ""),
            }
        };

        let mut attempt = match self.gateway.execute(target, &command, limit).await {
            Ok(result) => Attempt::from_command(&result),
            Err(err) => Attempt::failed(FailureKind::Gateway(err.to_string()), ""),
        };
        attempt.output = redact(&attempt.output, values.values());
        attempt
    }

    async fn launch(&mut self, node: &str, limit: Duration) -> Attempt {
        let Some(spec) = self.inventory.get(node).map(|n| n.spec.clone()) else {
            return Attempt::failed(FailureKind::Unsupported(format!("unknown node {node}")), "");
        };

        let existing = match self.gateway.info(node).await {
            Ok(existing) => existing,
            Err(err) => return Attempt::failed(FailureKind::Gateway(err.to_string()), ""),
        };

        self.inventory.update(node, NodeState::Creating, None);
        let result = match existing.map(|i| i.state) {
            Some(NodeState::Running) => return self.refresh(node, Attempt::ok("already running")).await,
            Some(NodeState::Stopped | NodeState::Creating) => {
                info!("Starting existing instance {node}");
                self.gateway.start(node, limit).await
            }
            Some(NodeState::Deleted) => {
                info!("Purging deleted instance {node} before relaunch");
                if let Err(err) = self.gateway.purge(limit).await {
                    return Attempt::failed(FailureKind::Gateway(err.to_string()), "");
                }
                self.gateway.launch(&self.options.image, &spec, limit).await
            }
            Some(NodeState::Absent) | None => {
                info!("Launching {node} ({} CPU, {} RAM, {} disk)", spec.cpus, spec.memory, spec.disk);
                self.gateway.launch(&self.options.image, &spec, limit).await
            }
        };

        let attempt = match result {
            Ok(result) => Attempt::from_command(&result),
            Err(err) => Attempt::failed(FailureKind::Gateway(err.to_string()), ""),
        };
        self.refresh(node, attempt).await
    }

    /// Update the inventory from the hypervisor after a lifecycle change.
    async fn refresh(&mut self, node: &str, attempt: Attempt) -> Attempt {
        match self.gateway.info(node).await {
            Ok(Some(info)) => self.inventory.update(node, info.state, info.address),
            Ok(None) => self.inventory.update(node, NodeState::Absent, None),
            Err(err) => warn!("Could not refresh {node}: {err}"),
        }
        attempt
    }

    async fn delete(&mut self, node: &str, limit: Duration) -> Attempt {
        match self.gateway.stop(node, limit).await {
            Ok(result) if !result.success() => {
                warn!("Stopping {node} failed ({}); deleting anyway", result.combined());
            }
            Err(err) => warn!("Stopping {node} failed ({err}); deleting anyway"),
            Ok(_) => {}
        }

        let attempt = match self.gateway.delete(node, limit).await {
            Ok(result) => Attempt::from_command(&result),
            Err(err) => Attempt::failed(FailureKind::Gateway(err.to_string()), ""),
        };
        if attempt.failure.is_none() {
            self.inventory.update(node, NodeState::Deleted, None);
        }
        attempt
    }

    /// Purge once after a `DeleteNodes` step, recorded against the host.
    async fn purge(
        &mut self,
        run_id: Uuid,
        direction: Direction,
        step: &Step,
    ) -> Result<Option<StepFailure>, EngineError> {
        let attempt = match self.gateway.purge(self.timeout_for(step)).await {
            Ok(result) => Attempt::from_command(&result),
            Err(err) => Attempt::failed(FailureKind::Gateway(err.to_string()), ""),
        };
        let output = tail(&attempt.output, OUTPUT_TAIL_LINES);
        self.note(run_id, direction, &step.id, HOST, attempt.outcome, output.clone())?;
        Ok(attempt.failure.map(|kind| StepFailure {
            step: step.id.clone(),
            node: HOST.to_string(),
            kind,
            output,
        }))
    }

    async fn write_kubeconfig(&self, step: &Step, path: &Path, limit: Duration) -> Attempt {
        let values = match self.resolve_queries(step, limit).await {
            Ok(values) => values,
            Err(attempt) => return attempt,
        };
        let Some(contents) = values.get(KUBECONFIG_QUERY) else {
            return Attempt::failed(
                FailureKind::Unsupported(format!("step declares no `{KUBECONFIG_QUERY}` query")),
                "",
            );
        };
        match install_kubeconfig(path, contents) {
            Ok(server) => Attempt::ok(format!("wrote {} (server {server})", path.display())),
            Err(msg) => Attempt::failed(FailureKind::Host(msg), ""),
        }
    }
}

fn render(
    template: &str,
    target: &TargetRef,
    values: &HashMap<String, String>,
) -> Result<String, String> {
    let mut context = tera::Context::new();
    context.insert("node", target.key());
    for (name, value) in values {
        context.insert(name.as_str(), value);
    }
    tera::Tera::one_off(template, &context, false).map_err(|err| error_chain(&err))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}

/// Replace query values, and any bootstrap token inside them, with a marker.
fn redact<'a>(text: &str, secrets: impl Iterator<Item = &'a String>) -> String {
    let mut needles: Vec<String> = Vec::new();
    for secret in secrets {
        let secret = secret.trim();
        if secret.is_empty() {
            continue;
        }
        needles.push(secret.to_string());
        if let Some(token) = Extractor::BootstrapToken.extract(secret) {
            needles.push(token);
        }
    }
    // Longest first so a token inside a full join command is not split.
    needles.sort_by_key(|n| std::cmp::Reverse(n.len()));

    let mut redacted = text.to_string();
    for needle in &needles {
        redacted = redacted.replace(needle.as_str(), REDACTED);
    }
    redacted
}

fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}

/// Validate and write an admin kubeconfig with owner-only permissions.
/// Returns the API server URL it points at.
fn install_kubeconfig(path: &Path, contents: &str) -> Result<String, String> {
    let parsed: serde_yaml::Value =
        serde_yaml::from_str(contents).map_err(|err| format!("kubeconfig is not YAML: {err}"))?;
    let server = parsed
        .get("clusters")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("cluster"))
        .and_then(|c| c.get("server"))
        .and_then(serde_yaml::Value::as_str)
        .ok_or_else(|| "kubeconfig has no clusters[0].cluster.server".to_string())?
        .to_string();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|err| format!("cannot create {}: {err}", parent.display()))?;
    }
    write_private(path, contents).map_err(|err| format!("cannot write {}: {err}", path.display()))?;
    Ok(server)
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies on creation
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(contents.as_bytes())?;
    if !contents.ends_with('\n') {
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &str) -> std::io::Result<()> {
    std::fs::write(path, contents)
}

fn remove_path(path: &Path) -> Attempt {
    match std::fs::remove_file(path) {
        Ok(()) => Attempt::ok(format!("removed {}", path.display())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            Attempt::ok(format!("{} already absent", path.display()))
        }
        Err(err) => Attempt::failed(
            FailureKind::Host(format!("cannot remove {}: {err}", path.display())),
            "",
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KUBECONFIG: &str = "apiVersion: v1\nclusters:\n- cluster:\n    certificate-authority-data: Zm9v\n    server: https://192.168.64.5:6443\n  name: kubernetes\nkind: Config\n";

    #[test]
    fn test_redact_join_command_and_token() {
        let secret = "kubeadm join 10.0.0.5:6443 --token abcdef.0123456789abcdef --discovery-token-ca-cert-hash sha256:aa".to_string();
        let text = format!("ran: {secret}\nerror: token abcdef.0123456789abcdef expired");
        let redacted = redact(&text, [secret].iter());
        assert!(!redacted.contains("abcdef.0123456789abcdef"));
        assert_eq!(redacted.matches(REDACTED).count(), 2);
    }

    #[test]
    fn test_render_threads_values() {
        let mut values = HashMap::new();
        values.insert("join_command".to_string(), "kubeadm join x".to_string());
        let rendered = render(
            "sudo {{ join_command }} --node-name {{ node }}",
            &TargetRef::Node("worker-1".into()),
            &values,
        )
        .unwrap();
        assert_eq!(rendered, "sudo kubeadm join x --node-name worker-1");
    }

    #[test]
    fn test_render_reports_missing_value() {
        let err = render("{{ missing }}", &TargetRef::Host, &HashMap::new()).unwrap_err();
        assert!(err.contains("missing"));
    }

    #[test]
    fn test_tail_keeps_last_lines() {
        assert_eq!(tail("a\nb\nc", 2), "b\nc");
        assert_eq!(tail("", 2), "");
    }

    #[cfg(unix)]
    #[test]
    fn test_install_kubeconfig_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".kube").join("config");
        let server = install_kubeconfig(&path, KUBECONFIG).unwrap();
        assert_eq!(server, "https://192.168.64.5:6443");

        let mode = std::fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_install_kubeconfig_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config");
        assert!(install_kubeconfig(&path, "clusters: [").is_err());
        assert!(install_kubeconfig(&path, "kind: Config\n").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_remove_missing_path_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let attempt = remove_path(&dir.path().join("nope"));
        assert!(attempt.failure.is_none());
    }
}
