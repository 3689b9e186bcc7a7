//! Error types for the provisioning engine
//!
//! Step failures are not errors: they are reported as data inside
//! [`crate::engine::RunResult`]. The enums here cover invalid plans,
//! collaborator plumbing, the run record and configuration.

use snafu::Snafu;
use std::path::PathBuf;

/// Invalid step graph, detected before any remote command runs.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PlanError {
    #[snafu(display("duplicate step id `{id}`"))]
    DuplicateStep { id: String },

    #[snafu(display("step `{step}` targets undeclared node `{node}`"))]
    UndeclaredNode { step: String, node: String },

    #[snafu(display("step `{step}` targets `{target}` but no such nodes are declared"))]
    EmptyTarget { step: String, target: String },

    #[snafu(display(
        "step `{step}` depends on node `{node}` before any earlier step provisions it"
    ))]
    NodeNotProvisioned { step: String, node: String },
}

/// Failures talking to the hypervisor or local shell.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum GatewayError {
    #[snafu(display("failed to execute `{program}`: {source}"))]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[snafu(display("`{program}` produced unreadable output: {source}"))]
    MalformedOutput {
        program: String,
        source: serde_json::Error,
    },

    #[snafu(display("`{program}` failed (exit {exit_code}): {stderr}"))]
    Lifecycle {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[snafu(display("`{program}` timed out after {}s", after.as_secs()))]
    LifecycleTimeout {
        program: String,
        after: std::time::Duration,
    },

    #[snafu(display("node `{node}` has no address yet"))]
    NoAddress { node: String },

    #[snafu(display("query `{query}` exited with {exit_code}: {stderr}"))]
    QueryFailed {
        query: String,
        exit_code: i32,
        stderr: String,
    },

    #[snafu(display("query `{query}` timed out"))]
    QueryTimeout { query: String },

    #[snafu(display("query `{query}` output did not contain a {format}"))]
    Extract { query: String, format: String },
}

/// Failures reading or appending the run record.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RecordError {
    #[snafu(display("failed to open run record {}: {source}", path.display()))]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to append to run record {}: {source}", path.display()))]
    Append {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("run record {} line {line} is corrupt: {source}", path.display()))]
    Corrupt {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    #[snafu(display("failed to encode run record entry: {source}"))]
    Encode { source: serde_json::Error },
}

/// Invalid or unreadable cluster configuration.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConfigError {
    #[snafu(display("failed to load configuration: {source}"))]
    Load { source: confy::ConfyError },

    #[snafu(display("node name must not be empty"))]
    EmptyNodeName,

    #[snafu(display("node name `{name}` is reserved for host-side steps"))]
    ReservedNodeName { name: String },

    #[snafu(display("node `{name}` is declared twice"))]
    DuplicateNode { name: String },

    #[snafu(display("node `{name}` needs at least one CPU"))]
    NoCpu { name: String },

    #[snafu(display("`{cidr}` is not an IPv4 CIDR"))]
    InvalidCidr { cidr: String },

    #[snafu(display("`{channel}` is not a Kubernetes channel like v1.30: {source}"))]
    InvalidChannel {
        channel: String,
        source: semver::Error,
    },

    #[snafu(display("`{field}` must be greater than zero"))]
    ZeroTimeout { field: &'static str },
}

/// Failures that stop the engine itself, as opposed to a step.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum EngineError {
    #[snafu(context(false), display("run record unavailable: {source}"))]
    Record { source: RecordError },

    #[snafu(display("could not inspect nodes through the hypervisor: {source}"))]
    Reconcile { source: GatewayError },
}
