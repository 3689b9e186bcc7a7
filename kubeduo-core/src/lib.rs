//! kubeduo core: a provisioning orchestrator for a two-node kubeadm cluster
//!
//! A [`ClusterPlan`] is an ordered list of [`Step`]s built by the
//! [`StepRegistry`]. The [`Engine`] walks it against an [`Inventory`] of
//! VMs, dispatching every command through a [`RemoteGateway`] and appending
//! each outcome to a [`RunRecord`]. Teardown plans are derived from the
//! forward plan by [`teardown::derive`].

pub mod cluster;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod node;
pub mod recorder;
pub mod registry;
pub mod step;
pub mod teardown;

pub use config::{ClusterConfig, NodeSpec};
pub use engine::{
    CancelFlag, Engine, EngineOptions, FailureKind, RunObserver, RunResult, RunStatus,
    StepFailure, StepReport, TargetOutcome,
};
pub use error::{ConfigError, EngineError, GatewayError, PlanError, RecordError};
pub use gateway::{CommandOutput, Hypervisor, InstanceInfo, Multipass, RemoteGateway};
pub use node::{Inventory, Node, NodeRole, NodeState, Target, TargetRef};
pub use recorder::{Outcome, RecordEntry, RunRecord, StepStatus};
pub use registry::{ClusterPlan, Direction, StepRegistry};
pub use step::{Action, Policy, Predicate, Query, QuerySource, Step};
