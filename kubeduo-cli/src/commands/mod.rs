//! Subcommand handlers

pub mod check;
pub mod destroy;
pub mod plan;
pub mod setup;
pub mod status;

use crate::prereq::check_prerequisites;
use crate::report::{ConsoleObserver, print_prereq_report, print_run_summary};
use anyhow::{Context, Result};
use kubeduo_core::{
    CancelFlag, ClusterConfig, ClusterPlan, Direction, Engine, EngineOptions, Inventory,
    Multipass, RemoteGateway, RunRecord, RunResult,
};
use std::path::Path;
use std::sync::Arc;

pub(crate) fn load_config(path: Option<&Path>) -> Result<ClusterConfig> {
    let config = ClusterConfig::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load cluster config from {}", path.display()),
        None => "Failed to load cluster config".to_string(),
    })?;
    Ok(config)
}

/// Refuse to start a run without the hypervisor CLI.
pub(crate) fn ensure_prerequisites() -> Result<()> {
    let prereqs = check_prerequisites();
    if !prereqs.all_required_met {
        print_prereq_report(&prereqs);
        anyhow::bail!("Required prerequisites missing; run `kubeduo check` for details");
    }
    for bin in prereqs.missing_optional() {
        tracing::warn!(
            "Optional tool `{}` not usable ({}): {}",
            bin.name,
            bin.installed_version.as_deref().unwrap_or("not installed"),
            bin.install_hint.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

pub(crate) fn multipass_gateway() -> RemoteGateway {
    RemoteGateway::new(Arc::new(Multipass::default()))
}

/// Run `plan` against Multipass with console banners. An operator
/// interrupt stops the run after the command in flight finishes.
pub(crate) async fn execute(config: &ClusterConfig, plan: &ClusterPlan) -> Result<RunResult> {
    let record_path = config.run_record_path();
    let record = match RunRecord::open(&record_path) {
        Ok(record) => record,
        // Teardown does not read the record.
        Err(err) if plan.direction() == Direction::Teardown => {
            tracing::warn!("Run record unusable ({err}); destroying without it");
            RunRecord::in_memory()
        }
        Err(err) => {
            return Err(err)
                .with_context(|| format!("Failed to open run record {}", record_path.display()));
        }
    };

    let cancel = CancelFlag::default();
    let on_interrupt = cancel.clone();
    let watcher = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("🛑 Interrupt received; finishing the current command before stopping");
            on_interrupt.cancel();
        }
    });

    let mut engine = Engine::new(
        multipass_gateway(),
        Inventory::from_config(config),
        record,
        EngineOptions::from(config),
    )
    .with_observer(Arc::new(ConsoleObserver))
    .with_cancel(cancel);

    let result = engine.run(plan).await;
    watcher.abort();
    let result = result.context("Run stopped before it could finish")?;

    print_run_summary(&result, &config.kubeconfig_path().display().to_string());
    Ok(result)
}
