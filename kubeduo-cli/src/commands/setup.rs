//! `kubeduo setup`: provision the cluster

use super::{ensure_prerequisites, execute, load_config};
use anyhow::{Context, Result};
use kubeduo_core::{Inventory, cluster};
use std::path::Path;

pub async fn handle_setup(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let inventory = Inventory::from_config(&config);
    let plan = cluster::provision_plan(&config, &inventory).context("Invalid provision plan")?;

    println!(
        "🚀 kubeduo setup: {} + {} worker(s), Kubernetes {}",
        config.control_plane.name,
        config.workers.len(),
        config.channel()
    );

    ensure_prerequisites()?;
    let result = execute(&config, &plan).await?;
    if !result.is_success() {
        anyhow::bail!("Setup did not complete ({:?})", result.status);
    }
    Ok(())
}
