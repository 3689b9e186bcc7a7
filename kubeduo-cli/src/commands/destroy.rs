//! `kubeduo destroy`: tear the cluster down

use super::{ensure_prerequisites, execute, load_config};
use anyhow::{Context, Result};
use kubeduo_core::{Inventory, cluster};
use std::path::Path;

pub async fn handle_destroy(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let inventory = Inventory::from_config(&config);
    let plan = cluster::teardown_plan(&config, &inventory).context("Invalid teardown plan")?;

    let names: Vec<&str> = config.nodes().map(|n| n.name.as_str()).collect();
    println!("💥 kubeduo destroy: {}", names.join(", "));

    ensure_prerequisites()?;
    let result = execute(&config, &plan).await?;
    if !result.is_success() {
        anyhow::bail!("Destroy did not complete ({:?})", result.status);
    }
    Ok(())
}
