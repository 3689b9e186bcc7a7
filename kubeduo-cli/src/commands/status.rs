//! `kubeduo status`: live VM state next to the run record

use super::{load_config, multipass_gateway};
use crate::report::print_status;
use anyhow::{Context, Result};
use kubeduo_core::{Inventory, RunRecord, cluster};
use std::path::Path;

pub async fn handle_status(config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path)?;
    let mut inventory = Inventory::from_config(&config);
    let plan = cluster::provision_plan(&config, &inventory).context("Invalid provision plan")?;

    match multipass_gateway().list().await {
        Ok(instances) => {
            inventory.reconcile(&instances);
        }
        Err(err) => println!("⚠️  Could not query multipass: {err}"),
    }

    let record_path = config.run_record_path();
    let record = if record_path.exists() {
        RunRecord::open(&record_path)
            .with_context(|| format!("Failed to read run record {}", record_path.display()))?
    } else {
        println!("ℹ️  No runs recorded yet");
        RunRecord::in_memory()
    };

    print_status(&plan, &inventory, &record);
    Ok(())
}
