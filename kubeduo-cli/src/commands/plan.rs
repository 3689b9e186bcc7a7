//! `kubeduo plan`: show what setup or destroy would run

use super::load_config;
use crate::report::print_plan;
use anyhow::{Context, Result};
use kubeduo_core::{Inventory, cluster};
use std::path::Path;

pub fn handle_plan(config_path: Option<&Path>, destroy: bool) -> Result<()> {
    let config = load_config(config_path)?;
    let inventory = Inventory::from_config(&config);
    let plan = if destroy {
        cluster::teardown_plan(&config, &inventory)
    } else {
        cluster::provision_plan(&config, &inventory)
    }
    .context("Invalid plan")?;

    print_plan(&plan, &inventory);
    Ok(())
}
