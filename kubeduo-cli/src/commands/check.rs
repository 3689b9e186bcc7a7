//! `kubeduo check`: verify host prerequisites

use crate::prereq::check_prerequisites;
use crate::report::print_prereq_report;
use anyhow::Result;

pub fn handle_check() -> Result<()> {
    println!("📋 Checking prerequisites...");
    let result = check_prerequisites();
    print_prereq_report(&result);

    if !result.all_required_met {
        let missing: Vec<&str> = result
            .missing_required()
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        anyhow::bail!("Missing required prerequisites: {}", missing.join(", "));
    }
    Ok(())
}
