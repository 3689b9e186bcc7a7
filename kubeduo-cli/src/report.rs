//! Console output: per-step banners, final summaries, dry-run listing

use crate::prereq::PrereqResult;
use chrono::Utc;
use kubeduo_core::{
    ClusterPlan, Direction, Inventory, Predicate, RunObserver, RunRecord, RunResult, RunStatus,
    Step, StepStatus, TargetOutcome, TargetRef,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Prints one banner per step and one line per target.
pub struct ConsoleObserver;

impl RunObserver for ConsoleObserver {
    fn step_started(&self, index: usize, total: usize, step: &Step) {
        println!();
        println!("🔸 [{}/{}] {} ({})", index + 1, total, step.label, step.target);
    }

    fn target_finished(&self, _step: &Step, target: &TargetRef, outcome: &TargetOutcome) {
        println!("   {}", describe_outcome(target, outcome));
    }
}

fn describe_outcome(target: &TargetRef, outcome: &TargetOutcome) -> String {
    match outcome {
        TargetOutcome::Completed => format!("✅ {target}"),
        TargetOutcome::AlreadyComplete => format!("⏭️  {target} (already complete)"),
        TargetOutcome::Satisfied => format!("⏭️  {target} (already satisfied)"),
        TargetOutcome::Absent => format!("⏭️  {target} (not present)"),
        TargetOutcome::Failed(failure) => format!("❌ {target}: {}", failure.kind),
    }
}

/// What the operator should do next.
fn next_step_hint(result: &RunResult, kubeconfig: &str) -> String {
    match (result.direction, result.status) {
        (Direction::Provision, RunStatus::Succeeded | RunStatus::SucceededWithWarnings) => {
            format!("export KUBECONFIG={kubeconfig} && kubectl get nodes -o wide")
        }
        (Direction::Provision, RunStatus::Cancelled) => {
            "run `kubeduo setup` again to resume where this run stopped".to_string()
        }
        (Direction::Provision, _) => {
            "fix the cause above, then run `kubeduo setup` again; completed steps are skipped"
                .to_string()
        }
        (Direction::Teardown, RunStatus::Succeeded | RunStatus::SucceededWithWarnings) => {
            "run `kubeduo setup` to build a fresh cluster".to_string()
        }
        (Direction::Teardown, _) => {
            "run `kubeduo destroy` again, or clean up with `multipass delete --purge <name>`"
                .to_string()
        }
    }
}

pub fn print_run_summary(result: &RunResult, kubeconfig: &str) {
    println!();
    println!("{RULE}");
    match result.status {
        RunStatus::Succeeded => println!("✅ {} complete", title(result.direction)),
        RunStatus::SucceededWithWarnings => println!(
            "⚠️  {} complete with {} warnings",
            title(result.direction),
            result.warnings.len()
        ),
        RunStatus::Aborted => println!("❌ {} aborted", title(result.direction)),
        RunStatus::Failed => println!("❌ {} incomplete", title(result.direction)),
        RunStatus::Cancelled => println!("🛑 {} cancelled", title(result.direction)),
    }
    println!("{RULE}");

    if let Some(failure) = &result.failure {
        println!("Step:    {}", failure.step);
        println!("Node:    {}", failure.node);
        println!("Reason:  {}", failure.kind);
        if !failure.output.is_empty() {
            println!("Output:");
            for line in failure.output.lines() {
                println!("  │ {line}");
            }
        }
    }

    for warning in &result.warnings {
        println!("⚠️  {warning}");
    }

    println!();
    println!("Run id:           {}", result.run_id);
    println!("Remote commands:  {}", result.remote_commands);
    if let Some(path) = &result.log_path {
        println!("📄 Run record:    {}", path.display());
    }
    if result.direction == Direction::Provision && result.is_success() {
        println!("🔑 Kubeconfig:    {kubeconfig}");
    }
    println!("👉 Next: {}", next_step_hint(result, kubeconfig));
}

fn title(direction: Direction) -> &'static str {
    match direction {
        Direction::Provision => "Setup",
        Direction::Teardown => "Destroy",
    }
}

/// Dry-run listing of a plan.
pub fn print_plan(plan: &ClusterPlan, inventory: &Inventory) {
    println!("🗺️  {} plan ({} steps)", title(plan.direction()), plan.len());
    println!("{RULE}");
    for (index, step) in plan.steps().iter().enumerate() {
        let targets: Vec<String> = inventory
            .resolve(&step.target)
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "{:>2}. {:<20} {} [{}]",
            index + 1,
            step.id,
            step.label,
            step.policy
        );
        println!("      on:     {}", targets.join(", "));
        println!("      does:   {}", step.action.describe());
        if let Some(skip) = &step.skip_if {
            println!("      skip:   {}", describe_predicate(skip));
        }
        if !step.queries.is_empty() {
            let names: Vec<&str> = step.queries.iter().map(|q| q.name.as_str()).collect();
            println!("      reads:  {}", names.join(", "));
        }
        if let Some(timeout) = step.timeout {
            println!("      limit:  {}s", timeout.as_secs());
        }
    }
}

fn describe_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::NodeRunning => "VM already running".to_string(),
        Predicate::Shell(check) => {
            let short: String = check.chars().take(60).collect();
            if short.len() < check.len() {
                format!("`{short}…` succeeds")
            } else {
                format!("`{short}` succeeds")
            }
        }
    }
}

/// Latest recorded status per step and node, next to live VM state.
pub fn print_status(plan: &ClusterPlan, inventory: &Inventory, record: &RunRecord) {
    println!("📦 Nodes:");
    for node in inventory.nodes() {
        let address = node
            .address
            .map_or_else(|| "-".to_string(), |a| a.to_string());
        println!("  {:<16} {:<10} {}", node.name(), node.state, address);
    }

    println!();
    println!("📋 Steps:");
    for step in plan.steps() {
        let marks: Vec<String> = inventory
            .resolve(&step.target)
            .iter()
            .map(|t| {
                let mark = match record.status(&step.id, t.key()) {
                    StepStatus::Success => "✅",
                    StepStatus::Failed => "❌",
                    StepStatus::Unknown => "⬜",
                };
                format!("{mark} {t}")
            })
            .collect();
        println!("  {:<20} {}", step.id, marks.join("  "));
    }

    if let Some(path) = record.path() {
        println!();
        println!("📄 Run record: {} ({} entries)", path.display(), record.entries().len());
    }
}

/// Print prerequisite check results
pub fn print_prereq_report(result: &PrereqResult) {
    println!("🧰 kubeduo prerequisites");
    println!("{RULE}");
    println!("Checked: {}", Utc::now().to_rfc3339());
    println!();

    println!("📦 Required:");
    for bin in &result.required {
        let status = if bin.found && bin.meets_requirement {
            "✅"
        } else if bin.found {
            "⚠️"
        } else {
            "❌"
        };
        print!("  {} {} ", status, bin.name);
        match &bin.installed_version {
            Some(installed) if bin.meets_requirement => println!("({installed}, OK)"),
            Some(installed) => println!("({installed}, requires {}) ⚠️", bin.required_version),
            None => println!("(not installed) - requires {}", bin.required_version),
        }
        if !bin.found {
            if let Some(hint) = &bin.install_hint {
                println!("     ↳ {hint}");
            }
        }
    }

    if !result.optional.is_empty() {
        println!();
        println!("🔧 Optional:");
        for bin in &result.optional {
            let status = if bin.found && bin.meets_requirement {
                "✅"
            } else {
                "  "
            };
            print!("  {} {} ", status, bin.name);
            match (&bin.installed_version, &bin.install_hint) {
                (Some(installed), _) => println!("({installed})"),
                (None, Some(hint)) => println!("- {hint}"),
                (None, None) => println!("(not installed)"),
            }
        }
    }

    println!();
    if result.all_required_met {
        println!("✅ All required prerequisites met!");
    } else {
        println!("⚠️  Some required prerequisites are missing");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubeduo_core::{FailureKind, StepFailure};

    fn result(direction: Direction, status: RunStatus) -> RunResult {
        RunResult {
            run_id: Default::default(),
            direction,
            status,
            failure: None,
            warnings: Vec::new(),
            steps: Vec::new(),
            remote_commands: 0,
            log_path: None,
        }
    }

    #[test]
    fn test_next_step_hints() {
        let ok = result(Direction::Provision, RunStatus::Succeeded);
        assert!(next_step_hint(&ok, "/tmp/kube").contains("KUBECONFIG=/tmp/kube"));

        let aborted = result(Direction::Provision, RunStatus::Aborted);
        assert!(next_step_hint(&aborted, "/tmp/kube").contains("kubeduo setup"));

        let failed = result(Direction::Teardown, RunStatus::Failed);
        assert!(next_step_hint(&failed, "/tmp/kube").contains("kubeduo destroy"));
    }

    #[test]
    fn test_describe_failed_outcome() {
        let failure = StepFailure {
            step: "join_worker".to_string(),
            node: "worker-1".to_string(),
            kind: FailureKind::RemoteCommandFailure { exit_code: 1 },
            output: String::new(),
        };
        let line = describe_outcome(
            &TargetRef::Node("worker-1".into()),
            &TargetOutcome::Failed(failure),
        );
        assert_eq!(line, "❌ worker-1: exited with 1");
    }

    #[test]
    fn test_long_predicate_is_shortened() {
        let long = Predicate::Shell("x".repeat(100));
        assert!(describe_predicate(&long).contains('…'));
        assert_eq!(
            describe_predicate(&Predicate::Shell("true".into())),
            "`true` succeeds"
        );
    }
}
