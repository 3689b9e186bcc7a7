//! Teardown planner: derives the reverse plan from a forward plan

use crate::error::PlanError;
use crate::node::Inventory;
use crate::registry::{ClusterPlan, Direction, StepRegistry};
use crate::step::{Policy, Step};

/// Reverse `forward`, keeping only steps with a natural inverse.
///
/// Inverses come out in reverse forward order and best-effort. Terminal
/// inverses (VM deletion, credential removal) are moved to the end, in
/// forward order, so nodes are deleted before host credentials go.
pub fn derive(forward: &ClusterPlan, inventory: &Inventory) -> Result<ClusterPlan, PlanError> {
    let inverse = |step: &Step| {
        step.inverse.as_deref().map(|inv| Step {
            policy: Policy::BestEffort,
            ..inv.clone()
        })
    };

    let mut steps: Vec<Step> = forward
        .steps()
        .iter()
        .rev()
        .filter_map(inverse)
        .filter(|s| !s.terminal)
        .collect();

    steps.extend(
        forward
            .steps()
            .iter()
            .filter_map(inverse)
            .filter(|s| s.terminal),
    );

    tracing::debug!(
        "Derived teardown plan: {}",
        steps.iter().map(|s| s.id.as_str()).collect::<Vec<_>>().join(", ")
    );
    StepRegistry::new(inventory).define(Direction::Teardown, steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster;
    use crate::config::ClusterConfig;

    #[test]
    fn test_derive_reverse_order() {
        let config = ClusterConfig::default();
        let inventory = Inventory::from_config(&config);
        let forward = StepRegistry::new(&inventory)
            .define(
                Direction::Provision,
                vec![
                    cluster::create_nodes(&config),
                    cluster::prep_nodes(),
                    cluster::install_runtime(),
                    cluster::install_k8s(&config),
                    cluster::init_control_plane(&config),
                    cluster::join_worker(&config),
                ],
            )
            .unwrap();

        let reverse = derive(&forward, &inventory).unwrap();
        assert_eq!(
            reverse.step_ids(),
            vec!["reset_worker", "reset_control_plane", "delete_nodes"]
        );
        assert_eq!(reverse.direction(), Direction::Teardown);
        assert!(reverse.steps().iter().all(|s| !s.is_critical()));
    }

    #[test]
    fn test_full_plan_ends_with_terminal_steps() {
        let config = ClusterConfig::default();
        let inventory = Inventory::from_config(&config);
        let forward = cluster::provision_plan(&config, &inventory).unwrap();

        let reverse = derive(&forward, &inventory).unwrap();
        assert_eq!(
            reverse.step_ids(),
            vec![
                "reset_worker",
                "reset_control_plane",
                "delete_nodes",
                "purge_kubeconfig"
            ]
        );
        assert!(reverse.steps()[2..].iter().all(|s| s.terminal));
    }
}
