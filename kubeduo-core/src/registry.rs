//! Step registry: validates an ordered list of steps into a plan

use crate::error::{
    DuplicateStepSnafu, EmptyTargetSnafu, NodeNotProvisionedSnafu, PlanError, UndeclaredNodeSnafu,
};
use crate::node::{Inventory, Target, TargetRef};
use crate::step::Step;
use snafu::ensure;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Fail fast; skip steps already recorded as complete.
    Provision,
    /// Best effort; every step is attempted.
    Teardown,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Provision => f.write_str("provision"),
            Direction::Teardown => f.write_str("teardown"),
        }
    }
}

/// A validated, ordered plan.
#[derive(Debug, Clone)]
pub struct ClusterPlan {
    direction: Direction,
    steps: Vec<Step>,
}

impl ClusterPlan {
    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

pub struct StepRegistry<'a> {
    inventory: &'a Inventory,
}

impl<'a> StepRegistry<'a> {
    pub fn new(inventory: &'a Inventory) -> Self {
        Self { inventory }
    }

    /// Validate `steps` against the inventory.
    ///
    /// In the provision direction a node must be launched by an earlier
    /// step before any step runs on it or queries it. Teardown plans act
    /// on whatever exists, so only identity and declaration are checked.
    pub fn define(&self, direction: Direction, steps: Vec<Step>) -> Result<ClusterPlan, PlanError> {
        let mut ids = HashSet::new();
        let mut provisioned: HashSet<String> = HashSet::new();

        for step in &steps {
            ensure!(
                ids.insert(step.id.as_str()),
                DuplicateStepSnafu {
                    id: step.id.clone()
                }
            );

            if let Target::Node(name) = &step.target {
                ensure!(
                    self.inventory.contains(name),
                    UndeclaredNodeSnafu {
                        step: step.id.clone(),
                        node: name.clone()
                    }
                );
            }

            let targets = self.inventory.resolve(&step.target);
            ensure!(
                !targets.is_empty(),
                EmptyTargetSnafu {
                    step: step.id.clone(),
                    target: step.target.to_string()
                }
            );

            for query in &step.queries {
                let node = query.source.node();
                ensure!(
                    self.inventory.contains(node),
                    UndeclaredNodeSnafu {
                        step: step.id.clone(),
                        node: node.to_string()
                    }
                );
                if direction == Direction::Provision {
                    ensure!(
                        provisioned.contains(node),
                        NodeNotProvisionedSnafu {
                            step: step.id.clone(),
                            node: node.to_string()
                        }
                    );
                }
            }

            if direction == Direction::Provision {
                for target in targets.iter().filter_map(TargetRef::node) {
                    if step.provisions_nodes() {
                        provisioned.insert(target.to_string());
                    } else {
                        ensure!(
                            provisioned.contains(target),
                            NodeNotProvisionedSnafu {
                                step: step.id.clone(),
                                node: target.to_string()
                            }
                        );
                    }
                }
            }
        }

        tracing::debug!("Defined {direction} plan with {} steps", steps.len());
        Ok(ClusterPlan { direction, steps })
    }
}
