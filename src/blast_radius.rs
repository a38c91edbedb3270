//! # Blast-radius analyzer
//!
//! Summarizes a plan's operational reach per §4.5: hosts touched, resource
//! types touched, the highest step order, and a coarse scope bucket used to
//! gate risky applies.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::model::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlastRadius {
    pub unique_hosts: Vec<String>,
    pub unique_types: Vec<String>,
    pub max_order: usize,
    pub estimated_scope: Scope,
}

/// Analyzes `plan`, per §4.5's scope thresholds.
pub fn analyze(plan: &Plan) -> BlastRadius {
    let hosts: BTreeSet<String> = plan.steps.iter().map(|s| s.host.name.clone()).collect();
    let types: BTreeSet<String> = plan
        .steps
        .iter()
        .map(|s| s.resource.kind.clone())
        .collect();
    let max_order = plan.steps.iter().map(|s| s.order).max().unwrap_or(0);

    let steps = plan.steps.len();
    let unique_hosts = hosts.len();
    let scope = if steps >= 25 || unique_hosts >= 10 {
        Scope::High
    } else if steps >= 8 || unique_hosts >= 3 {
        Scope::Medium
    } else {
        Scope::Low
    };

    BlastRadius {
        unique_hosts: hosts.into_iter().collect(),
        unique_types: types.into_iter().collect(),
        max_order,
        estimated_scope: scope,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Execution, Host, Resource, Step, RESOURCE_TYPE_COMMAND};
    use std::collections::HashMap;

    fn plan_with_steps(count: usize, hosts: usize) -> Plan {
        let steps = (0..count)
            .map(|i| Step {
                order: i + 1,
                host: Host {
                    name: format!("h{}", i % hosts.max(1)),
                    ..Default::default()
                },
                resource: Resource {
                    id: format!("r{i}"),
                    kind: RESOURCE_TYPE_COMMAND.to_string(),
                    command: "echo hi".to_string(),
                    ..Default::default()
                },
            })
            .collect();
        Plan {
            steps,
            handlers: HashMap::new(),
            execution: Execution::default(),
        }
    }

    #[test]
    fn small_plan_is_low_scope() {
        let plan = plan_with_steps(2, 1);
        let radius = analyze(&plan);
        assert_eq!(radius.estimated_scope, Scope::Low);
        assert_eq!(radius.max_order, 2);
    }

    #[test]
    fn eight_steps_is_medium_scope() {
        let plan = plan_with_steps(8, 1);
        assert_eq!(analyze(&plan).estimated_scope, Scope::Medium);
    }

    #[test]
    fn twenty_five_steps_is_high_scope() {
        let plan = plan_with_steps(25, 1);
        assert_eq!(analyze(&plan).estimated_scope, Scope::High);
    }

    #[test]
    fn ten_unique_hosts_is_high_scope_even_with_few_steps() {
        let plan = plan_with_steps(10, 10);
        assert_eq!(analyze(&plan).estimated_scope, Scope::High);
    }
}
