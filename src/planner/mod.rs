//! # Planner
//!
//! Compiles a validated, expanded `Document` into a `Plan`: a single,
//! deterministic, acyclic ordering of `Step`s plus a compiled handler table,
//! per §4.4.
//!
//! Builds the same dependencies/dependents node bookkeeping a parallel DAG
//! scheduler would, but stops at producing a **total order**: execution
//! happens strictly sequentially downstream (see `executor`), so there is
//! no semaphore, no `JoinSet`, and no shared mutable state here at all.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::errors::MasterchefError;
use crate::model::{Document, Host, Plan, Resource, Step};

struct Node {
    resource: Resource,
    dependencies: HashSet<String>,
}

/// Builds a `Plan` from a validated, expanded document.
///
/// Ordering is a topological sort over `depends_on`/`require`/`before`,
/// breaking ties lexicographically by resource id so that two documents
/// with the same resources always plan to the same step order.
pub fn plan(document: &Document) -> Result<Plan, MasterchefError> {
    let hosts: HashMap<String, Host> = document
        .inventory
        .hosts
        .iter()
        .map(|h| (h.name.clone(), h.clone()))
        .collect();

    let nodes = build_nodes(&document.resources);
    let order = topological_order(&nodes)?;

    let mut steps = Vec::with_capacity(order.len());
    for (index, id) in order.into_iter().enumerate() {
        let node = &nodes[&id];
        let host = resolve_transport(resolve_host(&node.resource, &hosts));
        steps.push(Step {
            order: index + 1,
            host,
            resource: node.resource.clone(),
        });
    }

    let mut handlers = HashMap::new();
    for resource in &document.handlers {
        let host = resolve_transport(resolve_host(resource, &hosts));
        handlers.insert(
            resource.id.clone(),
            Step {
                order: 0,
                host,
                resource: resource.clone(),
            },
        );
    }

    Ok(Plan {
        steps,
        handlers,
        execution: document.execution.clone(),
    })
}

/// Resolves the execution host for a resource: `delegate_to` wins over
/// `host`; an unresolvable name (already ruled out by validation) falls
/// back to an empty, `local`-transport host.
fn resolve_host(resource: &Resource, hosts: &HashMap<String, Host>) -> Host {
    let name = resource
        .delegate_to
        .as_deref()
        .filter(|d| !d.is_empty())
        .unwrap_or(&resource.host);

    hosts.get(name).cloned().unwrap_or_else(|| Host {
        name: name.to_string(),
        transport: crate::model::TRANSPORT_LOCAL.to_string(),
        ..Default::default()
    })
}

/// Resolves a `transport = "auto"` host to a concrete transport, per
/// §4.4 step 6. The resolution only ever touches the copy stored on the
/// Step; the document's own host entry is untouched.
fn resolve_transport(mut host: Host) -> Host {
    if host.transport != crate::model::TRANSPORT_AUTO {
        return host;
    }

    if host.name == "localhost" {
        host.transport = crate::model::TRANSPORT_LOCAL.to_string();
        return host;
    }

    let has_windows_hint = host
        .labels
        .values()
        .any(|v| v.to_lowercase().contains("windows"))
        || host.roles.iter().any(|r| r.to_lowercase().contains("windows"));
    if has_windows_hint {
        host.transport = crate::model::TRANSPORT_WINRM.to_string();
        return host;
    }

    let has_label_hints = !host.labels.is_empty() || !host.roles.is_empty();
    let has_ssh_capability = host
        .capabilities
        .iter()
        .any(|c| c.eq_ignore_ascii_case("ssh"));
    if has_ssh_capability || !has_label_hints {
        host.transport = crate::model::TRANSPORT_SSH.to_string();
    }

    host
}

fn build_nodes(resources: &[Resource]) -> HashMap<String, Node> {
    let mut nodes: HashMap<String, Node> = resources
        .iter()
        .map(|r| {
            let mut dependencies: HashSet<String> = r
                .depends_on
                .iter()
                .chain(r.require.iter())
                .chain(r.subscribe.iter())
                .cloned()
                .collect();
            dependencies.retain(|d| resources.iter().any(|other| &other.id == d));
            (
                r.id.clone(),
                Node {
                    resource: r.clone(),
                    dependencies,
                },
            )
        })
        .collect();

    // `before` and `notify` both mean "the target runs after this resource".
    for resource in resources {
        for target in resource.before.iter().chain(resource.notify.iter()) {
            if let Some(node) = nodes.get_mut(target) {
                node.dependencies.insert(resource.id.clone());
            }
        }
    }

    nodes
}

/// Kahn's algorithm with a lexicographically ordered ready set, so the
/// output order is a pure function of the input resource ids.
fn topological_order(nodes: &HashMap<String, Node>) -> Result<Vec<String>, MasterchefError> {
    let mut remaining: HashMap<&str, usize> = nodes
        .iter()
        .map(|(id, n)| (id.as_str(), n.dependencies.len()))
        .collect();

    let mut ready: BTreeSet<String> = remaining
        .iter()
        .filter(|(_, &count)| count == 0)
        .map(|(id, _)| id.to_string())
        .collect();

    let mut order = Vec::with_capacity(nodes.len());

    while let Some(id) = ready.iter().next().cloned() {
        ready.remove(&id);
        order.push(id.clone());

        for (candidate_id, candidate) in nodes {
            if candidate.dependencies.contains(&id) {
                let count = remaining.get_mut(candidate_id.as_str()).unwrap();
                *count -= 1;
                if *count == 0 {
                    ready.insert(candidate_id.clone());
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let stuck: Vec<&str> = remaining
            .iter()
            .filter(|(id, &count)| count > 0 && !order.contains(&id.to_string()))
            .map(|(id, _)| *id)
            .collect();
        let mut stuck = stuck;
        stuck.sort();
        return Err(MasterchefError::PlanCycle(stuck.join(", ")));
    }

    Ok(order)
}
