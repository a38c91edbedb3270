//! # Simulator ("check")
//!
//! Dry-runs a `Plan` per §4.6: classifies each Step as simulatable or not by
//! `(transport, type)`, predicts would-change, and emits unified diffs for
//! file resources. Splits the `can_handle`/`execute` shape used elsewhere
//! in this crate into a classification function plus a per-item
//! prediction, since simulation never performs the actual side effect the
//! way applying a step does.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::model::{
    Plan, Step, RESOURCE_TYPE_COMMAND, RESOURCE_TYPE_FILE, TRANSPORT_LOCAL, TRANSPORT_WINRM,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationItem {
    pub resource_id: String,
    pub simulatable: bool,
    pub would_change: bool,
    pub message: String,
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TypeCoverage {
    pub simulatable: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub simulatable: usize,
    pub non_simulatable: usize,
    pub changes_needed: usize,
    pub coverage_by_type: HashMap<String, TypeCoverage>,
    pub confidence: f64,
    pub items: Vec<SimulationItem>,
    pub unsupported_items: Vec<SimulationItem>,
}

/// Dry-runs every step of `plan`, per §4.6.
pub fn simulate(plan: &Plan) -> Report {
    let mut items: Vec<SimulationItem> = plan.steps.iter().map(simulate_step).collect();
    items.sort_by(|a, b| a.resource_id.cmp(&b.resource_id));

    let mut coverage_by_type: HashMap<String, TypeCoverage> = HashMap::new();
    for step in &plan.steps {
        let entry = coverage_by_type.entry(step.resource.kind.clone()).or_default();
        entry.total += 1;
        if item_is_simulatable(&items, &step.resource.id) {
            entry.simulatable += 1;
        }
    }

    let simulatable = items.iter().filter(|i| i.simulatable).count();
    let non_simulatable = items.len() - simulatable;
    let changes_needed = items.iter().filter(|i| i.would_change).count();
    let confidence = if items.is_empty() {
        0.0
    } else {
        simulatable as f64 / items.len() as f64
    };
    let unsupported_items: Vec<SimulationItem> =
        items.iter().filter(|i| !i.simulatable).cloned().collect();

    Report {
        simulatable,
        non_simulatable,
        changes_needed,
        coverage_by_type,
        confidence,
        items,
        unsupported_items,
    }
}

fn item_is_simulatable(items: &[SimulationItem], id: &str) -> bool {
    items.iter().find(|i| i.resource_id == id).map(|i| i.simulatable).unwrap_or(false)
}

fn simulate_step(step: &Step) -> SimulationItem {
    let transport = step.host.transport.as_str();
    let kind = step.resource.kind.as_str();

    match (transport, kind) {
        (TRANSPORT_LOCAL | TRANSPORT_WINRM, RESOURCE_TYPE_FILE) => simulate_file(step),
        (TRANSPORT_LOCAL | TRANSPORT_WINRM, RESOURCE_TYPE_COMMAND) => simulate_command(step),
        (TRANSPORT_LOCAL | TRANSPORT_WINRM, _) => unsupported(
            step,
            "unsupported resource type for simulation",
        ),
        _ => unsupported(step, "unsupported transport for simulation"),
    }
}

fn unsupported(step: &Step, reason: &str) -> SimulationItem {
    SimulationItem {
        resource_id: step.resource.id.clone(),
        simulatable: false,
        would_change: false,
        message: reason.to_string(),
        diff: None,
    }
}

fn simulate_file(step: &Step) -> SimulationItem {
    let path = Path::new(&step.resource.path);
    let desired = step.resource.content.as_bytes();

    match std::fs::read(path) {
        Ok(current) => {
            let would_change = current != desired;
            let diff = if would_change {
                Some(unified_diff(
                    &step.resource.path,
                    &String::from_utf8_lossy(&current),
                    &step.resource.content,
                ))
            } else {
                None
            };
            SimulationItem {
                resource_id: step.resource.id.clone(),
                simulatable: true,
                would_change,
                message: if would_change {
                    "file contents differ".to_string()
                } else {
                    "file already in desired state".to_string()
                },
                diff,
            }
        }
        Err(_) => SimulationItem {
            resource_id: step.resource.id.clone(),
            simulatable: true,
            would_change: true,
            message: "file does not exist".to_string(),
            diff: Some(unified_diff(&step.resource.path, "", &step.resource.content)),
        },
    }
}

fn simulate_command(step: &Step) -> SimulationItem {
    let r = &step.resource;

    if !r.creates.is_empty() && Path::new(&r.creates).exists() {
        return SimulationItem {
            resource_id: r.id.clone(),
            simulatable: true,
            would_change: false,
            message: format!("guarded by creates={}", r.creates),
            diff: None,
        };
    }
    if !r.only_if.is_empty() && !shell_succeeds(&r.only_if) {
        return SimulationItem {
            resource_id: r.id.clone(),
            simulatable: true,
            would_change: false,
            message: format!("guarded by only_if={}", r.only_if),
            diff: None,
        };
    }
    if !r.unless.is_empty() && shell_succeeds(&r.unless) {
        return SimulationItem {
            resource_id: r.id.clone(),
            simulatable: true,
            would_change: false,
            message: format!("guarded by unless={}", r.unless),
            diff: None,
        };
    }

    SimulationItem {
        resource_id: r.id.clone(),
        simulatable: true,
        would_change: true,
        message: "command would execute".to_string(),
        diff: None,
    }
}

fn shell_succeeds(command: &str) -> bool {
    std::process::Command::new("sh")
        .arg("-lc")
        .arg(command)
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Hand-rolled, single-direction unified diff per §4.6: no context radius,
/// CRLF normalized to LF, a single trailing empty line dropped.
pub fn unified_diff(path: &str, before: &str, after: &str) -> String {
    let before_lines = split_lines(before);
    let after_lines = split_lines(after);

    let mut out = String::new();
    out.push_str(&format!("--- {}\n", path));
    out.push_str(&format!("+++ {}\n", path));

    let max = before_lines.len().max(after_lines.len());
    for i in 0..max {
        match (before_lines.get(i), after_lines.get(i)) {
            (Some(b), Some(a)) if b == a => out.push_str(&format!(" {}\n", b)),
            (Some(b), Some(a)) => {
                out.push_str(&format!("-{}\n", b));
                out.push_str(&format!("+{}\n", a));
            }
            (Some(b), None) => out.push_str(&format!("-{}\n", b)),
            (None, Some(a)) => out.push_str(&format!("+{}\n", a)),
            (None, None) => {}
        }
    }
    out
}

fn split_lines(text: &str) -> Vec<String> {
    let normalized = text.replace("\r\n", "\n");
    let mut lines: Vec<String> = normalized.split('\n').map(str::to_string).collect();
    if lines.last().map(|l| l.is_empty()).unwrap_or(false) {
        lines.pop();
    }
    lines
}
