//! # Snapshot and diff
//!
//! Fingerprints a `Plan` and diffs two plans at step granularity, per §4.5.
//! Uses the "serialize then hash" idiom common for content addressing,
//! built as small, explicit functions rather than a generic diffing
//! abstraction.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::model::{Plan, Snapshot};

/// Per-step content hash, keyed by resource id.
pub fn fingerprint_steps(plan: &Plan) -> BTreeMap<String, String> {
    plan.steps
        .iter()
        .map(|step| {
            let encoded = serde_json::to_vec(step).expect("Step serializes");
            (step.resource.id.clone(), hash_bytes(&encoded))
        })
        .collect()
}

/// A single stable hash over the whole plan.
pub fn fingerprint_plan(plan: &Plan) -> String {
    let encoded = serde_json::to_vec(plan).expect("Plan serializes");
    hash_bytes(&encoded)
}

fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanDiff {
    pub added_steps: Vec<String>,
    pub removed_steps: Vec<String>,
    pub changed_steps: Vec<String>,
    pub r#match: bool,
    pub baseline_hash: String,
    pub current_hash: String,
}

/// Compares `baseline` against `current` at step granularity, per §4.5.
pub fn diff(baseline: &Plan, current: &Plan) -> PlanDiff {
    let baseline_fp = fingerprint_steps(baseline);
    let current_fp = fingerprint_steps(current);

    let baseline_ids: BTreeSet<&String> = baseline_fp.keys().collect();
    let current_ids: BTreeSet<&String> = current_fp.keys().collect();

    let added_steps: Vec<String> = current_ids
        .difference(&baseline_ids)
        .map(|id| (*id).clone())
        .collect();
    let removed_steps: Vec<String> = baseline_ids
        .difference(&current_ids)
        .map(|id| (*id).clone())
        .collect();
    let changed_steps: Vec<String> = baseline_ids
        .intersection(&current_ids)
        .filter(|id| baseline_fp[**id] != current_fp[**id])
        .map(|id| (*id).clone())
        .collect();

    let is_match = added_steps.is_empty() && removed_steps.is_empty() && changed_steps.is_empty();

    PlanDiff {
        added_steps,
        removed_steps,
        changed_steps,
        r#match: is_match,
        baseline_hash: fingerprint_plan(baseline),
        current_hash: fingerprint_plan(current),
    }
}

/// Wraps `plan` into the persisted snapshot envelope and serializes it.
pub fn to_json(plan: &Plan) -> serde_json::Result<String> {
    serde_json::to_string_pretty(&Snapshot::new(plan.clone()))
}

pub fn from_json(raw: &str) -> serde_json::Result<Snapshot> {
    serde_json::from_str(raw)
}
