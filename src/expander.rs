//! # Expander
//!
//! Applies matrix/loop expansion, evaluates `when` guards, and substitutes
//! `{{var}}` tokens, per §4.2. Pure in-memory transformation over an
//! already-composed `Document` — no I/O, no validation.
//!
//! Token substitution walks `{{token}}` patterns with a regex and resolves
//! them against a *compile-time* matrix combination rather than a mutable
//! runtime execution context, since expansion happens once, before any
//! resource has run.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::model::{Document, Resource};

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("valid token regex"));

/// Truthy words per §4.2: `true/1/yes/on`. Anything not in `FALSEY_WORDS`
/// (including these) evaluates truthy.
const FALSEY_WORDS: &[&str] = &["false", "0", "no", "off"];

/// Expands matrix/loop/when/token directives across `resources` and
/// `handlers`, replacing them with their expanded forms.
pub fn expand(document: &mut Document) {
    document.resources = expand_resources(&document.resources);
    document.handlers = expand_resources(&document.handlers);
}

fn expand_resources(resources: &[Resource]) -> Vec<Resource> {
    let mut out = Vec::new();
    for resource in resources {
        out.extend(expand_one(resource));
    }
    out
}

fn expand_one(resource: &Resource) -> Vec<Resource> {
    let matrix = effective_matrix(resource);
    let combinations = enumerate(&matrix);
    let matrix_expanded = !matrix.is_empty();

    let mut out = Vec::new();
    for combo in combinations {
        if !eval_when(&resource.when, &combo) {
            continue;
        }
        let mut clone = resource.clone();
        clone.when.clear();
        clone.matrix.clear();
        clone.r#loop.clear();
        clone.loop_var = None;

        substitute_resource(&mut clone, &combo);

        if matrix_expanded && clone.id == resource.id {
            clone.id = format!("{}-{}", resource.id, combo_suffix(&combo));
        }

        out.push(clone);
    }
    out
}

/// Builds the name -> sorted, deduplicated values map driving the Cartesian
/// product, per §4.2. Returns an empty map (one empty combination) when the
/// resource declares neither `matrix` nor `loop`. Returns `None`-equivalent
/// (an axis with an empty map, silently dropping the resource) when any
/// axis becomes empty after trimming — `enumerate` turns that into zero
/// combinations automatically, which matches "drop the resource".
fn effective_matrix(resource: &Resource) -> BTreeMap<String, Vec<String>> {
    let mut matrix: BTreeMap<String, Vec<String>> = resource
        .matrix
        .iter()
        .map(|(k, v)| (k.clone(), clean_axis(v)))
        .collect();

    if !resource.r#loop.is_empty() {
        let key = resource
            .loop_var
            .clone()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "item".to_string());
        matrix
            .entry(key)
            .or_insert_with(|| clean_axis(&resource.r#loop));
    }

    matrix
}

fn clean_axis(values: &[String]) -> Vec<String> {
    let mut cleaned: Vec<String> = values
        .iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect();
    cleaned.sort();
    cleaned.dedup();
    cleaned
}

/// Enumerates the Cartesian product of `matrix` in deterministic order:
/// axis names sorted lexicographically (guaranteed by the `BTreeMap`), each
/// axis's values sorted lexicographically (guaranteed by `clean_axis`).
fn enumerate(matrix: &BTreeMap<String, Vec<String>>) -> Vec<BTreeMap<String, String>> {
    if matrix.is_empty() {
        return vec![BTreeMap::new()];
    }
    if matrix.values().any(|v| v.is_empty()) {
        return Vec::new();
    }

    let mut combos = vec![BTreeMap::new()];
    for (axis, values) in matrix {
        let mut next = Vec::with_capacity(combos.len() * values.len());
        for combo in &combos {
            for value in values {
                let mut extended = combo.clone();
                extended.insert(axis.clone(), value.clone());
                next.push(extended);
            }
        }
        combos = next;
    }
    combos
}

fn eval_when(expr: &str, combo: &BTreeMap<String, String>) -> bool {
    let expr = expr.trim();
    if expr.is_empty() {
        return true;
    }

    if let Some(pos) = expr.find("==") {
        let (lhs, rhs) = expr.split_at(pos);
        return resolve_operand(lhs.trim(), combo) == resolve_operand(&rhs[2..].trim(), combo);
    }
    if let Some(pos) = expr.find("!=") {
        let (lhs, rhs) = expr.split_at(pos);
        return resolve_operand(lhs.trim(), combo) != resolve_operand(&rhs[2..].trim(), combo);
    }

    is_truthy(&resolve_operand(expr, combo))
}

fn resolve_operand(token: &str, combo: &BTreeMap<String, String>) -> String {
    let token = token.trim();
    if is_quoted(token) {
        return token[1..token.len() - 1].to_string();
    }
    combo
        .get(token)
        .cloned()
        .unwrap_or_else(|| token.to_string())
}

fn is_quoted(token: &str) -> bool {
    token.len() >= 2
        && ((token.starts_with('\'') && token.ends_with('\''))
            || (token.starts_with('"') && token.ends_with('"')))
}

fn is_truthy(value: &str) -> bool {
    let lowered = value.trim().to_lowercase();
    !FALSEY_WORDS.contains(&lowered.as_str())
}

fn substitute_str(input: &str, combo: &BTreeMap<String, String>) -> String {
    TOKEN_RE
        .replace_all(input, |caps: &regex::Captures| {
            let key = &caps[1];
            combo.get(key).cloned().unwrap_or_default()
        })
        .into_owned()
}

fn substitute_vec(values: &[String], combo: &BTreeMap<String, String>) -> Vec<String> {
    values.iter().map(|v| substitute_str(v, combo)).collect()
}

fn substitute_resource(resource: &mut Resource, combo: &BTreeMap<String, String>) {
    resource.id = substitute_str(&resource.id, combo);
    resource.kind = substitute_str(&resource.kind, combo);
    resource.host = substitute_str(&resource.host, combo);
    if let Some(d) = &resource.delegate_to {
        resource.delegate_to = Some(substitute_str(d, combo));
    }

    resource.depends_on = substitute_vec(&resource.depends_on, combo);
    resource.require = substitute_vec(&resource.require, combo);
    resource.before = substitute_vec(&resource.before, combo);
    resource.notify = substitute_vec(&resource.notify, combo);
    resource.subscribe = substitute_vec(&resource.subscribe, combo);
    resource.notify_handlers = substitute_vec(&resource.notify_handlers, combo);
    resource.tags = substitute_vec(&resource.tags, combo);

    resource.path = substitute_str(&resource.path, combo);
    resource.content = substitute_str(&resource.content, combo);
    resource.mode = substitute_str(&resource.mode, combo);

    resource.command = substitute_str(&resource.command, combo);
    resource.creates = substitute_str(&resource.creates, combo);
    resource.only_if = substitute_str(&resource.only_if, combo);
    resource.unless = substitute_str(&resource.unless, combo);
    resource.refresh_command = substitute_str(&resource.refresh_command, combo);
    resource.become_user = substitute_str(&resource.become_user, combo);
    resource.rescue_command = substitute_str(&resource.rescue_command, combo);
    resource.always_command = substitute_str(&resource.always_command, combo);
    if let Some(u) = &resource.until_contains {
        resource.until_contains = Some(substitute_str(u, combo));
    }
}

/// Builds the deterministic `id-<k1>-<v1>-<k2>-<v2>...` suffix for
/// resources whose id was not itself templated.
fn combo_suffix(combo: &BTreeMap<String, String>) -> String {
    combo
        .iter()
        .map(|(k, v)| format!("{}-{}", slug(k), slug(v)))
        .collect::<Vec<_>>()
        .join("-")
}

fn slug(value: &str) -> String {
    let lowered = value.trim().to_lowercase();
    if lowered.is_empty() {
        return "item".to_string();
    }
    let mut out = String::with_capacity(lowered.len());
    let mut last_was_dash = false;
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            out.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = out.trim_matches('-').to_string();
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed
    }
}
