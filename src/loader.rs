//! # Document loader / composer
//!
//! Reads a root document from disk and recursively merges its
//! `includes`/`imports`/`overlays` into a single composed `Document`,
//! per §4.1. This is a pure, synchronous pipeline stage: it performs I/O
//! but no evaluation — expansion and validation happen later.
//!
//! Extends a single-file, single-format reader into a recursive,
//! format-dispatching composer with cycle detection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::errors::MasterchefError;
use crate::model::{Document, Execution, Host, Resource};

/// Loads and fully composes the document rooted at `path`.
pub fn load_document<P: AsRef<Path>>(path: P) -> Result<Document, MasterchefError> {
    let mut stack = Vec::new();
    compose(path.as_ref(), &mut stack)
}

fn compose(path: &Path, stack: &mut Vec<PathBuf>) -> Result<Document, MasterchefError> {
    let absolute = absolutize(path)?;

    if stack.contains(&absolute) {
        let cycle = stack
            .iter()
            .map(|p| p.display().to_string())
            .chain(std::iter::once(absolute.display().to_string()))
            .collect::<Vec<_>>()
            .join(" -> ");
        return Err(MasterchefError::CompositionCycle(cycle));
    }
    stack.push(absolute.clone());

    let result = (|| -> Result<Document, MasterchefError> {
        let raw = std::fs::read_to_string(&absolute).map_err(MasterchefError::Io)?;
        let doc = parse_document(&absolute, &raw)?;

        let dir = absolute.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut accumulator = Document::default();

        for include in &doc.includes {
            let loaded = compose(&dir.join(include), stack)?;
            merge_into(&mut accumulator, loaded);
        }
        for import in &doc.imports {
            let loaded = compose(&dir.join(import), stack)?;
            merge_into(&mut accumulator, loaded);
        }

        let mut own = doc.clone();
        own.includes.clear();
        own.imports.clear();
        own.overlays.clear();
        merge_into(&mut accumulator, own);

        for overlay in &doc.overlays {
            let loaded = compose(&dir.join(overlay), stack)?;
            merge_into(&mut accumulator, loaded);
        }

        Ok(accumulator)
    })();

    stack.pop();
    result
}

fn absolutize(path: &Path) -> Result<PathBuf, MasterchefError> {
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        let cwd = std::env::current_dir().map_err(MasterchefError::Io)?;
        Ok(normalize(&cwd.join(path)))
    }
}

/// Collapses `.`/`..` components lexically, without touching the
/// filesystem (the paths here may not exist yet relative to cwd).
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn parse_document(path: &Path, raw: &str) -> Result<Document, MasterchefError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if is_json {
        serde_json::from_str(raw).map_err(|e| MasterchefError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    } else {
        serde_yaml::from_str(raw).map_err(|e| MasterchefError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

/// Applies the §4.1.4 merge rules, folding `source` into `dest` in place.
fn merge_into(dest: &mut Document, source: Document) {
    if !source.version.is_empty() {
        dest.version = source.version;
    }

    upsert_hosts(&mut dest.inventory.hosts, source.inventory.hosts);
    merge_execution(&mut dest.execution, source.execution);
    upsert_resources(&mut dest.resources, source.resources);
    upsert_resources(&mut dest.handlers, source.handlers);
}

fn upsert_hosts(dest: &mut Vec<Host>, source: Vec<Host>) {
    let mut index: HashMap<String, usize> = dest
        .iter()
        .enumerate()
        .map(|(i, h)| (h.name.clone(), i))
        .collect();
    for host in source {
        if let Some(&i) = index.get(&host.name) {
            dest[i] = host;
        } else {
            index.insert(host.name.clone(), dest.len());
            dest.push(host);
        }
    }
}

fn upsert_resources(dest: &mut Vec<Resource>, source: Vec<Resource>) {
    let mut index: HashMap<String, usize> = dest
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();
    for resource in source {
        if let Some(&i) = index.get(&resource.id) {
            dest[i] = resource;
        } else {
            index.insert(resource.id.clone(), dest.len());
            dest.push(resource);
        }
    }
}

fn merge_execution(dest: &mut Execution, source: Execution) {
    if !source.strategy.is_empty() {
        dest.strategy = source.strategy;
    }
    if source.serial != 0 {
        dest.serial = source.serial;
    }
    if !source.failure_domain.is_empty() {
        dest.failure_domain = source.failure_domain;
    }
    if source.max_fail_percentage != 0 {
        dest.max_fail_percentage = source.max_fail_percentage;
    }
    if source.any_errors_fatal {
        dest.any_errors_fatal = source.any_errors_fatal;
    }
}
