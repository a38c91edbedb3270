//! # Run store
//!
//! Persists `RunRecord`s to `<base>/.masterchef/runs/<id>.json`, per §4.8.
//! `replace_runs` stages a full rewrite in a sibling directory and renames
//! it into place, so a crash mid-write never leaves a half-updated store.

use std::path::{Path, PathBuf};

use crate::errors::StoreError;
use crate::model::RunRecord;

pub struct RunStore {
    runs_dir: PathBuf,
}

impl RunStore {
    pub fn new(runs_dir: impl Into<PathBuf>) -> Self {
        Self {
            runs_dir: runs_dir.into(),
        }
    }

    fn ensure_dir(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.runs_dir).map_err(|source| StoreError::CreateDir {
            path: self.runs_dir.clone(),
            source,
        })
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.runs_dir.join(format!("{}.json", sanitize_id(id)))
    }

    pub fn save_run(&self, run: &RunRecord) -> Result<(), StoreError> {
        self.ensure_dir()?;
        let path = self.path_for(&run.id);
        let json = serde_json::to_string_pretty(run)
            .map_err(|source| StoreError::Write { path: path.clone(), source: std::io::Error::new(std::io::ErrorKind::Other, source) })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Write { path, source })
    }

    pub fn get_run(&self, id: &str) -> Result<RunRecord, StoreError> {
        let path = self.path_for(id);
        let contents = std::fs::read_to_string(&path).map_err(|source| StoreError::Read { path: path.clone(), source })?;
        serde_json::from_str(&contents).map_err(|source| StoreError::Decode { path, source })
    }

    /// Lists up to `limit` runs, most recent first. `limit = 0` means
    /// unbounded.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>, StoreError> {
        if !self.runs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut runs = Vec::new();
        let entries = std::fs::read_dir(&self.runs_dir).map_err(|source| StoreError::Read {
            path: self.runs_dir.clone(),
            source,
        })?;

        for entry in entries {
            let entry = entry.map_err(|source| StoreError::Read {
                path: self.runs_dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = std::fs::read_to_string(&path).map_err(|source| StoreError::Read { path: path.clone(), source })?;
            let run: RunRecord = serde_json::from_str(&contents).map_err(|source| StoreError::Decode { path, source })?;
            runs.push(run);
        }

        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        if limit > 0 {
            runs.truncate(limit);
        }
        Ok(runs)
    }

    /// Atomically replaces the entire run store's contents with `records`:
    /// writes them to a staging directory, then renames it over `runs_dir`.
    pub fn replace_runs(&self, records: &[RunRecord]) -> Result<(), StoreError> {
        let staging = self.runs_dir.with_extension("staging");
        if staging.exists() {
            std::fs::remove_dir_all(&staging).map_err(|source| StoreError::CreateDir {
                path: staging.clone(),
                source,
            })?;
        }
        std::fs::create_dir_all(&staging).map_err(|source| StoreError::CreateDir {
            path: staging.clone(),
            source,
        })?;

        for record in records {
            let path = staging.join(format!("{}.json", sanitize_id(&record.id)));
            let json = serde_json::to_string_pretty(record)
                .map_err(|source| StoreError::Write { path: path.clone(), source: std::io::Error::new(std::io::ErrorKind::Other, source) })?;
            std::fs::write(&path, json).map_err(|source| StoreError::Write { path, source })?;
        }

        if self.runs_dir.exists() {
            std::fs::remove_dir_all(&self.runs_dir).map_err(|source| StoreError::CreateDir {
                path: self.runs_dir.clone(),
                source,
            })?;
        }
        std::fs::rename(&staging, &self.runs_dir).map_err(|e| StoreError::Replace(e.to_string()))
    }

    pub fn runs_dir(&self) -> &Path {
        &self.runs_dir
    }
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use chrono::{TimeZone, Utc};

    fn run(id: &str, started_at_secs: i64) -> RunRecord {
        RunRecord {
            id: id.to_string(),
            started_at: Utc.timestamp_opt(started_at_secs, 0).unwrap(),
            ended_at: Utc.timestamp_opt(started_at_secs + 1, 0).unwrap(),
            status: RunStatus::Succeeded,
            results: Vec::new(),
        }
    }

    #[test]
    fn save_and_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        let record = run("r1", 1000);
        store.save_run(&record).unwrap();
        let loaded = store.get_run("r1").unwrap();
        assert_eq!(loaded.id, "r1");
    }

    #[test]
    fn get_missing_run_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        assert!(store.get_run("nope").is_err());
    }

    #[test]
    fn list_runs_is_sorted_most_recent_first_and_respects_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        store.save_run(&run("old", 100)).unwrap();
        store.save_run(&run("new", 200)).unwrap();
        store.save_run(&run("newest", 300)).unwrap();

        let all = store.list_runs(0).unwrap();
        assert_eq!(all.iter().map(|r| r.id.as_str()).collect::<Vec<_>>(), vec!["newest", "new", "old"]);

        let limited = store.list_runs(2).unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(limited[0].id, "newest");
    }

    #[test]
    fn replace_runs_swaps_store_contents_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let store = RunStore::new(dir.path().join("runs"));
        store.save_run(&run("stale", 1)).unwrap();

        store.replace_runs(&[run("fresh", 2)]).unwrap();

        let all = store.list_runs(0).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, "fresh");
    }
}
