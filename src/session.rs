//! # Session recording
//!
//! Writes the audit artifact described in §6, "Session record format",
//! whenever a privileged remote command executes. One JSON file per
//! session under `<base>/.masterchef/sessions/`, named so a directory
//! listing sorts chronologically: `<rfc3339-ish-timestamp>-<resource_id>.json`.
//!
//! Serializes a record struct straight to a namespaced file under a
//! dotfile directory rather than through a database.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::errors::MasterchefError;
use crate::model::SessionRecord;

/// Truncates `output` to at most `limit` bytes on a UTF-8 boundary, appending
/// a marker so the record makes the truncation visible instead of silently
/// cutting output.
pub fn truncate_output(output: &str, limit: usize) -> String {
    if output.len() <= limit {
        return output.to_string();
    }
    let mut end = limit;
    while end > 0 && !output.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [truncated]", &output[..end])
}

/// Writes a session record to `<base>/.masterchef/sessions/` and returns its
/// path.
pub fn write_session_record(
    sessions_dir: &Path,
    resource_id: &str,
    started_at: DateTime<Utc>,
    record: &SessionRecord,
) -> Result<PathBuf, MasterchefError> {
    std::fs::create_dir_all(sessions_dir)?;

    let file_name = format!(
        "{}-{}.json",
        started_at.format("%Y%m%dT%H%M%S%.6fZ"),
        sanitize_id(resource_id),
    );
    let path = sessions_dir.join(file_name);

    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(&path, json)?;

    Ok(path)
}

fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
