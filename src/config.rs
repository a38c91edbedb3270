//! # Engine configuration
//!
//! Layers defaults with `MASTERCHEF_*` environment variables: a plain
//! struct with a `Default` impl and an `from_env()` constructor that only
//! overrides fields an operator actually set.

use std::path::PathBuf;

/// Truncation length for session record output, in bytes. Not specified by
/// the external interface contract (§9 open question (b)); resolved here
/// and recorded in the grounding ledger.
pub const DEFAULT_SESSION_TRUNCATE_BYTES: usize = 4096;

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Root directory under which `.masterchef/runs` and
    /// `.masterchef/sessions` are created.
    pub base_dir: PathBuf,
    /// Maximum bytes of combined command output kept in a session record.
    pub session_truncate_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            session_truncate_bytes: DEFAULT_SESSION_TRUNCATE_BYTES,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("MASTERCHEF_BASE_DIR") {
            config.base_dir = PathBuf::from(dir);
        }
        if let Ok(bytes) = std::env::var("MASTERCHEF_SESSION_TRUNCATE_BYTES") {
            if let Ok(parsed) = bytes.parse::<usize>() {
                config.session_truncate_bytes = parsed;
            }
        }

        config
    }

    pub fn runs_dir(&self) -> PathBuf {
        self.base_dir.join(".masterchef").join("runs")
    }

    pub fn sessions_dir(&self) -> PathBuf {
        self.base_dir.join(".masterchef").join("sessions")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_dir_is_current_directory() {
        let config = EngineConfig::default();
        assert_eq!(config.base_dir, PathBuf::from("."));
        assert_eq!(config.session_truncate_bytes, DEFAULT_SESSION_TRUNCATE_BYTES);
    }

    #[test]
    fn runs_and_sessions_dirs_are_namespaced_under_dot_masterchef() {
        let config = EngineConfig {
            base_dir: PathBuf::from("/srv/fleet"),
            session_truncate_bytes: 1024,
        };
        assert_eq!(config.runs_dir(), PathBuf::from("/srv/fleet/.masterchef/runs"));
        assert_eq!(
            config.sessions_dir(),
            PathBuf::from("/srv/fleet/.masterchef/sessions")
        );
    }
}
