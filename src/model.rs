//! # Document data model
//!
//! This module defines the declarative input (`Document`) the engine
//! compiles into a `Plan`, plus the `Plan`/`Step`/`RunRecord` shapes
//! produced downstream. One set of structs backs both accepted
//! serializations (`.json` and everything else, decoded as YAML) via the
//! same `#[derive(Serialize, Deserialize)]` pair, just pointed at two
//! format crates instead of one.
//!
//! Field documentation intentionally mirrors §3's data model; see that
//! section for the authoritative description of each invariant.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub const DOCUMENT_VERSION: &str = "v0";

/// The top-level desired-state record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub version: String,

    #[serde(default)]
    pub includes: Vec<String>,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub overlays: Vec<String>,

    #[serde(default)]
    pub inventory: Inventory,

    #[serde(default)]
    pub execution: Execution,

    #[serde(default)]
    pub resources: Vec<Resource>,

    #[serde(default)]
    pub handlers: Vec<Resource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// A target machine description plus transport and classification metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    pub name: String,

    #[serde(default)]
    pub transport: String,

    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub port: u32,
    #[serde(default)]
    pub jump_address: String,
    #[serde(default)]
    pub jump_user: String,
    #[serde(default)]
    pub jump_port: u32,
    #[serde(default)]
    pub proxy_command: String,

    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub topology: HashMap<String, String>,
}

/// Fleet-wide execution policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Execution {
    #[serde(default)]
    pub strategy: String,
    #[serde(default)]
    pub serial: u32,
    #[serde(default)]
    pub failure_domain: String,
    #[serde(default)]
    pub max_fail_percentage: u32,
    #[serde(default)]
    pub any_errors_fatal: bool,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            strategy: String::new(),
            serial: 0,
            failure_domain: String::new(),
            max_fail_percentage: 0,
            any_errors_fatal: false,
        }
    }
}

pub const STRATEGY_LINEAR: &str = "linear";
pub const STRATEGY_FREE: &str = "free";
pub const STRATEGY_SERIAL: &str = "serial";

impl Execution {
    /// The effective strategy, defaulting to `linear` when unset.
    pub fn effective_strategy(&self) -> &str {
        if self.strategy.is_empty() {
            STRATEGY_LINEAR
        } else {
            &self.strategy
        }
    }
}

pub const RESOURCE_TYPE_FILE: &str = "file";
pub const RESOURCE_TYPE_COMMAND: &str = "command";

pub const TRANSPORT_LOCAL: &str = "local";
pub const TRANSPORT_SSH: &str = "ssh";
pub const TRANSPORT_WINRM: &str = "winrm";
pub const TRANSPORT_AUTO: &str = "auto";
pub const PLUGIN_PREFIX: &str = "plugin/";

pub const BACKOFF_CONSTANT: &str = "constant";
pub const BACKOFF_LINEAR: &str = "linear";
pub const BACKOFF_EXPONENTIAL: &str = "exponential";

/// An addressable unit of desired state, discriminated by `type`.
///
/// Modeled as one flat struct with type-specific fields left empty/zero
/// when irrelevant, rather than a serde-tagged enum, because §4.1's merge
/// rules (`upsert by id; source replaces destination entirely`) and §4.2's
/// expansion (clone + mutate individual fields) are both easiest to express
/// over a single concrete type. `kind()` and the `*_fields_valid` helpers in
/// `validation` are what give call sites the type-local guarantees a tagged
/// enum would otherwise provide for free.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub delegate_to: Option<String>,

    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub require: Vec<String>,
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub notify: Vec<String>,
    #[serde(default)]
    pub subscribe: Vec<String>,
    #[serde(default)]
    pub notify_handlers: Vec<String>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub when: String,
    #[serde(default)]
    pub matrix: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub r#loop: Vec<String>,
    #[serde(default)]
    pub loop_var: Option<String>,

    // file fields
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub mode: String,
    #[serde(default)]
    pub checksum: Option<String>,
    #[serde(default)]
    pub signature: Option<String>,

    // command fields
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub creates: String,
    #[serde(default)]
    pub only_if: String,
    #[serde(default)]
    pub unless: String,
    #[serde(default)]
    pub refresh_only: bool,
    #[serde(default)]
    pub refresh_command: String,
    #[serde(default)]
    pub r#become: bool,
    #[serde(default)]
    pub become_user: String,
    #[serde(default)]
    pub rescue_command: String,
    #[serde(default)]
    pub always_command: String,
    #[serde(default)]
    pub retries: i64,
    #[serde(default)]
    pub retry_delay_seconds: i64,
    #[serde(default)]
    pub retry_backoff: String,
    #[serde(default)]
    pub retry_jitter_seconds: u64,
    #[serde(default)]
    pub until_contains: Option<String>,
}

impl Resource {
    pub fn retry_backoff_kind(&self) -> &str {
        if self.retry_backoff.is_empty() {
            BACKOFF_CONSTANT
        } else {
            &self.retry_backoff
        }
    }
}

/// The totally ordered, acyclic result of the planner over a validated
/// document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub handlers: HashMap<String, Step>,
    pub execution: Execution,
}

/// A plan entry pairing a resource with its resolved execution host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub order: usize,
    pub host: Host,
    pub resource: Resource,
}

/// One invocation of the executor over a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    pub status: RunStatus,
    pub results: Vec<ResourceRun>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRun {
    pub resource_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub host: String,
    pub changed: bool,
    pub skipped: bool,
    pub message: String,
}

/// The on-disk audit artifact written when a privileged remote command
/// executes (see §6, "Session record format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub resource: String,
    pub host: String,
    pub transport: String,
    pub r#become: bool,
    pub become_user: String,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub ended_at: chrono::DateTime<chrono::Utc>,
    pub exit_code: Option<i32>,
    pub truncated_output: String,
}

/// Persisted plan used to detect regressions between runs (§6, "Snapshot
/// format").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub version: String,
    pub plan: Plan,
}

impl Snapshot {
    pub fn new(plan: Plan) -> Self {
        Self {
            version: "v1".to_string(),
            plan,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execution_default_strategy_is_linear() {
        let exec = Execution::default();
        assert_eq!(exec.effective_strategy(), STRATEGY_LINEAR);
    }

    #[test]
    fn resource_default_backoff_is_constant() {
        let resource = Resource::default();
        assert_eq!(resource.retry_backoff_kind(), BACKOFF_CONSTANT);
    }

    #[test]
    fn document_round_trips_through_json() {
        let mut doc = Document::default();
        doc.version = DOCUMENT_VERSION.to_string();
        doc.inventory.hosts.push(Host {
            name: "web1".to_string(),
            transport: TRANSPORT_LOCAL.to_string(),
            ..Default::default()
        });
        let json = serde_json::to_string(&doc).unwrap();
        let decoded: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.inventory.hosts.len(), 1);
        assert_eq!(decoded.inventory.hosts[0].name, "web1");
    }
}
