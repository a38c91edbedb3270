//! `command` resource handler: guards, retry, privilege escalation, and
//! post-execution `until_contains` checks.

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::config::EngineConfig;
use crate::model::{
    Host, Resource, SessionRecord, Step, RESOURCE_TYPE_COMMAND, TRANSPORT_SSH, TRANSPORT_WINRM,
};
use crate::retry::{with_retry, RetryPolicy};
use crate::session::{truncate_output, write_session_record};
use crate::transport::{CommandOutcome, Transport};

use super::{HandlerOutcome, ResourceHandler};

pub struct CommandHandler;

#[async_trait]
impl ResourceHandler for CommandHandler {
    fn can_handle(&self, kind: &str) -> bool {
        kind == RESOURCE_TYPE_COMMAND
    }

    async fn apply(&self, step: &Step, transport: &dyn Transport, config: &EngineConfig) -> HandlerOutcome {
        let resource = &step.resource;
        let host = &step.host;

        if !resource.creates.is_empty() && Path::new(&resource.creates).exists() {
            return HandlerOutcome::skip(format!("guarded by creates={}", resource.creates));
        }

        if host.transport == TRANSPORT_WINRM && resource.r#become {
            return HandlerOutcome::fail(
                "privilege escalation via become is not supported for winrm",
            );
        }

        if !resource.only_if.is_empty() {
            match run_guard_command(transport, host, resource, &resource.only_if).await {
                Ok(outcome) if !outcome.success() => {
                    return HandlerOutcome::skip(format!("guarded by only_if={}", resource.only_if))
                }
                Err(message) => return HandlerOutcome::fail(message),
                _ => {}
            }
        }

        if !resource.unless.is_empty() {
            match run_guard_command(transport, host, resource, &resource.unless).await {
                Ok(outcome) if outcome.success() => {
                    return HandlerOutcome::skip(format!("guarded by unless={}", resource.unless))
                }
                Err(message) => return HandlerOutcome::fail(message),
                _ => {}
            }
        }

        let payload = wrap_become(&resource.command, resource);
        let policy = RetryPolicy::from_resource(resource);
        let attempts = Arc::new(AtomicU32::new(0));
        let started_at = Utc::now();

        let until_contains = resource.until_contains.clone();
        let result = with_retry(&resource.id, policy, {
            let attempts = attempts.clone();
            let payload = payload.clone();
            let until_contains = until_contains.clone();
            move || {
                let attempts = attempts.clone();
                let payload = payload.clone();
                let until_contains = until_contains.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    let outcome = transport.run_command(host, &payload).await.map_err(|e| e.to_string())?;
                    let satisfies_until = until_contains
                        .as_deref()
                        .map(|needle| outcome.combined_output().contains(needle))
                        .unwrap_or(true);
                    if outcome.success() && satisfies_until {
                        Ok(outcome)
                    } else {
                        Err(format!("exit code {}: {}", outcome.exit_code, outcome.combined_output()))
                    }
                }
            }
        })
        .await;

        let ended_at = Utc::now();
        let attempts_used = attempts.load(Ordering::SeqCst);

        let mut outcome = match result {
            Ok(command_outcome) => {
                let mut message = command_outcome.combined_output();
                if message.is_empty() {
                    message = "command executed".to_string();
                }
                if attempts_used > 1 {
                    message = format!("{} (succeeded after {} attempts)", message, attempts_used);
                }
                HandlerOutcome {
                    changed: true,
                    skipped: false,
                    failed: false,
                    message,
                    session_path: None,
                }
            }
            Err(message) => HandlerOutcome::fail(message),
        };

        // session records are an ssh+become artifact; local escalation has no
        // remote session to audit.
        if resource.r#become && host.transport == TRANSPORT_SSH {
            match write_command_session(config, host, resource, started_at, ended_at, &outcome) {
                Ok(path) => {
                    outcome.message = format!("{}; session record: {}", outcome.message, path);
                }
                Err(err) => {
                    outcome.message = format!("{}; session record write failed: {}", outcome.message, err);
                }
            }
        }

        outcome
    }
}

/// Wraps `payload` with `sudo [-u '<become_user>']` when `resource.r#become`
/// is set, escaping single quotes so the payload survives shell requoting.
fn wrap_become(payload: &str, resource: &Resource) -> String {
    if !resource.r#become {
        return payload.to_string();
    }
    let escaped = payload.replace('\'', "'\\''");
    if resource.become_user.is_empty() {
        format!("sudo sh -lc '{}'", escaped)
    } else {
        format!("sudo -u '{}' sh -lc '{}'", resource.become_user, escaped)
    }
}

async fn run_guard_command(
    transport: &dyn Transport,
    host: &Host,
    resource: &Resource,
    guard: &str,
) -> Result<CommandOutcome, String> {
    let payload = wrap_become(guard, resource);
    transport.run_command(host, &payload).await.map_err(|e| e.to_string())
}

fn write_command_session(
    config: &EngineConfig,
    host: &Host,
    resource: &Resource,
    started_at: chrono::DateTime<Utc>,
    ended_at: chrono::DateTime<Utc>,
    outcome: &HandlerOutcome,
) -> Result<String, String> {
    let record = SessionRecord {
        resource: resource.id.clone(),
        host: host.name.clone(),
        transport: host.transport.clone(),
        r#become: resource.r#become,
        become_user: resource.become_user.clone(),
        started_at,
        ended_at,
        exit_code: if outcome.failed { Some(1) } else { Some(0) },
        truncated_output: truncate_output(&outcome.message, config.session_truncate_bytes),
    };

    write_session_record(&config.sessions_dir(), &resource.id, started_at, &record)
        .map(|path| path.display().to_string())
        .map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Host;
    use crate::transport::local::LocalTransport;

    fn step_with_command(command: &str) -> Step {
        Step {
            order: 1,
            host: Host::default(),
            resource: Resource {
                id: "c1".to_string(),
                kind: RESOURCE_TYPE_COMMAND.to_string(),
                command: command.to_string(),
                ..Default::default()
            },
        }
    }

    #[tokio::test]
    async fn successful_command_reports_changed() {
        let step = step_with_command("echo hello");
        let outcome = CommandHandler
            .apply(&step, &LocalTransport, &EngineConfig::default())
            .await;
        assert!(outcome.changed);
        assert!(!outcome.failed);
        assert!(outcome.message.contains("hello"));
    }

    #[tokio::test]
    async fn creates_guard_skips_execution() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("marker");
        std::fs::write(&marker, b"present").unwrap();

        let mut step = step_with_command("echo should-not-run");
        step.resource.creates = marker.to_str().unwrap().to_string();

        let outcome = CommandHandler
            .apply(&step, &LocalTransport, &EngineConfig::default())
            .await;
        assert!(outcome.skipped);
        assert!(!outcome.changed);
    }

    #[tokio::test]
    async fn retries_until_until_contains_is_satisfied() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("counter");
        std::fs::write(&counter, b"0").unwrap();
        let counter_path = counter.to_str().unwrap().to_string();

        let mut step = step_with_command(&format!(
            "n=$(cat {0}); n=$((n+1)); echo $n > {0}; echo attempt-$n",
            counter_path
        ));
        step.resource.retries = 3;
        step.resource.retry_delay_seconds = 0;
        step.resource.until_contains = Some("attempt-2".to_string());

        let outcome = CommandHandler
            .apply(&step, &LocalTransport, &EngineConfig::default())
            .await;
        assert!(outcome.changed);
        assert!(outcome.message.contains("succeeded after 2 attempts"));
    }

    #[tokio::test]
    async fn local_transport_with_become_does_not_write_a_session_record() {
        let mut step = step_with_command("echo hi");
        step.resource.r#become = true;

        let outcome = CommandHandler
            .apply(&step, &LocalTransport, &EngineConfig::default())
            .await;
        assert!(!outcome.message.contains("session record"));
    }

    #[tokio::test]
    async fn winrm_rejects_become() {
        let mut step = step_with_command("echo hi");
        step.host.transport = TRANSPORT_WINRM.to_string();
        step.resource.r#become = true;

        let outcome = CommandHandler
            .apply(&step, &LocalTransport, &EngineConfig::default())
            .await;
        assert!(outcome.failed);
    }

    #[test]
    fn wrap_become_escapes_single_quotes() {
        let resource = Resource {
            r#become: true,
            become_user: "deploy".to_string(),
            ..Default::default()
        };
        let wrapped = wrap_become("echo 'hi'", &resource);
        assert!(wrapped.starts_with("sudo -u 'deploy' sh -lc '"));
        assert!(!wrapped.contains("-lc 'echo 'hi''"));
    }

    #[test]
    fn wrap_become_is_noop_when_not_escalated() {
        let resource = Resource::default();
        assert_eq!(wrap_become("echo hi", &resource), "echo hi");
    }
}
