//! # Executor
//!
//! Walks a `Plan`'s steps in their planner-determined order, dispatching
//! each to the transport and resource handler registries and assembling a
//! `RunRecord`, per §4.7. All three strategies execute steps in the same
//! order within the same logical worker (§5) — `strategy` only changes
//! whether a failure stops the loop early, never the ordering itself.
//! `serial`'s batching-by-host is explicitly a higher-orchestration-layer
//! concern per §4.7 and is not implemented here.
//!
//! A sequential walk-then-record loop per §5's single-logical-worker
//! model; no semaphore or `JoinSet` involved, since only one step ever
//! runs at a time.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use crate::config::EngineConfig;
use crate::handlers::HandlerRegistry;
use crate::model::{Execution, Plan, ResourceRun, RunRecord, RunStatus, STRATEGY_FREE};
use crate::transport::TransportRegistry;

/// Cooperative cancellation flag shared between a caller and the running
/// executor. Checked between steps, never mid-step (§5: the in-flight step
/// is always allowed to finish).
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Executes every step in `plan`, honoring `plan.execution.strategy`, and
/// returns the assembled run record. If `token` is cancelled between steps,
/// the loop stops before dispatching the next one and the record is still
/// returned with `status = Failed`, carrying every `ResourceRun` collected up
/// to that point — cancellation never discards completed work.
pub async fn execute(
    plan: &Plan,
    transports: &TransportRegistry,
    handlers: &HandlerRegistry,
    config: &EngineConfig,
    token: &CancellationToken,
) -> Result<RunRecord, crate::errors::MasterchefError> {
    let started_at = Utc::now();
    let mut results: Vec<ResourceRun> = Vec::new();
    let mut failed_count = 0usize;
    let mut stopped_early = false;
    let mut cancelled = false;
    let mut notified: BTreeSet<String> = BTreeSet::new();

    let strategy = plan.execution.effective_strategy().to_string();

    for step in &plan.steps {
        if token.is_cancelled() {
            cancelled = true;
            stopped_early = true;
            break;
        }

        let outcome = crate::handlers::apply_step(step, transports, handlers, config).await;

        if outcome.changed && !outcome.failed {
            for name in step.resource.notify.iter().chain(step.resource.notify_handlers.iter()) {
                notified.insert(name.clone());
            }
        }

        if outcome.failed {
            failed_count += 1;
        }

        results.push(ResourceRun {
            resource_id: step.resource.id.clone(),
            kind: step.resource.kind.clone(),
            host: step.host.name.clone(),
            changed: outcome.changed,
            skipped: outcome.skipped,
            message: outcome.message,
        });

        if outcome.failed && should_stop(&strategy, &plan.execution, failed_count, results.len()) {
            stopped_early = true;
            break;
        }
    }

    if !stopped_early {
        for handler_id in &notified {
            if let Some(step) = plan.handlers.get(handler_id) {
                let outcome = crate::handlers::apply_step(step, transports, handlers, config).await;
                if outcome.failed {
                    failed_count += 1;
                }
                results.push(ResourceRun {
                    resource_id: step.resource.id.clone(),
                    kind: step.resource.kind.clone(),
                    host: step.host.name.clone(),
                    changed: outcome.changed,
                    skipped: outcome.skipped,
                    message: outcome.message,
                });
            }
        }
    }

    let ended_at = Utc::now();
    let status = if cancelled || failed_count > 0 {
        RunStatus::Failed
    } else {
        RunStatus::Succeeded
    };

    Ok(RunRecord {
        id: started_at.format("%Y%m%dT%H%M%S%.6fZ").to_string(),
        started_at,
        ended_at,
        status,
        results,
    })
}

/// Whether a just-observed step failure should halt the remaining steps.
/// `linear` and `serial` always stop; `free` only stops for
/// `any_errors_fatal` or once `max_fail_percentage` of the steps attempted
/// so far have failed.
fn should_stop(strategy: &str, execution: &Execution, failed_count: usize, attempted: usize) -> bool {
    if strategy != STRATEGY_FREE {
        return true;
    }
    if execution.any_errors_fatal {
        return true;
    }
    if execution.max_fail_percentage == 0 {
        return false;
    }
    let fail_percentage = (failed_count * 100) / attempted.max(1);
    fail_percentage as u32 >= execution.max_fail_percentage
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, Resource, RESOURCE_TYPE_COMMAND, STRATEGY_LINEAR};

    fn step(id: &str, host: &str, command: &str) -> crate::model::Step {
        crate::model::Step {
            order: 1,
            host: Host {
                name: host.to_string(),
                transport: "local".to_string(),
                ..Default::default()
            },
            resource: Resource {
                id: id.to_string(),
                kind: RESOURCE_TYPE_COMMAND.to_string(),
                command: command.to_string(),
                ..Default::default()
            },
        }
    }

    fn plan_with(steps: Vec<crate::model::Step>, execution: Execution) -> Plan {
        Plan {
            steps,
            handlers: Default::default(),
            execution,
        }
    }

    #[tokio::test]
    async fn scenario_four_free_strategy_with_any_errors_fatal_stops_after_one_step() {
        let execution = Execution {
            strategy: STRATEGY_FREE.to_string(),
            any_errors_fatal: true,
            ..Execution::default()
        };
        let plan = plan_with(
            vec![step("a", "h1", "exit 1"), step("b", "h2", "exit 0")],
            execution,
        );

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.results.len(), 1);
    }

    #[tokio::test]
    async fn free_strategy_without_any_errors_fatal_runs_every_step() {
        let execution = Execution {
            strategy: STRATEGY_FREE.to_string(),
            ..Execution::default()
        };
        let plan = plan_with(
            vec![step("a", "h1", "exit 1"), step("b", "h2", "exit 0")],
            execution,
        );

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.results.len(), 2);
    }

    #[tokio::test]
    async fn free_strategy_stops_once_max_fail_percentage_is_reached() {
        let execution = Execution {
            strategy: STRATEGY_FREE.to_string(),
            max_fail_percentage: 50,
            ..Execution::default()
        };
        let plan = plan_with(
            vec![
                step("a", "h1", "exit 1"),
                step("b", "h2", "exit 0"),
                step("c", "h3", "exit 0"),
            ],
            execution,
        );

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.results.len(), 1);
    }

    #[tokio::test]
    async fn linear_strategy_stops_at_first_failure() {
        let execution = Execution {
            strategy: STRATEGY_LINEAR.to_string(),
            ..Execution::default()
        };
        let plan = plan_with(vec![step("a", "h1", "exit 1"), step("b", "h1", "exit 0")], execution);

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert_eq!(run.results.len(), 1);
    }

    #[tokio::test]
    async fn cancelled_token_halts_before_next_step_and_persists_partial_results() {
        let token = CancellationToken::new();
        token.cancel();
        let plan = plan_with(
            vec![step("a", "h1", "echo hi"), step("b", "h1", "echo hi")],
            Execution::default(),
        );

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &token,
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(run.results.is_empty());
    }

    #[tokio::test]
    async fn cancellation_mid_plan_keeps_completed_results() {
        let token = CancellationToken::new();
        let cancel_token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel_token.cancel();
        });

        let plan = plan_with(
            vec![
                step("a", "h1", "sleep 0.05"),
                step("b", "h1", "sleep 0.05"),
                step("c", "h1", "sleep 0.05"),
                step("d", "h1", "sleep 0.05"),
            ],
            Execution::default(),
        );

        let run = execute(
            &plan,
            &TransportRegistry::new(),
            &HandlerRegistry::new(),
            &EngineConfig::default(),
            &token,
        )
        .await
        .unwrap();

        assert_eq!(run.status, RunStatus::Failed);
        assert!(!run.results.is_empty());
        assert!(run.results.len() < plan.steps.len());
    }
}
