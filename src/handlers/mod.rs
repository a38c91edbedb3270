//! # Resource handlers
//!
//! One handler per resource `type`, each implementing the idempotence,
//! guard, retry, and privilege-escalation rules of §4.7. Dispatch is by a
//! small `can_handle`/`apply` registry rather than a serde-tagged enum
//! match, so adding a resource type never touches the executor loop.

pub mod command;
pub mod file;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::model::{Step, RESOURCE_TYPE_COMMAND, RESOURCE_TYPE_FILE};
use crate::transport::Transport;

/// The result of applying one step, independent of resource type.
#[derive(Debug, Clone)]
pub struct HandlerOutcome {
    pub changed: bool,
    pub skipped: bool,
    pub failed: bool,
    pub message: String,
    pub session_path: Option<String>,
}

impl HandlerOutcome {
    pub(crate) fn skip(message: impl Into<String>) -> Self {
        Self {
            changed: false,
            skipped: true,
            failed: false,
            message: message.into(),
            session_path: None,
        }
    }

    pub(crate) fn fail(message: impl Into<String>) -> Self {
        Self {
            changed: false,
            skipped: false,
            failed: true,
            message: message.into(),
            session_path: None,
        }
    }
}

#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn can_handle(&self, kind: &str) -> bool;

    async fn apply(&self, step: &Step, transport: &dyn Transport, config: &EngineConfig) -> HandlerOutcome;
}

pub struct HandlerRegistry {
    handlers: Vec<Box<dyn ResourceHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: vec![Box::new(file::FileHandler), Box::new(command::CommandHandler)],
        }
    }

    pub fn resolve(&self, kind: &str) -> Option<&dyn ResourceHandler> {
        self.handlers.iter().find(|h| h.can_handle(kind)).map(|b| b.as_ref())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_known_type(kind: &str) -> bool {
    matches!(kind, RESOURCE_TYPE_FILE | RESOURCE_TYPE_COMMAND)
}

/// Dispatches a single step to its transport and resource handler. Plugin
/// transports (`plugin/<name>`) bypass the handler registry entirely, since
/// they implement resource semantics the core doesn't know about (§6).
pub async fn apply_step(
    step: &Step,
    transports: &crate::transport::TransportRegistry,
    handlers: &HandlerRegistry,
    config: &EngineConfig,
) -> HandlerOutcome {
    if let Some(plugin) = transports.resolve_plugin(&step.host.transport) {
        let outcome = plugin.apply(step).await;
        return HandlerOutcome {
            changed: outcome.changed,
            skipped: outcome.skipped,
            failed: outcome.error.is_some(),
            message: outcome.error.unwrap_or(outcome.message),
            session_path: None,
        };
    }

    let Some(transport) = transports.resolve(&step.host.transport) else {
        return HandlerOutcome::fail(format!("unknown transport '{}'", step.host.transport));
    };

    if !is_known_type(&step.resource.kind) {
        return HandlerOutcome::fail(format!("unsupported resource type '{}'", step.resource.kind));
    }

    let Some(handler) = handlers.resolve(&step.resource.kind) else {
        return HandlerOutcome::fail(format!("unsupported resource type '{}'", step.resource.kind));
    };

    handler.apply(step, transport, config).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_both_builtin_types() {
        let registry = HandlerRegistry::new();
        assert!(registry.resolve(RESOURCE_TYPE_FILE).is_some());
        assert!(registry.resolve(RESOURCE_TYPE_COMMAND).is_some());
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn known_type_helper_matches_builtins() {
        assert!(is_known_type(RESOURCE_TYPE_FILE));
        assert!(is_known_type(RESOURCE_TYPE_COMMAND));
        assert!(!is_known_type("network"));
    }
}
