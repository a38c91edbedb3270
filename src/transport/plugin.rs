//! Plugin transport interface, per §6: an external adapter registered at
//! runtime that receives a whole `Step` and reports `(changed, skipped,
//! message, error)` rather than the primitive run-command/write-file split
//! the built-in transports use, since a plugin may implement resource
//! semantics the core doesn't know about.

use async_trait::async_trait;

use crate::model::Step;

#[derive(Debug, Clone)]
pub struct PluginOutcome {
    pub changed: bool,
    pub skipped: bool,
    pub message: String,
    pub error: Option<String>,
}

#[async_trait]
pub trait PluginTransport: Send + Sync {
    async fn apply(&self, step: &Step) -> PluginOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Host, Resource};

    struct EchoPlugin;

    #[async_trait]
    impl PluginTransport for EchoPlugin {
        async fn apply(&self, step: &Step) -> PluginOutcome {
            PluginOutcome {
                changed: true,
                skipped: false,
                message: format!("applied {}", step.resource.id),
                error: None,
            }
        }
    }

    #[tokio::test]
    async fn plugin_trait_is_invokable() {
        let plugin = EchoPlugin;
        let step = Step {
            order: 1,
            host: Host::default(),
            resource: Resource {
                id: "x".to_string(),
                ..Default::default()
            },
        };
        let outcome = plugin.apply(&step).await;
        assert!(outcome.changed);
        assert_eq!(outcome.message, "applied x");
    }
}
