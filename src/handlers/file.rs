//! `file` resource handler: idempotent content/mode management.

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::model::{Step, RESOURCE_TYPE_FILE};
use crate::transport::Transport;

use super::{HandlerOutcome, ResourceHandler};

pub struct FileHandler;

#[async_trait]
impl ResourceHandler for FileHandler {
    fn can_handle(&self, kind: &str) -> bool {
        kind == RESOURCE_TYPE_FILE
    }

    async fn apply(&self, step: &Step, transport: &dyn Transport, _config: &EngineConfig) -> HandlerOutcome {
        let resource = &step.resource;
        let mode = if resource.mode.is_empty() {
            None
        } else {
            Some(resource.mode.as_str())
        };

        match transport
            .write_file(&step.host, &resource.path, resource.content.as_bytes(), mode)
            .await
        {
            Ok(outcome) if outcome.changed => HandlerOutcome {
                changed: true,
                skipped: false,
                failed: false,
                message: "file updated".to_string(),
                session_path: None,
            },
            Ok(_) => HandlerOutcome {
                changed: false,
                skipped: false,
                failed: false,
                message: "file already in desired state".to_string(),
                session_path: None,
            },
            Err(err) => HandlerOutcome {
                changed: false,
                skipped: false,
                failed: true,
                message: err.to_string(),
                session_path: None,
            },
        }
    }
}
