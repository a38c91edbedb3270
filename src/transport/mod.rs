//! # Transport registry
//!
//! The dispatch layer §4.7 describes: a read-only, startup-built map from
//! transport name to handler. A name-keyed lookup rather than a linearly
//! scanned `can_handle` registry, since transports here are selected by an
//! exact string (`local`, `ssh`, `winrm`, or `plugin/<name>`) rather than
//! by predicate.

pub mod local;
pub mod plugin;
pub mod ssh;
pub mod winrm;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Host, PLUGIN_PREFIX, TRANSPORT_LOCAL, TRANSPORT_SSH, TRANSPORT_WINRM};

pub use local::LocalTransport;
pub use plugin::{PluginOutcome, PluginTransport};
pub use ssh::SshTransport;
pub use winrm::WinRmTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("non-local hosts not yet supported by transport")]
    Unsupported,

    #[error("privilege escalation via become is not supported for winrm")]
    BecomeNotSupportedOnWinrm,
}

#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileOutcome {
    pub changed: bool,
}

/// The local/ssh/winrm built-in transports all implement this: run a shell
/// command on the host, or write a file's bytes to the host.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run_command(&self, host: &Host, command: &str) -> Result<CommandOutcome, TransportError>;

    async fn write_file(
        &self,
        host: &Host,
        path: &str,
        content: &[u8],
        mode: Option<&str>,
    ) -> Result<FileOutcome, TransportError>;
}

/// The read-only set of transports available to the executor, built once at
/// startup. Plugins are looked up by the suffix after `plugin/`.
pub struct TransportRegistry {
    local: LocalTransport,
    ssh: SshTransport,
    winrm: WinRmTransport,
    plugins: std::collections::HashMap<String, Box<dyn PluginTransport>>,
}

impl TransportRegistry {
    pub fn new() -> Self {
        Self {
            local: LocalTransport,
            ssh: SshTransport,
            winrm: WinRmTransport,
            plugins: std::collections::HashMap::new(),
        }
    }

    /// Registers a plugin transport. Intended to happen once at startup;
    /// calling this after steps have begun executing is a programming
    /// error, per §5's registries note.
    pub fn register_plugin(&mut self, name: impl Into<String>, plugin: Box<dyn PluginTransport>) {
        self.plugins.insert(name.into(), plugin);
    }

    pub fn resolve(&self, transport: &str) -> Option<&dyn Transport> {
        match transport {
            TRANSPORT_LOCAL => Some(&self.local),
            TRANSPORT_SSH => Some(&self.ssh),
            TRANSPORT_WINRM => Some(&self.winrm),
            _ => None,
        }
    }

    pub fn resolve_plugin(&self, transport: &str) -> Option<&dyn PluginTransport> {
        transport
            .strip_prefix(PLUGIN_PREFIX)
            .and_then(|name| self.plugins.get(name))
            .map(|b| b.as_ref())
    }
}

impl Default for TransportRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_built_in_transports() {
        let registry = TransportRegistry::new();
        assert!(registry.resolve(TRANSPORT_LOCAL).is_some());
        assert!(registry.resolve(TRANSPORT_SSH).is_some());
        assert!(registry.resolve(TRANSPORT_WINRM).is_some());
        assert!(registry.resolve("bogus").is_none());
    }

    #[test]
    fn unregistered_plugin_resolves_to_none() {
        let registry = TransportRegistry::new();
        assert!(registry.resolve_plugin("plugin/docker").is_none());
    }
}
