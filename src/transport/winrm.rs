//! WinRM transport. No `winrm` crate exists anywhere in the dependency
//! pack, so this is the operator shim §4.7 describes: only `localhost` is
//! supported, by delegating straight to `LocalTransport`. Any other
//! hostname is a transport error.

use async_trait::async_trait;

use crate::model::Host;

use super::{CommandOutcome, FileOutcome, LocalTransport, Transport, TransportError};

pub struct WinRmTransport;

#[async_trait]
impl Transport for WinRmTransport {
    async fn run_command(&self, host: &Host, command: &str) -> Result<CommandOutcome, TransportError> {
        if host.name != "localhost" {
            return Err(TransportError::Unsupported);
        }
        LocalTransport.run_command(host, command).await
    }

    async fn write_file(
        &self,
        host: &Host,
        path: &str,
        content: &[u8],
        mode: Option<&str>,
    ) -> Result<FileOutcome, TransportError> {
        if host.name != "localhost" {
            return Err(TransportError::Unsupported);
        }
        LocalTransport.write_file(host, path, content, mode).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn localhost_falls_back_to_local_execution() {
        let host = Host {
            name: "localhost".to_string(),
            ..Default::default()
        };
        let outcome = WinRmTransport.run_command(&host, "echo hi").await.unwrap();
        assert_eq!(outcome.stdout.trim(), "hi");
    }

    #[tokio::test]
    async fn non_localhost_is_unsupported() {
        let host = Host {
            name: "winbox".to_string(),
            ..Default::default()
        };
        let err = WinRmTransport.run_command(&host, "echo hi").await.unwrap_err();
        assert!(matches!(err, TransportError::Unsupported));
    }
}
