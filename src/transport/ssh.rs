//! SSH transport: shells out to the system `ssh` binary rather than linking
//! an SSH library, matching the rest of the dependency pack (nothing in it
//! pulls in `ssh2`/`russh`).

use std::io::Write;
use std::process::Stdio;

use async_trait::async_trait;

use crate::model::Host;

use super::{CommandOutcome, FileOutcome, Transport, TransportError};

pub struct SshTransport;

#[async_trait]
impl Transport for SshTransport {
    async fn run_command(&self, host: &Host, command: &str) -> Result<CommandOutcome, TransportError> {
        let mut args = ssh_args(host);
        args.push("sh".to_string());
        args.push("-lc".to_string());
        args.push(command.to_string());

        let output = tokio::process::Command::new("ssh").args(&args).output().await?;
        Ok(CommandOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn write_file(
        &self,
        host: &Host,
        path: &str,
        content: &[u8],
        mode: Option<&str>,
    ) -> Result<FileOutcome, TransportError> {
        let remote_mode = mode.unwrap_or("0644");
        let remote_command = format!(
            "mkdir -p \"$(dirname '{path}')\" && cat > '{path}' && chmod {mode} '{path}'",
            path = path,
            mode = remote_mode,
        );

        let mut args = ssh_args(host);
        args.push("sh".to_string());
        args.push("-lc".to_string());
        args.push(remote_command);

        let mut child = std::process::Command::new("ssh")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        child
            .stdin
            .take()
            .expect("piped stdin")
            .write_all(content)?;

        let status = child.wait()?;
        Ok(FileOutcome {
            changed: status.success(),
        })
    }
}

/// Composes the `ssh` argument list for `host`, per §4.7: `-p port`,
/// `-J user@jump:port` when jump fields are set, `-o ProxyCommand=...` when
/// set, then `user@address`.
pub fn ssh_args(host: &Host) -> Vec<String> {
    let mut args = Vec::new();

    if host.port != 0 {
        args.push("-p".to_string());
        args.push(host.port.to_string());
    }
    if !host.jump_address.is_empty() {
        args.push("-J".to_string());
        let jump = if host.jump_user.is_empty() {
            host.jump_address.clone()
        } else {
            format!("{}@{}", host.jump_user, host.jump_address)
        };
        let jump = if host.jump_port != 0 {
            format!("{}:{}", jump, host.jump_port)
        } else {
            jump
        };
        args.push(jump);
    }
    if !host.proxy_command.is_empty() {
        args.push("-o".to_string());
        args.push(format!("ProxyCommand={}", host.proxy_command));
    }

    let target = if host.user.is_empty() {
        host.address.clone()
    } else {
        format!("{}@{}", host.user, host.address)
    };
    args.push(target);

    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_minimal_args() {
        let host = Host {
            address: "10.0.0.1".to_string(),
            user: "deploy".to_string(),
            ..Default::default()
        };
        assert_eq!(ssh_args(&host), vec!["deploy@10.0.0.1".to_string()]);
    }

    #[test]
    fn composes_port_jump_and_proxy_command() {
        let host = Host {
            address: "10.0.0.1".to_string(),
            user: "deploy".to_string(),
            port: 2222,
            jump_address: "bastion".to_string(),
            jump_user: "ops".to_string(),
            jump_port: 22,
            proxy_command: "nc %h %p".to_string(),
            ..Default::default()
        };
        let args = ssh_args(&host);
        assert_eq!(
            args,
            vec![
                "-p".to_string(),
                "2222".to_string(),
                "-J".to_string(),
                "ops@bastion:22".to_string(),
                "-o".to_string(),
                "ProxyCommand=nc %h %p".to_string(),
                "deploy@10.0.0.1".to_string(),
            ]
        );
    }
}
