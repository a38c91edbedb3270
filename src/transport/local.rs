//! Local transport: runs commands and writes files directly on the machine
//! executing the engine.

use std::path::Path;

use async_trait::async_trait;

use crate::model::Host;

use super::{CommandOutcome, FileOutcome, Transport, TransportError};

pub struct LocalTransport;

#[async_trait]
impl Transport for LocalTransport {
    async fn run_command(&self, _host: &Host, command: &str) -> Result<CommandOutcome, TransportError> {
        let output = tokio::process::Command::new("sh")
            .arg("-lc")
            .arg(command)
            .output()
            .await?;
        Ok(CommandOutcome {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }

    async fn write_file(
        &self,
        _host: &Host,
        path: &str,
        content: &[u8],
        mode: Option<&str>,
    ) -> Result<FileOutcome, TransportError> {
        write_local_file(path, content, mode)
    }
}

/// Writes `content` to `path`, creating parent directories with mode 0755
/// and the file itself with mode 0644 unless an explicit `mode` is given,
/// per §4.7. Returns `changed = false` without touching the file when its
/// bytes already match.
pub fn write_local_file(path: &str, content: &[u8], mode: Option<&str>) -> Result<FileOutcome, TransportError> {
    let target = Path::new(path);
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
            apply_mode(parent, "0755")?;
        }
    }

    if let Ok(existing) = std::fs::read(target) {
        if existing == content {
            return Ok(FileOutcome { changed: false });
        }
    }

    std::fs::write(target, content)?;
    apply_mode(target, mode.unwrap_or("0644"))?;

    Ok(FileOutcome { changed: true })
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: &str) -> Result<(), TransportError> {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(bits) = u32::from_str_radix(mode.trim_start_matches("0o"), 8) {
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(bits))?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: &str) -> Result<(), TransportError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn run_command_captures_stdout_and_exit_code() {
        let transport = LocalTransport;
        let outcome = transport
            .run_command(&Host::default(), "echo hello")
            .await
            .unwrap();
        assert_eq!(outcome.stdout.trim(), "hello");
        assert_eq!(outcome.exit_code, 0);
    }

    #[tokio::test]
    async fn run_command_reports_nonzero_exit() {
        let transport = LocalTransport;
        let outcome = transport.run_command(&Host::default(), "exit 3").await.unwrap();
        assert_eq!(outcome.exit_code, 3);
        assert!(!outcome.success());
    }

    #[test]
    fn writing_identical_content_is_not_a_change() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        let path_str = path.to_str().unwrap();

        let first = write_local_file(path_str, b"hello", None).unwrap();
        assert!(first.changed);

        let second = write_local_file(path_str, b"hello", None).unwrap();
        assert!(!second.changed);
    }

    #[test]
    fn writing_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/dir/f.txt");
        let path_str = path.to_str().unwrap();

        let outcome = write_local_file(path_str, b"hi", None).unwrap();
        assert!(outcome.changed);
        assert!(path.exists());
    }
}
