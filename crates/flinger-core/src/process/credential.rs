//! Credential file creation through the external password tool.

use crate::error::{FlingerError, Result};
use super::layout::remove_if_exists;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Write the hashed password file by running `<tool> -g <password> <outfile>`.
///
/// A stale file at `out_file` is removed first and the parent directory is
/// created if needed. The tool must exit with status 0 and the file must
/// exist afterwards.
pub async fn write_credential_file(tool: &Path, password: &str, out_file: &Path) -> Result<()> {
    let fail = |message: String| FlingerError::CredentialWriteFailed {
        path: out_file.to_path_buf(),
        message,
    };

    if let Some(parent) = out_file.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| fail(format!("mkdir {} failed: {}", parent.display(), e)))?;
    }
    remove_if_exists(out_file).map_err(|e| fail(e.to_string()))?;

    // Never log the password itself
    info!(
        "Writing credential file {} with {}",
        out_file.display(),
        tool.display()
    );

    let mut cmd = Command::new(tool);
    cmd.arg("-g")
        .arg(password)
        .arg(out_file)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = tool.parent() {
        cmd.current_dir(dir);
    }

    let output = cmd
        .output()
        .await
        .map_err(|e| fail(format!("failed to run {}: {}", tool.display(), e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(fail(format!(
            "{} exited with {}: {}",
            tool.display(),
            output.status,
            stderr.trim()
        )));
    }

    if !out_file.exists() {
        return Err(fail(format!(
            "{} succeeded but did not create the file",
            tool.display()
        )));
    }

    debug!("Credential file {} written", out_file.display());
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_writes_file_with_tool() {
        let temp_dir = TempDir::new().unwrap();
        let tool = script(
            temp_dir.path(),
            "vncpasswd",
            r#"[ "$1" = "-g" ] || exit 2
printf '%s' "$2" > "$3""#,
        );
        let out = temp_dir.path().join("state/vncflinger.auth");

        write_credential_file(&tool, "p", &out).await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "p");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let temp_dir = TempDir::new().unwrap();
        let tool = script(temp_dir.path(), "vncpasswd", "echo nope >&2\nexit 1");
        let out = temp_dir.path().join("vncflinger.auth");

        let err = write_credential_file(&tool, "p", &out).await.unwrap_err();
        match err {
            FlingerError::CredentialWriteFailed { message, .. } => {
                assert!(message.contains("nope"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_tool_that_writes_nothing_fails() {
        let temp_dir = TempDir::new().unwrap();
        let tool = script(temp_dir.path(), "vncpasswd", "exit 0");
        let out = temp_dir.path().join("vncflinger.auth");
        std::fs::write(&out, "stale").unwrap();

        // The stale file is removed up front, so success without output fails
        assert!(write_credential_file(&tool, "p", &out).await.is_err());
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_missing_tool_fails() {
        let temp_dir = TempDir::new().unwrap();
        let out = temp_dir.path().join("vncflinger.auth");
        let result =
            write_credential_file(&temp_dir.path().join("missing"), "p", &out).await;
        assert!(matches!(
            result,
            Err(FlingerError::CredentialWriteFailed { .. })
        ));
    }
}
