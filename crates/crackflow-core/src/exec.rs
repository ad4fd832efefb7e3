//! Single-shot command execution: run to completion and return stdout.

use crate::error::ProcessError;
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs a command and awaits its full textual result.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String, ProcessError>;
}

/// Executor backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandExecutor;

#[async_trait]
impl CommandExecutor for TokioCommandExecutor {
    async fn execute(&self, program: &str, args: &[String]) -> Result<String, ProcessError> {
        debug!(program, ?args, "Executing command");

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProcessError::Io {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(ProcessError::NonZeroExit {
                program: program.to_string(),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_returns_stdout() {
        let out = TokioCommandExecutor
            .execute("echo", &["hello".to_string()])
            .await
            .expect("execute failed");
        assert_eq!(out, "hello\n");
    }

    #[tokio::test]
    async fn test_execute_non_zero_exit() {
        let err = TokioCommandExecutor
            .execute("sh", &["-c".to_string(), "echo bad >&2; exit 4".to_string()])
            .await
            .unwrap_err();
        match err {
            ProcessError::NonZeroExit { code, stderr, .. } => {
                assert_eq!(code, Some(4));
                assert_eq!(stderr, "bad");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_execute_missing_program() {
        let err = TokioCommandExecutor
            .execute("crackflow-definitely-not-installed", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessError::Io { .. }));
    }
}
