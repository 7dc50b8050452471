//! Execution of generated programs.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum ExecutionFailure {
    #[error("failed to start interpreter '{interpreter}': {source}")]
    Spawn {
        interpreter: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to exchange data with the program: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },
}

/// Runs a program and returns its trimmed standard output.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    async fn execute(&self, program: &str, timeout: Duration) -> Result<String, ExecutionFailure>;
}

/// Runs programs with a local interpreter reading the source from stdin.
///
/// The child is killed when the timeout fires.
#[derive(Debug, Clone)]
pub struct PythonExecutor {
    interpreter: String,
}

impl PythonExecutor {
    /// Create a new executor for `interpreter` (e.g. `python3`).
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }
}

#[async_trait]
impl CodeExecutor for PythonExecutor {
    async fn execute(&self, program: &str, timeout: Duration) -> Result<String, ExecutionFailure> {
        let mut child = Command::new(&self.interpreter)
            .arg("-")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExecutionFailure::Spawn {
                interpreter: self.interpreter.clone(),
                source,
            })?;

        let run = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(program.as_bytes()).await?;
            }
            child.wait_with_output().await
        };

        let output = tokio::time::timeout(timeout, run)
            .await
            .map_err(|_| ExecutionFailure::Timeout(timeout))??;

        if !output.status.success() {
            return Err(ExecutionFailure::NonZeroExit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    // `sh -` reads its script from stdin like `python3 -`.
    fn shell() -> PythonExecutor {
        PythonExecutor::new("sh")
    }

    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let out = shell()
            .execute("echo '  42.5 '\n", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(out, "42.5");
    }

    #[tokio::test]
    async fn test_non_zero_exit() {
        let err = shell()
            .execute("echo oops >&2\nexit 3\n", Duration::from_secs(5))
            .await
            .unwrap_err();
        match err {
            ExecutionFailure::NonZeroExit { code, stderr } => {
                assert_eq!(code, Some(3));
                assert_eq!(stderr, "oops");
            }
            other => panic!("expected non-zero exit, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout() {
        let err = shell()
            .execute("sleep 10\n", Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_interpreter() {
        let err = PythonExecutor::new("/definitely-not-a-real-interpreter-12345")
            .execute("print(1)", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionFailure::Spawn { .. }));
    }
}
