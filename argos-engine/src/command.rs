//! External command execution
//!
//! Interface and bridge mutations are delegated to system tools (`ip`).
//! The [`CommandRunner`] trait is the seam that lets the lifecycle code be
//! exercised without touching the host network stack.

use argos_core::{Error, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::process::Command;
use tracing::{debug, error};

/// Executes an argv vector and returns its stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `argv[0]` with the remaining arguments.
    ///
    /// Fails with [`Error::Command`] (carrying stderr) on a non-zero exit and
    /// with [`Error::CommandNotFound`] when the executable is missing.
    async fn execute(&self, argv: &[String]) -> Result<String>;
}

/// Runner that spawns real processes
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn execute(&self, argv: &[String]) -> Result<String> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::ExecutionFailed("Empty command line".to_string()))?;

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => Error::CommandNotFound(program.clone()),
                _ => Error::Io(e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(Error::Command {
                context: "Command failed".to_string(),
                command: argv.join(" "),
                stderr: if stderr.is_empty() {
                    format!("Unknown error ({})", output.status)
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Build an argv vector from string slices
pub fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|p| p.to_string()).collect()
}

/// Run a command, replacing the failure context with `context`
pub async fn run_command(runner: &dyn CommandRunner, argv: &[String], context: &str) -> Result<String> {
    debug!(command = %argv.join(" "), "Executing");

    match runner.execute(argv).await {
        Ok(stdout) => Ok(stdout),
        Err(Error::Command { command, stderr, .. }) => {
            error!(command = %command, stderr = %stderr, "{}", context);
            Err(Error::Command {
                context: context.to_string(),
                command,
                stderr,
            })
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_executable() {
        let runner = SystemCommandRunner::new();
        let err = runner
            .execute(&argv(&["argos-definitely-not-a-binary", "--help"]))
            .await
            .unwrap_err();
        match err {
            Error::CommandNotFound(program) => assert_eq!(program, "argos-definitely-not-a-binary"),
            other => panic!("Expected CommandNotFound, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_argv() {
        let runner = SystemCommandRunner::new();
        assert!(runner.execute(&[]).await.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_and_stderr() {
        let runner = SystemCommandRunner::new();
        let out = runner
            .execute(&argv(&["sh", "-c", "echo hello"]))
            .await
            .unwrap();
        assert_eq!(out.trim(), "hello");

        let err = run_command(
            &runner,
            &argv(&["sh", "-c", "echo boom >&2; exit 3"]),
            "Failed to bring up interface eth0",
        )
        .await
        .unwrap_err();
        assert_eq!(err.to_string(), "Failed to bring up interface eth0: boom");
    }
}
