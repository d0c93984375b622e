//! External program execution behind the [`Executor`] trait.
//!
//! The marble shells out to three kinds of programs: the difference tool
//! used by `project`, the user's editor used by `touch`, and `sudo` for
//! privilege escalation. All of them go through an [`Executor`] so tests can
//! script the responses.
use anyhow::{Context, Result};
use std::process::{Command, Output, Stdio};

/// Result of a command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output (empty when stdout was inherited).
    pub stdout: String,
    /// Captured standard error (empty when stderr was inherited).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
}

impl From<Output> for ExecResult {
    fn from(output: Output) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        }
    }
}

/// Abstraction over running external programs.
pub trait Executor: std::fmt::Debug {
    /// Run a command and capture its output, allowing failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command attached to the terminal (stdin, stdout and stderr
    /// inherited), allowing failure.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Run a command with stdin and stderr attached to the terminal and
    /// stdout captured, allowing failure. Used where the child may prompt
    /// (for example for a password) but its result is read from stdout.
    ///
    /// # Errors
    ///
    /// Returns an error only if the program cannot be started.
    fn run_capture_stdout(&self, program: &str, args: &[&str]) -> Result<ExecResult>;

    /// Check whether a program is available on `PATH`.
    fn which(&self, program: &str) -> bool;
}

/// [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let status = Command::new(program)
            .args(args)
            .status()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult {
            stdout: String::new(),
            stderr: String::new(),
            success: status.success(),
            code: status.code(),
        })
    }

    fn run_capture_stdout(&self, program: &str, args: &[&str]) -> Result<ExecResult> {
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::inherit())
            .stderr(Stdio::inherit())
            .stdout(Stdio::piped())
            .output()
            .with_context(|| format!("failed to execute: {program}"))?;
        Ok(ExecResult::from(output))
    }

    fn which(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }
}


#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn run_unchecked_captures_stdout() {
        let result = SystemExecutor.run_unchecked("echo", &["hello"]).unwrap();
        assert!(result.success);
        assert_eq!(result.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[test]
    fn run_unchecked_reports_failure() {
        let result = SystemExecutor.run_unchecked("false", &[]).unwrap();
        assert!(!result.success);
        assert_eq!(result.code, Some(1));
    }

    #[cfg(unix)]
    #[test]
    fn run_interactive_reports_status() {
        let result = SystemExecutor.run_interactive("true", &[]).unwrap();
        assert!(result.success);
        assert!(result.stdout.is_empty());
    }

    #[test]
    fn missing_program_is_error() {
        assert!(
            SystemExecutor
                .run_unchecked("this-program-does-not-exist-12345", &[])
                .is_err()
        );
        assert!(!SystemExecutor.which("this-program-does-not-exist-12345"));
    }

    #[test]
    fn mock_records_calls_in_order() {
        let mock = test_helpers::MockExecutor::with_responses(vec![
            (true, "a".to_string()),
            (false, String::new()),
        ]);
        assert!(mock.run_unchecked("diff", &["-q", "x", "y"]).unwrap().success);
        assert!(!mock.run_unchecked("vim", &["f"]).unwrap().success);
        assert!(!mock.run_unchecked("extra", &[]).unwrap().success);
        let calls = mock.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.first().map(|c| c.0.as_str()), Some("diff"));
    }
}
