//! All-or-nothing execution of [`Mutation`] sequences with
//! privilege-escalation retry.
//!
//! A [`TransactionRunner`] applies one mutation at a time. When the current
//! process lacks permission it hands the identical mutation to an
//! [`Elevator`], which re-runs it with elevated privileges. A [`Transaction`]
//! groups the steps of one verb and keeps an undo stack so a failure partway
//! restores the pre-call state.
use std::io;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::error::MarbleError;
use crate::exec::Executor;
use crate::fs_ops::{FileSystemOps, Mutation, SystemFileSystemOps};

/// Result line printed by the elevated child process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElevatedOutcome {
    /// Whether the mutation succeeded.
    pub success: bool,
    /// Error text when it did not.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ElevatedOutcome {
    /// Translate the result of performing a mutation.
    #[must_use]
    pub fn from_result(result: io::Result<()>) -> Self {
        match result {
            Ok(()) => Self {
                success: true,
                error: None,
            },
            Err(e) => Self {
                success: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Capability to perform a mutation with elevated privileges.
#[cfg_attr(test, mockall::automock)]
pub trait Elevator: std::fmt::Debug {
    /// Run `mutation` in a privileged context and report its outcome.
    ///
    /// # Errors
    ///
    /// Returns an error if the privileged context could not be reached or
    /// its answer could not be read.
    fn elevate(&self, mutation: &Mutation) -> Result<ElevatedOutcome>;
}

/// [`Elevator`] that re-executes this binary through `sudo`.
///
/// The child is started as `sudo <exe> run-elevated <function-id>
/// <args-json>` and prints a single [`ElevatedOutcome`] as JSON on stdout.
#[derive(Debug, Clone)]
pub struct SudoElevator {
    executor: Arc<dyn Executor>,
}

impl SudoElevator {
    /// Create an elevator that runs `sudo` through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self { executor }
    }
}

impl Elevator for SudoElevator {
    fn elevate(&self, mutation: &Mutation) -> Result<ElevatedOutcome> {
        if !self.executor.which("sudo") {
            anyhow::bail!("sudo is not available");
        }
        let exe = std::env::current_exe().context("locating the current executable")?;
        let exe = exe.to_string_lossy();
        let args = mutation
            .args_json()
            .context("serializing mutation for elevated retry")?;
        let result = self.executor.run_capture_stdout(
            "sudo",
            &[&exe, "run-elevated", mutation.function_id(), &args],
        )?;
        parse_outcome(&result.stdout).with_context(|| {
            format!(
                "unreadable reply from elevated process (exit {})",
                result.code.unwrap_or(-1)
            )
        })
    }
}

/// Parse the last non-empty stdout line as an [`ElevatedOutcome`].
fn parse_outcome(stdout: &str) -> Result<ElevatedOutcome> {
    let line = stdout
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .context("no output")?;
    Ok(serde_json::from_str(line.trim())?)
}

/// Applies mutations, retrying with elevated privileges on
/// permission errors.
#[derive(Debug)]
pub struct TransactionRunner {
    fs_ops: Box<dyn FileSystemOps>,
    elevator: Box<dyn Elevator>,
}

impl TransactionRunner {
    /// Runner performing mutations directly on the filesystem.
    #[must_use]
    pub fn new(elevator: Box<dyn Elevator>) -> Self {
        Self::with_fs_ops(Box::new(SystemFileSystemOps), elevator)
    }

    /// Runner using a custom filesystem layer.
    #[must_use]
    pub fn with_fs_ops(fs_ops: Box<dyn FileSystemOps>, elevator: Box<dyn Elevator>) -> Self {
        Self { fs_ops, elevator }
    }

    /// Apply one mutation.
    ///
    /// # Errors
    ///
    /// Returns [`MarbleError::PermissionDenied`] if the mutation was refused
    /// and the elevated retry failed too, or [`MarbleError::Io`] for any
    /// other failure.
    pub fn apply(&self, mutation: &Mutation) -> Result<(), MarbleError> {
        tracing::debug!("{} {}", mutation.function_id(), mutation.target().display());
        match self.fs_ops.perform(mutation) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => self.escalate(mutation),
            Err(e) => Err(MarbleError::io(
                format!("{} {}", mutation.function_id(), mutation.target().display()),
                e,
            )),
        }
    }

    fn escalate(&self, mutation: &Mutation) -> Result<(), MarbleError> {
        let path = mutation.target().to_path_buf();
        tracing::info!(
            "permission denied on {}, retrying with elevated privileges",
            path.display()
        );
        match self.elevator.elevate(mutation) {
            Ok(ElevatedOutcome { success: true, .. }) => Ok(()),
            Ok(ElevatedOutcome { error, .. }) => {
                tracing::warn!(
                    "elevated {} failed: {}",
                    mutation.function_id(),
                    error.as_deref().unwrap_or("unknown error")
                );
                Err(MarbleError::PermissionDenied { path })
            }
            Err(e) => {
                tracing::warn!("elevation unavailable: {e:#}");
                Err(MarbleError::PermissionDenied { path })
            }
        }
    }

    /// Start a transaction for `verb`.
    #[must_use]
    pub const fn begin(&self, verb: &'static str) -> Transaction<'_> {
        Transaction {
            runner: self,
            verb,
            undo: Vec::new(),
        }
    }
}

/// Steps of one verb together with the mutations that reverse them.
#[derive(Debug)]
pub struct Transaction<'a> {
    runner: &'a TransactionRunner,
    verb: &'static str,
    undo: Vec<Vec<Mutation>>,
}

impl Transaction<'_> {
    /// Number of steps applied so far.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.undo.len()
    }

    /// Apply `mutation` and remember `undo` (run in order) to reverse it.
    ///
    /// # Errors
    ///
    /// On failure every earlier step is rolled back. A failing first step
    /// returns its own error; a later one is wrapped in
    /// [`MarbleError::PartialFailure`].
    pub fn apply(&mut self, mutation: &Mutation, undo: Vec<Mutation>) -> Result<(), MarbleError> {
        match self.runner.apply(mutation) {
            Ok(()) => {
                self.undo.push(undo);
                Ok(())
            }
            Err(e) => Err(self.abort(e)),
        }
    }

    /// Roll back every applied step and return `error` in its final form.
    pub fn abort(&mut self, error: MarbleError) -> MarbleError {
        let completed = self.completed();
        if completed == 0 {
            return error;
        }
        tracing::warn!("{} failed, rolling back {completed} step(s)", self.verb);
        while let Some(steps) = self.undo.pop() {
            for step in &steps {
                if let Err(e) = self.runner.apply(step) {
                    tracing::warn!("rollback step {} failed: {e}", step.function_id());
                }
            }
        }
        MarbleError::PartialFailure {
            verb: self.verb,
            completed,
            source: Box::new(error),
        }
    }

    /// Finish successfully, discarding the undo stack.
    pub fn commit(self) {
        tracing::debug!("{} committed {} step(s)", self.verb, self.completed());
    }
}

#[cfg(test)]
#[allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use crate::exec::test_helpers::MockExecutor;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Records every mutation and fails those whose function id is listed.
    #[derive(Debug, Default)]
    struct ScriptedFs {
        fail: Vec<(&'static str, io::ErrorKind)>,
        seen: Arc<Mutex<Vec<String>>>,
    }

    impl FileSystemOps for ScriptedFs {
        fn perform(&self, mutation: &Mutation) -> io::Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(mutation.function_id().to_string());
            match self.fail.iter().find(|(id, _)| *id == mutation.function_id()) {
                Some((_, kind)) => Err(io::Error::from(*kind)),
                None => Ok(()),
            }
        }
    }

    fn unlink(path: &str) -> Mutation {
        Mutation::Unlink {
            path: PathBuf::from(path),
            force: true,
        }
    }

    fn project() -> Mutation {
        Mutation::Project {
            internal: PathBuf::from("/m/etc/hosts"),
            external: PathBuf::from("/etc/hosts"),
        }
    }

    fn never_elevate() -> Box<dyn Elevator> {
        let mut elevator = MockElevator::new();
        elevator.expect_elevate().never();
        Box::new(elevator)
    }

    #[test]
    fn permission_denied_is_retried_elevated() {
        let fs = ScriptedFs {
            fail: vec![("project", io::ErrorKind::PermissionDenied)],
            ..ScriptedFs::default()
        };
        let mut elevator = MockElevator::new();
        elevator
            .expect_elevate()
            .withf(|m| m.function_id() == "project")
            .times(1)
            .returning(|_| Ok(ElevatedOutcome::from_result(Ok(()))));
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), Box::new(elevator));
        runner.apply(&project()).unwrap();
    }

    #[test]
    fn failed_elevation_surfaces_permission_denied() {
        let fs = ScriptedFs {
            fail: vec![("project", io::ErrorKind::PermissionDenied)],
            ..ScriptedFs::default()
        };
        let mut elevator = MockElevator::new();
        elevator
            .expect_elevate()
            .times(1)
            .returning(|_| Ok(ElevatedOutcome::from_result(Err(io::Error::other("nope")))));
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), Box::new(elevator));
        let err = runner.apply(&project()).unwrap_err();
        assert!(matches!(err, MarbleError::PermissionDenied { .. }));
    }

    #[test]
    fn unreachable_elevator_surfaces_permission_denied() {
        let fs = ScriptedFs {
            fail: vec![("project", io::ErrorKind::PermissionDenied)],
            ..ScriptedFs::default()
        };
        let mut elevator = MockElevator::new();
        elevator
            .expect_elevate()
            .returning(|_| Err(anyhow::anyhow!("sudo: no tty")));
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), Box::new(elevator));
        assert!(runner.apply(&project()).unwrap_err().is_permission_denied());
    }

    #[test]
    fn other_errors_are_not_escalated() {
        let fs = ScriptedFs {
            fail: vec![("project", io::ErrorKind::NotFound)],
            ..ScriptedFs::default()
        };
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), never_elevate());
        let err = runner.apply(&project()).unwrap_err();
        assert!(matches!(err, MarbleError::Io { .. }));
        assert!(err.to_string().starts_with("project /etc/hosts"));
    }

    #[test]
    fn first_step_failure_is_returned_unwrapped() {
        let fs = ScriptedFs {
            fail: vec![("copy_file", io::ErrorKind::NotFound)],
            ..ScriptedFs::default()
        };
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), never_elevate());
        let mut tx = runner.begin("collect");
        let err = tx
            .apply(
                &Mutation::CopyFile {
                    src: PathBuf::from("/a"),
                    dest: PathBuf::from("/b"),
                },
                vec![unlink("/b")],
            )
            .unwrap_err();
        assert!(matches!(err, MarbleError::Io { .. }));
    }

    #[test]
    fn later_failure_rolls_back_in_reverse_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fs = ScriptedFs {
            fail: vec![("project", io::ErrorKind::Other)],
            seen: Arc::clone(&seen),
        };
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), never_elevate());
        let mut tx = runner.begin("collect");
        tx.apply(
            &Mutation::CopyFile {
                src: PathBuf::from("/etc/hosts"),
                dest: PathBuf::from("/m/etc/hosts"),
            },
            vec![
                unlink("/m/etc/hosts"),
                Mutation::PruneEmptyDirs {
                    start: PathBuf::from("/m/etc"),
                    stop_at: PathBuf::from("/m"),
                },
            ],
        )
        .unwrap();
        let err = tx.apply(&project(), vec![]).unwrap_err();

        match err {
            MarbleError::PartialFailure {
                verb,
                completed,
                source,
            } => {
                assert_eq!(verb, "collect");
                assert_eq!(completed, 1);
                assert!(matches!(*source, MarbleError::Io { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["copy_file", "project", "unlink", "prune_empty_dirs"]
        );
        assert_eq!(tx.completed(), 0);
    }

    #[test]
    fn rollback_failures_do_not_mask_original_error() {
        let fs = ScriptedFs {
            fail: vec![
                ("project", io::ErrorKind::Other),
                ("unlink", io::ErrorKind::Other),
            ],
            ..ScriptedFs::default()
        };
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), never_elevate());
        let mut tx = runner.begin("touch");
        tx.apply(
            &Mutation::CreateEmpty {
                path: PathBuf::from("/m/home/new"),
            },
            vec![unlink("/m/home/new")],
        )
        .unwrap();
        let err = tx.apply(&project(), vec![]).unwrap_err();
        let MarbleError::PartialFailure { source, .. } = err else {
            panic!("expected partial failure");
        };
        assert!(source.to_string().contains("project"));
    }

    #[test]
    fn abort_after_external_failure_rolls_back() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let fs = ScriptedFs {
            seen: Arc::clone(&seen),
            ..ScriptedFs::default()
        };
        let runner = TransactionRunner::with_fs_ops(Box::new(fs), never_elevate());
        let mut tx = runner.begin("touch");
        tx.apply(
            &Mutation::CreateEmpty {
                path: PathBuf::from("/m/home/new"),
            },
            vec![unlink("/m/home/new")],
        )
        .unwrap();
        let err = tx.abort(MarbleError::Exec {
            program: "vim".to_string(),
            message: "exit 1".to_string(),
        });
        assert!(matches!(err, MarbleError::PartialFailure { completed: 1, .. }));
        assert_eq!(*seen.lock().unwrap(), vec!["create_empty", "unlink"]);
    }

    #[test]
    fn sudo_elevator_invokes_run_elevated() {
        let executor = Arc::new(MockExecutor::with_responses(vec![(
            true,
            "some sudo noise\n{\"success\":true}\n".to_string(),
        )]));
        let elevator = SudoElevator::new(Arc::clone(&executor) as Arc<dyn Executor>);
        let outcome = elevator.elevate(&project()).unwrap();
        assert!(outcome.success);

        let calls = executor.calls();
        let (program, args) = &calls[0];
        assert_eq!(program, "sudo");
        assert_eq!(args[1], "run-elevated");
        assert_eq!(args[2], "project");
        assert_eq!(Mutation::from_call(&args[2], &args[3]).unwrap(), project());
    }

    #[test]
    fn sudo_elevator_rejects_garbage_reply() {
        let executor = Arc::new(MockExecutor::with_responses(vec![(
            false,
            "sudo: a password is required".to_string(),
        )]));
        let elevator = SudoElevator::new(executor);
        assert!(elevator.elevate(&project()).is_err());
    }

    #[test]
    fn sudo_elevator_needs_sudo() {
        let executor = Arc::new(MockExecutor::with_responses(Vec::new()).with_which(false));
        let elevator = SudoElevator::new(Arc::clone(&executor) as Arc<dyn Executor>);
        assert!(elevator.elevate(&project()).is_err());
        assert!(executor.calls().is_empty());
    }

    #[test]
    fn outcome_serializes_compactly() {
        let ok = ElevatedOutcome::from_result(Ok(()));
        insta::assert_snapshot!(serde_json::to_string(&ok).unwrap(), @r#"{"success":true}"#);
        let failed: ElevatedOutcome =
            serde_json::from_str(r#"{"success":false,"error":"denied"}"#).unwrap();
        assert_eq!(failed.error.as_deref(), Some("denied"));
    }
}
