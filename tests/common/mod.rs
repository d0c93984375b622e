// Shared helpers for integration tests.
//
// Provides a temporary marble next to a temporary "external" tree (a fake
// home and a fake etc), plus hand-written fakes for the executor, elevator
// and filesystem seams so each test can script failures.
//
// Used by all integration test binaries that declare `mod common;`.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use realitymarble::config::CONFIG_FILE_NAME;
use realitymarble::exec::{ExecResult, Executor};
use realitymarble::fs_ops::{FileSystemOps, Mutation};
use realitymarble::marble::RealityMarble;
use realitymarble::transaction::{ElevatedOutcome, Elevator, TransactionRunner};

/// An isolated marble and external tree backed by a [`tempfile::TempDir`].
pub struct MarbleTestContext {
    /// Temporary directory holding everything below.
    pub dir: tempfile::TempDir,
    /// Marble root.
    pub marble: PathBuf,
    /// External root mapped by the `home` rule (reveal-hidden).
    pub home: PathBuf,
    /// External root mapped by the `etc` rule (identity).
    pub etc: PathBuf,
}

impl MarbleTestContext {
    /// Create a context with `home` and `etc` rules.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");
        let base = dunce::canonicalize(dir.path()).expect("canonicalize temp dir");
        let marble = base.join("customizations");
        let home = base.join("home");
        let etc = base.join("etc");
        for d in [&marble, &home, &etc] {
            fs::create_dir_all(d).expect("create fixture dir");
        }
        let config = serde_json::json!({
            "phantasms": [
                { "name": "etc", "type": "identity", "joint_path": etc },
                { "name": "home", "type": "reveal-hidden", "joint_path": home },
            ]
        });
        fs::write(marble.join(CONFIG_FILE_NAME), config.to_string()).expect("write config");
        Self {
            dir,
            marble,
            home,
            etc,
        }
    }

    /// Write `content` to `relative` under the fake home, creating parents.
    pub fn home_file(&self, relative: &str, content: &str) -> PathBuf {
        write_with_parents(&self.home.join(relative), content)
    }

    /// Write `content` to `relative` under the fake etc, creating parents.
    pub fn etc_file(&self, relative: &str, content: &str) -> PathBuf {
        write_with_parents(&self.etc.join(relative), content)
    }

    /// Write `content` to `relative` inside the marble, creating parents.
    pub fn stored_file(&self, relative: &str, content: &str) -> PathBuf {
        write_with_parents(&self.marble.join(relative), content)
    }

    /// Start building a marble for this context.
    pub fn builder(&self) -> MarbleBuilder<'_> {
        MarbleBuilder {
            ctx: self,
            executor: ScriptedExecutor::default(),
            elevator: FakeElevator::refusing(),
            fs_ops: None,
        }
    }

    /// Open a marble with default fakes.
    pub fn open(&self) -> RealityMarble {
        self.builder().build()
    }

    /// Every file below the marble root except the configuration.
    pub fn stored_files(&self) -> Vec<PathBuf> {
        let mut out = Vec::new();
        collect_files(&self.marble, &mut out);
        out.retain(|p| p.file_name().is_none_or(|n| n != CONFIG_FILE_NAME));
        out.sort();
        out
    }
}

fn write_with_parents(path: &Path, content: &str) -> PathBuf {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent");
    }
    fs::write(path, content).expect("write file");
    path.to_path_buf()
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("read dir") {
        let path = entry.expect("dir entry").path();
        if path.is_dir() {
            collect_files(&path, out);
        } else {
            out.push(path);
        }
    }
}

/// Fluent builder for a [`RealityMarble`] wired to test fakes.
pub struct MarbleBuilder<'a> {
    ctx: &'a MarbleTestContext,
    executor: ScriptedExecutor,
    elevator: FakeElevator,
    fs_ops: Option<FailingFs>,
}

impl MarbleBuilder<'_> {
    /// Use `executor` for the diff tool and the editor.
    pub fn executor(mut self, executor: ScriptedExecutor) -> Self {
        self.executor = executor;
        self
    }

    /// Use `elevator` for permission retries.
    pub fn elevator(mut self, elevator: FakeElevator) -> Self {
        self.elevator = elevator;
        self
    }

    /// Inject filesystem failures.
    pub fn fs_ops(mut self, fs_ops: FailingFs) -> Self {
        self.fs_ops = Some(fs_ops);
        self
    }

    /// Open the marble.
    pub fn build(self) -> RealityMarble {
        let runner = match self.fs_ops {
            Some(fs_ops) => TransactionRunner::with_fs_ops(Box::new(fs_ops), Box::new(self.elevator)),
            None => TransactionRunner::new(Box::new(self.elevator)),
        };
        RealityMarble::open(&self.ctx.marble, Arc::new(self.executor))
            .expect("open marble")
            .with_runner(runner)
            .with_editor("fake-editor")
    }
}

/// [`Executor`] answering from a queue of `(success, stdout)` pairs and
/// recording every call.
#[derive(Debug, Default, Clone)]
pub struct ScriptedExecutor {
    responses: Arc<Mutex<VecDeque<(bool, String)>>>,
    calls: Arc<Mutex<Vec<(String, Vec<String>)>>>,
}

impl ScriptedExecutor {
    /// Answer calls in order with `responses`.
    pub fn with_responses(responses: Vec<(bool, String)>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses.into())),
            calls: Arc::default(),
        }
    }

    /// Every `(program, args)` seen so far.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().expect("calls lock").clone()
    }

    fn next(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.calls.lock().expect("calls lock").push((
            program.to_string(),
            args.iter().map(ToString::to_string).collect(),
        ));
        let (success, stdout) = self
            .responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("unexpected call to {program}"))?;
        Ok(ExecResult {
            stdout,
            stderr: String::new(),
            success,
            code: Some(i32::from(!success)),
        })
    }
}

impl Executor for ScriptedExecutor {
    fn run_unchecked(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.next(program, args)
    }

    fn run_interactive(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.next(program, args)
    }

    fn run_capture_stdout(&self, program: &str, args: &[&str]) -> anyhow::Result<ExecResult> {
        self.next(program, args)
    }

    fn which(&self, _program: &str) -> bool {
        true
    }
}

/// [`Elevator`] that either performs the mutation in-process (standing in
/// for a successful `sudo` child) or refuses, recording every request.
#[derive(Debug, Clone)]
pub struct FakeElevator {
    grants: bool,
    requests: Arc<Mutex<Vec<Mutation>>>,
}

impl FakeElevator {
    /// Elevator whose privileged child performs the mutation.
    pub fn granting() -> Self {
        Self {
            grants: true,
            requests: Arc::default(),
        }
    }

    /// Elevator whose privileged child always reports failure.
    pub fn refusing() -> Self {
        Self {
            grants: false,
            requests: Arc::default(),
        }
    }

    /// Every mutation handed over for elevation.
    pub fn requests(&self) -> Vec<Mutation> {
        self.requests.lock().expect("requests lock").clone()
    }
}

impl Elevator for FakeElevator {
    fn elevate(&self, mutation: &Mutation) -> anyhow::Result<ElevatedOutcome> {
        self.requests
            .lock()
            .expect("requests lock")
            .push(mutation.clone());
        if self.grants {
            Ok(ElevatedOutcome::from_result(mutation.perform()))
        } else {
            Ok(ElevatedOutcome {
                success: false,
                error: Some("sudo: a password is required".to_string()),
            })
        }
    }
}

/// [`FileSystemOps`] that fails chosen mutations and performs the rest.
#[derive(Debug, Clone, Default)]
pub struct FailingFs {
    failures: Arc<Mutex<Vec<(&'static str, io::ErrorKind)>>>,
    performed: Arc<Mutex<Vec<Mutation>>>,
}

impl FailingFs {
    /// Fail the next mutation with function id `function` with `kind`.
    /// Each registered failure fires once.
    pub fn fail_once(self, function: &'static str, kind: io::ErrorKind) -> Self {
        self.failures
            .lock()
            .expect("failures lock")
            .push((function, kind));
        self
    }

    /// Every mutation that was actually carried out.
    pub fn performed(&self) -> Vec<Mutation> {
        self.performed.lock().expect("performed lock").clone()
    }
}

impl FileSystemOps for FailingFs {
    fn perform(&self, mutation: &Mutation) -> io::Result<()> {
        let mut failures = self.failures.lock().expect("failures lock");
        if let Some(pos) = failures
            .iter()
            .position(|(f, _)| *f == mutation.function_id())
        {
            let (_, kind) = failures.remove(pos);
            return Err(io::Error::new(kind, "injected failure"));
        }
        drop(failures);
        mutation.perform()?;
        self.performed
            .lock()
            .expect("performed lock")
            .push(mutation.clone());
        Ok(())
    }
}
