//! The reality marble and its verbs.
//!
//! [`RealityMarble`] owns the rule set loaded from the marble root and
//! exposes the five verbs. Each verb checks its preconditions without
//! touching the filesystem, then performs its mutations inside a
//! [`Transaction`](crate::transaction::Transaction) so that a failure
//! partway leaves everything as it was.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MarbleConfig;
use crate::config::validation::validate_all;
use crate::error::{IoContext as _, MarbleError, Side};
use crate::exec::Executor;
use crate::fs_ops::Mutation;
use crate::operation::{ConflictResolver, DeclineConflicts, MergeGate, Operation};
use crate::paths::{CanonicalPath, canonicalize, canonicalize_root, is_contained_in};
use crate::ruleset::RuleSet;
use crate::transaction::{SudoElevator, TransactionRunner};

/// Editor used by `touch` when `$EDITOR` is unset.
pub const DEFAULT_EDITOR: &str = "vim";

/// How a successful verb left the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerbOutcome {
    /// The verb changed the filesystem.
    Applied,
    /// The requested state was already in place; nothing changed.
    AlreadyCorrect,
}

/// The verbs a marble understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    /// Move an external file into the marble and link it back.
    Collect,
    /// Replace a managed link with a copy and remove the stored file.
    Drop,
    /// Link an external path to its stored file.
    Project,
    /// Replace a managed link with a copy, keeping the stored file.
    Materialize,
    /// Create and edit a new stored file, then link it.
    Touch,
}

impl Verb {
    /// Lower-case verb name, as used on the command line.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Collect => "collect",
            Self::Drop => "drop",
            Self::Project => "project",
            Self::Materialize => "materialize",
            Self::Touch => "touch",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A marble root together with its rules and the machinery to mutate files.
#[derive(Debug)]
pub struct RealityMarble {
    root: CanonicalPath,
    rules: RuleSet,
    runner: TransactionRunner,
    executor: Arc<dyn Executor>,
    resolver: Box<dyn ConflictResolver>,
    editor: String,
}

impl RealityMarble {
    /// Open the marble at `path`, creating the directory and a default
    /// configuration if needed.
    ///
    /// Privilege escalation goes through `sudo`, run by `executor`.
    ///
    /// # Errors
    ///
    /// Returns an error if the marble directory cannot be created or the
    /// configuration cannot be loaded.
    pub fn open(path: impl AsRef<Path>, executor: Arc<dyn Executor>) -> Result<Self, MarbleError> {
        let path = path.as_ref();
        let root = canonicalize_root(path).io_context("resolve marble root", path)?;
        if !root.as_path().exists() {
            tracing::info!("creating reality marble at {root}");
            fs::create_dir_all(root.as_path()).io_context("create", root.as_path())?;
        }

        let config = MarbleConfig::load_or_init(root.as_path())?;
        let rules = config.build_rules(&root)?;
        for warning in validate_all(&config, &rules, &root) {
            tracing::warn!("{warning}");
        }

        let elevator = SudoElevator::new(Arc::clone(&executor));
        Ok(Self::from_parts(
            root,
            rules,
            TransactionRunner::new(Box::new(elevator)),
            executor,
        ))
    }

    /// Assemble a marble from already-built parts.
    #[must_use]
    pub fn from_parts(
        root: CanonicalPath,
        rules: RuleSet,
        runner: TransactionRunner,
        executor: Arc<dyn Executor>,
    ) -> Self {
        Self {
            root: root.as_dir(),
            rules,
            runner,
            executor,
            resolver: Box::new(DeclineConflicts),
            editor: default_editor(),
        }
    }

    /// Replace the transaction runner.
    #[must_use]
    pub fn with_runner(mut self, runner: TransactionRunner) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the conflict resolver consulted by `project`.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Box<dyn ConflictResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use `editor` instead of `$EDITOR` for `touch`.
    #[must_use]
    pub fn with_editor(mut self, editor: impl Into<String>) -> Self {
        self.editor = editor.into();
        self
    }

    /// Canonical marble root, in directory form.
    #[must_use]
    pub const fn root(&self) -> &CanonicalPath {
        &self.root
    }

    /// The loaded rules.
    #[must_use]
    pub const fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Log the marble location and every rule.
    pub fn dump_config(&self) {
        tracing::info!("Reality Marble at {}", self.root);
        for line in self.rules.describe() {
            tracing::info!("    {line}");
        }
    }

    /// Canonicalize `path` without following a final symlink and reject
    /// anything inside the marble itself.
    ///
    /// # Errors
    ///
    /// Returns [`MarbleError::InsideMarble`] for paths in the marble, or an
    /// I/O error if a parent directory does not exist.
    pub fn resolve_external_path(&self, path: &Path) -> Result<CanonicalPath, MarbleError> {
        let external = canonicalize(path, false).io_context("resolve", path)?;
        if is_contained_in(&self.root, external.as_path()).io_context("resolve", path)? {
            return Err(MarbleError::InsideMarble {
                path: external.trimmed(),
            });
        }
        Ok(external)
    }

    /// Run `verb` on `path`.
    ///
    /// # Errors
    ///
    /// See the individual verbs.
    pub fn apply(&self, verb: Verb, path: &Path) -> Result<VerbOutcome, MarbleError> {
        match verb {
            Verb::Collect => self.collect(path),
            Verb::Drop => self.drop(path),
            Verb::Project => self.project(path),
            Verb::Materialize => self.materialize(path),
            Verb::Touch => self.touch(path),
        }
    }

    /// Where `path` would be stored, without checking any precondition
    /// beyond the match itself.
    ///
    /// # Errors
    ///
    /// Fails like [`Self::resolve_external_path`] or when no rule matches.
    pub fn internal_path_for(&self, path: &Path) -> Result<PathBuf, MarbleError> {
        Ok(self.prepare(path)?.internal_path())
    }

    fn ensure_rules(&self) -> Result<(), MarbleError> {
        if self.rules.is_empty() {
            return Err(MarbleError::NoRules);
        }
        Ok(())
    }

    fn match_operation(&self, external: &CanonicalPath) -> Result<Operation, MarbleError> {
        tracing::debug!("matching {external}");
        self.rules
            .resolve(external)
            .operation
            .ok_or_else(|| MarbleError::NotManaged {
                path: external.trimmed(),
            })
    }

    fn prepare(&self, path: &Path) -> Result<Operation, MarbleError> {
        self.ensure_rules()?;
        let external = self.resolve_external_path(path)?;
        self.match_operation(&external)
    }

    /// Undo steps that remove a freshly created internal file and any store
    /// directories left empty by it.
    fn remove_internal(&self, internal: &Path) -> Vec<Mutation> {
        vec![
            Mutation::Unlink {
                path: internal.to_path_buf(),
                force: true,
            },
            self.prune_from(internal),
        ]
    }

    fn prune_from(&self, internal: &Path) -> Mutation {
        Mutation::PruneEmptyDirs {
            start: internal
                .parent()
                .map_or_else(|| self.root.trimmed(), Path::to_path_buf),
            stop_at: self.root.trimmed(),
        }
    }

    /// Move a regular file into the marble and link it back.
    ///
    /// # Errors
    ///
    /// Fails without mutation if the path is a symlink, not a regular file,
    /// inside the marble, unmatched, or already stored.
    pub fn collect(&self, path: &Path) -> Result<VerbOutcome, MarbleError> {
        self.ensure_rules()?;
        let external = self.resolve_external_path(path)?;
        let external_path = external.trimmed();
        let meta = fs::symlink_metadata(&external_path).io_context("inspect", &external_path)?;
        if meta.file_type().is_symlink() {
            return Err(MarbleError::SymlinkNotCollectable {
                path: external_path,
            });
        }
        if !meta.is_file() {
            return Err(MarbleError::NotRegularFile {
                path: external_path,
            });
        }

        let op = self.match_operation(&external)?;
        let internal = op.internal_path();
        if op.internal_exists() {
            return Err(MarbleError::AlreadyExists {
                side: Side::Internal,
                path: internal,
            });
        }

        tracing::debug!("collecting {} to {}", external_path.display(), internal.display());
        let mut tx = self.runner.begin("collect");
        tx.apply(
            &Mutation::CopyFile {
                src: external_path,
                dest: internal.clone(),
            },
            self.remove_internal(&internal),
        )?;
        tx.apply(&op.project(), vec![op.materialize()])?;
        tx.commit();
        Ok(VerbOutcome::Applied)
    }

    /// Turn a managed link back into a plain file and remove the stored copy.
    ///
    /// # Errors
    ///
    /// Fails without mutation if the path is unmatched or not a link into
    /// the marble.
    pub fn drop(&self, path: &Path) -> Result<VerbOutcome, MarbleError> {
        let op = self.prepare(path)?;
        let internal = op.internal_path();
        if !op.is_managed() {
            return Err(MarbleError::NotManaged {
                path: op.external_path(),
            });
        }
        if !internal.is_file() {
            return Err(MarbleError::MissingInternal { path: internal });
        }

        tracing::debug!("drop {} => {}", op.external, op.internal);
        let mut tx = self.runner.begin("drop");
        tx.apply(&op.materialize(), vec![op.project()])?;
        tx.apply(
            &Mutation::Unlink {
                path: internal.clone(),
                force: false,
            },
            vec![Mutation::CopyFile {
                src: op.external_path(),
                dest: internal.clone(),
            }],
        )?;
        tx.commit();

        if let Err(e) = self.runner.apply(&self.prune_from(&internal)) {
            tracing::warn!("could not prune empty store directories: {e}");
        }
        Ok(VerbOutcome::Applied)
    }

    /// Link the external path to its stored file.
    ///
    /// An existing external file is only replaced when it has the same
    /// content as the stored one.
    ///
    /// # Errors
    ///
    /// Fails without mutation if the path is unmatched, the stored file is
    /// missing, or the external file differs.
    pub fn project(&self, path: &Path) -> Result<VerbOutcome, MarbleError> {
        let op = self.prepare(path)?;
        match op.merge_gate(self.executor.as_ref(), self.resolver.as_ref())? {
            MergeGate::AlreadyProjected => {
                tracing::debug!("{} already projected", op.external);
                Ok(VerbOutcome::AlreadyCorrect)
            }
            MergeGate::Clear => {
                tracing::debug!("project {} => {}", op.external, op.internal);
                let mut tx = self.runner.begin("project");
                tx.apply(&op.project(), Vec::new())?;
                tx.commit();
                Ok(VerbOutcome::Applied)
            }
        }
    }

    /// Replace a managed link with a copy of the stored file.
    ///
    /// # Errors
    ///
    /// Fails without mutation if the path is unmatched or not a link into
    /// the marble.
    pub fn materialize(&self, path: &Path) -> Result<VerbOutcome, MarbleError> {
        let op = self.prepare(path)?;
        if !op.is_managed() {
            return Err(MarbleError::NotManaged {
                path: op.external_path(),
            });
        }
        if !op.internal_path().is_file() {
            return Err(MarbleError::MissingInternal {
                path: op.internal_path(),
            });
        }

        tracing::debug!("materialize {} <= {}", op.external, op.internal);
        let mut tx = self.runner.begin("materialize");
        tx.apply(&op.materialize(), Vec::new())?;
        tx.commit();
        Ok(VerbOutcome::Applied)
    }

    /// Create a new file in the marble, open it in the editor and link it.
    ///
    /// # Errors
    ///
    /// Fails without mutation if the path is unmatched or either side
    /// already exists. An editor failure rolls the new file back.
    pub fn touch(&self, path: &Path) -> Result<VerbOutcome, MarbleError> {
        let op = self.prepare(path)?;
        let internal = op.internal_path();
        if op.internal_exists() {
            return Err(MarbleError::AlreadyExists {
                side: Side::Internal,
                path: internal,
            });
        }
        if op.external_exists() {
            return Err(MarbleError::AlreadyExists {
                side: Side::External,
                path: op.external_path(),
            });
        }

        tracing::debug!("touching new file {}", internal.display());
        let mut tx = self.runner.begin("touch");
        tx.apply(
            &Mutation::CreateEmpty {
                path: internal.clone(),
            },
            self.remove_internal(&internal),
        )?;

        let file_arg = internal.to_string_lossy();
        match self.executor.run_interactive(&self.editor, &[&file_arg]) {
            Ok(result) if result.success => {}
            Ok(result) => {
                return Err(tx.abort(MarbleError::Exec {
                    program: self.editor.clone(),
                    message: format!("exited with status {}", result.code.unwrap_or(-1)),
                }));
            }
            Err(e) => {
                return Err(tx.abort(MarbleError::Exec {
                    program: self.editor.clone(),
                    message: format!("{e:#}"),
                }));
            }
        }

        tx.apply(&op.project(), Vec::new())?;
        tx.commit();
        Ok(VerbOutcome::Applied)
    }
}

/// `$EDITOR`, or [`DEFAULT_EDITOR`] when unset or empty.
#[must_use]
pub fn default_editor() -> String {
    std::env::var("EDITOR")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_EDITOR.to_string())
}
