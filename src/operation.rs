//! The (internal, external) pair produced by a successful match, and the
//! state checks and transitions defined on it.
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::error::{IoContext as _, MarbleError};
use crate::exec::Executor;
use crate::fs_ops::Mutation;
use crate::paths::CanonicalPath;

/// Hook for reconciling an external file that differs from the stored copy.
///
/// Returning `true` means the external file may be overwritten by the link.
pub trait ConflictResolver: std::fmt::Debug {
    /// Try to reconcile `external` into `internal`.
    fn resolve(&self, external: &Path, internal: &Path) -> bool;
}

/// Resolver that never reconciles, making every conflict fatal.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclineConflicts;

impl ConflictResolver for DeclineConflicts {
    fn resolve(&self, external: &Path, _internal: &Path) -> bool {
        tracing::warn!(
            "no merge tool available to reconcile {}",
            external.display()
        );
        false
    }
}

/// Result of the pre-project merge gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeGate {
    /// Safe to place the link.
    Clear,
    /// The external path already links to the internal file.
    AlreadyProjected,
}

/// Internal/external pair for one matched request. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    /// Store root of the rule that produced this operation.
    pub store_root: CanonicalPath,
    /// Location inside the store.
    pub internal: CanonicalPath,
    /// Location on the external filesystem.
    pub external: CanonicalPath,
}

impl Operation {
    /// Bundle a matched pair.
    #[must_use]
    pub const fn new(
        store_root: CanonicalPath,
        internal: CanonicalPath,
        external: CanonicalPath,
    ) -> Self {
        Self {
            store_root,
            internal,
            external,
        }
    }

    /// Internal path as a plain filesystem path.
    #[must_use]
    pub fn internal_path(&self) -> PathBuf {
        self.internal.trimmed()
    }

    /// External path as a plain filesystem path.
    #[must_use]
    pub fn external_path(&self) -> PathBuf {
        self.external.trimmed()
    }

    /// Mutation linking the external path to the internal file.
    #[must_use]
    pub fn project(&self) -> Mutation {
        Mutation::Project {
            internal: self.internal_path(),
            external: self.external_path(),
        }
    }

    /// Mutation replacing the external path with a copy of the internal file.
    #[must_use]
    pub fn materialize(&self) -> Mutation {
        Mutation::Materialize {
            internal: self.internal_path(),
            external: self.external_path(),
        }
    }

    /// Whether anything (including a dangling symlink) is at the internal path.
    #[must_use]
    pub fn internal_exists(&self) -> bool {
        fs::symlink_metadata(self.internal_path()).is_ok()
    }

    /// Whether anything (including a dangling symlink) is at the external path.
    #[must_use]
    pub fn external_exists(&self) -> bool {
        fs::symlink_metadata(self.external_path()).is_ok()
    }

    /// Absolute target of the external symlink, or `None` if the external
    /// path is not a symlink.
    fn external_link_target(&self) -> Option<PathBuf> {
        let external = self.external_path();
        let target = fs::read_link(&external).ok()?;
        let absolute = if target.is_absolute() {
            target
        } else {
            external.parent().unwrap_or_else(|| Path::new("/")).join(target)
        };
        Some(normalize_lexically(&absolute))
    }

    /// `true` iff the external path is a symlink whose target lies under
    /// this operation's store root.
    #[must_use]
    pub fn is_managed(&self) -> bool {
        self.external_link_target().is_some_and(|target| {
            let target = CanonicalPath::from_trusted(target);
            self.store_root.contains(&target) || self.store_root.contains(&target.as_dir())
        })
    }

    /// `true` iff the external path is a symlink to exactly the internal path.
    #[must_use]
    pub fn points_to_internal(&self) -> bool {
        self.external_link_target()
            .is_some_and(|target| target == self.internal_path())
    }

    /// Decide whether the external path may be replaced by a link.
    ///
    /// A missing external path is clear. An existing one must be a regular
    /// file with the same bytes as the internal file, as reported by
    /// `diff -q`; otherwise `resolver` gets a chance before the request is
    /// refused with [`MarbleError::MergeConflict`].
    ///
    /// # Errors
    ///
    /// Returns an error when the internal file is missing, either side is
    /// not a regular file, the files differ irreconcilably, or the
    /// difference tool cannot be run.
    pub fn merge_gate(
        &self,
        executor: &dyn Executor,
        resolver: &dyn ConflictResolver,
    ) -> Result<MergeGate, MarbleError> {
        let internal = self.internal_path();
        let external = self.external_path();

        if !internal.exists() {
            return Err(MarbleError::MissingInternal { path: internal });
        }
        match fs::symlink_metadata(&external) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(MergeGate::Clear),
            Err(e) => return Err(e).io_context("inspect", &external),
            Ok(_) if self.points_to_internal() => return Ok(MergeGate::AlreadyProjected),
            Ok(meta) if !meta.is_file() => {
                return Err(MarbleError::NotRegularFile { path: external });
            }
            Ok(_) => {}
        }
        if !internal.is_file() {
            return Err(MarbleError::NotRegularFile { path: internal });
        }

        let external_arg = external.to_string_lossy();
        let internal_arg = internal.to_string_lossy();
        let result = executor
            .run_unchecked("diff", &["-q", &external_arg, &internal_arg])
            .map_err(|e| MarbleError::Exec {
                program: "diff".to_string(),
                message: format!("{e:#}"),
            })?;
        match result.code {
            Some(0) => Ok(MergeGate::Clear),
            Some(1) if resolver.resolve(&external, &internal) => Ok(MergeGate::Clear),
            Some(1) => Err(MarbleError::MergeConflict { external, internal }),
            code => Err(MarbleError::Exec {
                program: "diff".to_string(),
                message: format!(
                    "exit {}: {}",
                    code.unwrap_or(-1),
                    result.stderr.trim()
                ),
            }),
        }
    }
}

/// Remove `.` and `..` components without touching the filesystem.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
