//! Domain-specific error types for the reality marble engine.
//!
//! Library modules return typed errors ([`MarbleError`], [`ConfigError`])
//! while the CLI boundary converts them to [`anyhow::Error`] via `?`.
//!
//! # Error hierarchy
//!
//! ```text
//! MarbleError
//! ├── precondition failures  (NoRules, NotManaged, InsideMarble, ...)
//! ├── AlreadyExists / MergeConflict
//! ├── PermissionDenied       (surfaced only when elevation also failed)
//! ├── PartialFailure         (rolled back, wraps the failing step)
//! └── Io / Exec / Config
//! ```

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Errors reported by the marble verbs and the transaction layer.
#[derive(Error, Debug)]
pub enum MarbleError {
    /// The marble has no configured rules at all.
    #[error("no configured phantasm found")]
    NoRules,

    /// The path matches no rule, or is not a symlink owned by the marble.
    #[error("not managed by the reality marble: {path}")]
    NotManaged {
        /// The external path that was rejected.
        path: PathBuf,
    },

    /// The external path lies inside the marble root itself.
    #[error("refusing to operate on a path inside the reality marble: {path}")]
    InsideMarble {
        /// The offending path.
        path: PathBuf,
    },

    /// `collect` was asked to take in a symlink.
    #[error("cannot collect a symlink: {path}")]
    SymlinkNotCollectable {
        /// The symlink path.
        path: PathBuf,
    },

    /// The path exists but is not a regular file.
    #[error("not a regular file: {path}")]
    NotRegularFile {
        /// The offending path.
        path: PathBuf,
    },

    /// Something is already present where a fresh file or link was expected.
    #[error("{side} file already exists: {path}")]
    AlreadyExists {
        /// Which side of the operation was occupied.
        side: Side,
        /// The occupied path.
        path: PathBuf,
    },

    /// Expected internal file is missing from the store.
    #[error("no file in the reality marble at {path}")]
    MissingInternal {
        /// The internal path that should have existed.
        path: PathBuf,
    },

    /// The external file differs from the stored one and nothing can merge them.
    #[error("external file exists and differs from the marble copy: {external}")]
    MergeConflict {
        /// The external file.
        external: PathBuf,
        /// The internal file it was compared against.
        internal: PathBuf,
    },

    /// Permission was denied even after retrying with elevated privileges.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path the mutation was acting on.
        path: PathBuf,
    },

    /// A multi-step mutation failed after earlier steps committed. The
    /// committed steps have been rolled back.
    #[error("{verb} failed after {completed} completed step(s), rolled back: {source}")]
    PartialFailure {
        /// Verb that was running.
        verb: &'static str,
        /// Number of steps that had succeeded before the failure.
        completed: usize,
        /// The error raised by the failing step.
        source: Box<Self>,
    },

    /// An I/O operation failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being attempted.
        context: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// An external program failed or produced unusable output.
    #[error("{program}: {message}")]
    Exec {
        /// Program that was run.
        program: String,
        /// Human-readable failure description.
        message: String,
    },

    /// Loading the marble configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl MarbleError {
    /// Build an [`MarbleError::Io`] with a path-bearing context string.
    #[must_use]
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Return `true` when this error means the caller lacked permission.
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::PermissionDenied { .. } => true,
            Self::Io { source, .. } => source.kind() == std::io::ErrorKind::PermissionDenied,
            _ => false,
        }
    }
}

/// Which side of an operation an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The copy inside the marble.
    Internal,
    /// The path on the external filesystem.
    External,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Internal => write!(f, "internal"),
            Self::External => write!(f, "external"),
        }
    }
}

/// Errors that arise from loading `.realitymarble`.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read or written.
    #[error("IO error on config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid JSON for the expected schema.
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: String,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A rule names a transform type that does not exist.
    #[error("phantasm '{name}' has unknown type '{kind}'")]
    UnknownTransform {
        /// Name of the rule.
        name: String,
        /// The unrecognised type identifier.
        kind: String,
    },

    /// A rule path could not be canonicalized.
    #[error("phantasm '{name}': cannot resolve {path}: {source}")]
    Path {
        /// Name of the rule.
        name: String,
        /// The path as written in the configuration.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

/// Attach a path-bearing context to an I/O result.
pub(crate) trait IoContext<T> {
    /// Map the error into [`MarbleError::Io`] with `what` and `path` as context.
    fn io_context(self, what: &str, path: &Path) -> Result<T, MarbleError>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, what: &str, path: &Path) -> Result<T, MarbleError> {
        self.map_err(|e| MarbleError::io(format!("{what} {}", path.display()), e))
    }
}
